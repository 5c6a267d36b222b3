/// Authentication middleware for mutating routes

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::error::AppError;
use super::AppState;

/// Check if request has valid authentication token
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        // No token configured, allow access (development mode)
        warn!(path = %request.uri().path(), "API token not set - authentication disabled");
        return next.run(request).await;
    };

    // Support both "Bearer TOKEN" and just "TOKEN"
    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|header| header.strip_prefix("Bearer ").unwrap_or(header));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        _ => AppError::Unauthorized.into_response(),
    }
}

/// Generate a random secure token
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
