/// API Routes definition

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::auth;
use super::error::AppError;
use super::handlers;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool, request_timeout: Duration) -> Router {
    // Protected routes (change engine, database or file state)
    let protected_routes = Router::new()
        .route("/network", post(handlers::create_network))
        .route("/network/", post(handlers::create_network))
        .route("/network/:name", delete(handlers::remove_network))
        .route("/network/prune", post(handlers::prune_networks))
        .route("/command/networkCreate", post(handlers::create_network))
        .route("/command/networkRemove", post(handlers::remove_network_command))
        .route("/command/networkConnect", post(handlers::connect_container))
        .route("/command/networkDisconnect", post(handlers::disconnect_container))
        .route("/command/prune", post(handlers::prune_system))
        .route("/init/timezone", post(handlers::set_timezone))
        .route("/config/scrape", put(handlers::put_scrape_config))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Public routes (reads, and the metrics ingest the UI posts on a timer)
    let public_routes = Router::new()
        .route("/network", get(handlers::list_networks))
        .route("/network/", get(handlers::list_networks))
        .route("/network/container", get(handlers::list_network_containers))
        .route("/init/addMetrics", post(handlers::add_metrics))
        .route("/init/getMetrics", post(handlers::get_metrics))
        .route("/init/github", post(handlers::github_url))
        .route("/config/scrape", get(handlers::get_scrape_config))
        .route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(middleware::from_fn_with_state(request_timeout, timeout_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

/// Abort handlers that outlive `limit` with a JSON 408
async fn timeout_middleware(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, "Request timed out");
            AppError::Timeout(limit).into_response()
        }
    }
}
