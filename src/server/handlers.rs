/// API Request Handlers
/// Thin adapters over the reconciler, metrics service and scrape config service

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use bollard::models::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::AppError;
use super::AppState;
use crate::core::metrics::IngestSummary;
use crate::core::store::GithubUrl;
use crate::core::{MetricSample, NetworkView, PruneReport, ScrapeSettings};

type ApiResult<T> = Result<Json<T>, AppError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub network_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub network_name: String,
    pub container_name: String,
}

/// Successful network mutations answer with the network id only
#[derive(Debug, Serialize)]
pub struct HashResponse {
    pub hash: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PruneRequest {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPruneResponse {
    pub networks_deleted: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMetricsRequest {
    /// Keyed by container; each value is parsed on its own so one bad entry
    /// cannot reject the others
    pub containers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct GetMetricsRequest {
    /// Window in hours
    pub time: i64,
    pub containers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: Vec<MetricSample>,
}

#[derive(Debug, Deserialize)]
pub struct TimezoneRequest {
    pub timezone: String,
}

#[derive(Debug, Serialize)]
pub struct TimezoneResponse {
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubRequest {
    /// Container name to look up
    pub github_url: String,
}

#[derive(Debug, Serialize)]
pub struct GithubResponse {
    pub url: Vec<GithubUrl>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub docker: bool,
    pub database: bool,
    pub version: &'static str,
}

// ============================================================================
// Network Handlers
// ============================================================================

pub async fn list_networks(State(state): State<AppState>) -> ApiResult<Vec<Network>> {
    Ok(Json(state.networks.list().await?))
}

pub async fn list_network_containers(State(state): State<AppState>) -> ApiResult<Vec<NetworkView>> {
    Ok(Json(state.networks.list_with_containers().await?))
}

pub async fn create_network(
    State(state): State<AppState>,
    payload: Result<Json<NetworkRequest>, JsonRejection>,
) -> ApiResult<HashResponse> {
    let Json(body) = payload?;
    let hash = state.networks.create(&body.network_name).await?;
    Ok(Json(HashResponse { hash }))
}

pub async fn remove_network(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<HashResponse> {
    let hash = state.networks.remove(&name).await?;
    Ok(Json(HashResponse { hash }))
}

/// `POST /command/networkRemove {networkName}`
pub async fn remove_network_command(
    State(state): State<AppState>,
    payload: Result<Json<NetworkRequest>, JsonRejection>,
) -> ApiResult<HashResponse> {
    let Json(body) = payload?;
    let hash = state.networks.remove(&body.network_name).await?;
    Ok(Json(HashResponse { hash }))
}

pub async fn connect_container(
    State(state): State<AppState>,
    payload: Result<Json<AttachmentRequest>, JsonRejection>,
) -> ApiResult<HashResponse> {
    let Json(body) = payload?;
    let hash = state
        .networks
        .connect(&body.network_name, &body.container_name)
        .await?;
    Ok(Json(HashResponse { hash }))
}

pub async fn disconnect_container(
    State(state): State<AppState>,
    payload: Result<Json<AttachmentRequest>, JsonRejection>,
) -> ApiResult<HashResponse> {
    let Json(body) = payload?;
    let hash = state
        .networks
        .disconnect(&body.network_name, &body.container_name)
        .await?;
    Ok(Json(HashResponse { hash }))
}

/// Body is optional; when present it must be a valid `{all?}` object
pub async fn prune_system(State(state): State<AppState>, body: Bytes) -> ApiResult<PruneReport> {
    let request = parse_prune_request(&body)?;
    let report = state
        .host
        .prune(request.all)
        .await
        .map_err(|e| AppError::EngineUnavailable(format!("{:#}", e)))?;
    Ok(Json(report))
}

fn parse_prune_request(body: &[u8]) -> Result<PruneRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PruneRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Failed to parse the request body as JSON: {}", e)))
}

pub async fn prune_networks(State(state): State<AppState>) -> ApiResult<NetworkPruneResponse> {
    let networks_deleted = state
        .host
        .prune_networks()
        .await
        .map_err(|e| AppError::EngineUnavailable(format!("{:#}", e)))?;
    Ok(Json(NetworkPruneResponse { networks_deleted }))
}

// ============================================================================
// Metrics Handlers
// ============================================================================

pub async fn add_metrics(
    State(state): State<AppState>,
    payload: Result<Json<AddMetricsRequest>, JsonRejection>,
) -> ApiResult<IngestSummary> {
    let Json(body) = payload?;
    Ok(Json(state.metrics.ingest(body.containers).await))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    payload: Result<Json<GetMetricsRequest>, JsonRejection>,
) -> ApiResult<MetricsResponse> {
    let Json(body) = payload?;
    let metrics = state.metrics.query(body.containers, body.time).await?;
    Ok(Json(MetricsResponse { metrics }))
}

pub async fn set_timezone(
    State(state): State<AppState>,
    payload: Result<Json<TimezoneRequest>, JsonRejection>,
) -> ApiResult<TimezoneResponse> {
    let Json(body) = payload?;
    let timezone = body.timezone.trim().to_string();
    state.metrics.set_timezone(&timezone).await?;
    Ok(Json(TimezoneResponse { timezone }))
}

pub async fn github_url(
    State(state): State<AppState>,
    payload: Result<Json<GithubRequest>, JsonRejection>,
) -> ApiResult<GithubResponse> {
    let Json(body) = payload?;
    let url = state.metrics.github_urls(&body.github_url).await?;
    Ok(Json(GithubResponse { url }))
}

// ============================================================================
// Scrape Config Handlers
// ============================================================================

pub async fn get_scrape_config(State(state): State<AppState>) -> ApiResult<ScrapeSettings> {
    let scrape = state.scrape.clone();
    let settings = tokio::task::spawn_blocking(move || scrape.load())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(settings))
}

pub async fn put_scrape_config(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeSettings>, JsonRejection>,
) -> ApiResult<ScrapeSettings> {
    let Json(body) = payload?;
    let scrape = state.scrape.clone();
    let settings = tokio::task::spawn_blocking(move || scrape.replace(body))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(Json(settings))
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (docker, database) = tokio::join!(state.host.ping(), state.metrics.store().ping());
    Json(HealthResponse {
        status: if docker && database { "ok" } else { "degraded" },
        docker,
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}
