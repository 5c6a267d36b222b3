/// HTTP API server
/// Wires the Docker engine and the metrics database into the REST routes

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::create_router;

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::{
    DockerManager, EngineHost, MetricsCollector, MetricsService, NetworkEngine, NetworkReconciler,
    PgMetricsStore, ScrapeConfigService,
};
use crate::utils::{mask_sensitive, AppConfig};

/// Shared handles for every request; all mutable state lives in the engine or the database
#[derive(Clone)]
pub struct AppState {
    pub networks: NetworkReconciler,
    pub metrics: MetricsService,
    pub host: Arc<dyn EngineHost>,
    pub scrape: ScrapeConfigService,
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn NetworkEngine>,
        host: Arc<dyn EngineHost>,
        metrics: MetricsService,
        config: &AppConfig,
    ) -> Self {
        Self {
            networks: NetworkReconciler::new(engine),
            metrics,
            host,
            scrape: ScrapeConfigService::new(config.scrape_config_path.clone()),
            api_token: config.api_token.as_deref().map(Arc::from),
        }
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    let docker = Arc::new(DockerManager::connect(config.docker_timeout)?);
    if !docker.check_docker().await {
        warn!("Docker daemon is not responding; network routes will fail until it is reachable");
    }

    let store = PgMetricsStore::connect(&config)
        .await
        .context("Failed to connect to the metrics database")?;
    store.migrate().await?;

    let metrics = MetricsService::new(Arc::new(store.clone()), config.ingest_mode);
    let state = AppState::new(docker.clone(), docker.clone(), metrics.clone(), &config);
    let app = create_router(state, config.cors, config.request_timeout);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector = if config.collector_enabled() {
        Some(MetricsCollector::new(docker.clone(), metrics, config.collector_interval).spawn(shutdown_rx))
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    println!("{}", "Docketeer API Server".bold());
    println!("   API:       http://{}", addr);
    match config.api_token.as_deref() {
        Some(token) => println!("   Auth:      {} ({})", "enabled".green(), mask_sensitive(token, 4)),
        None => println!("   Auth:      {}", "disabled (no token)".yellow()),
    }
    println!("   Ingest:    {}", config.ingest_mode);
    if config.collector_enabled() {
        println!("   Collector: every {}", humantime::format_duration(config.collector_interval));
    }
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = collector {
        let _ = handle.await;
    }
    store.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
