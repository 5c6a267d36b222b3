mod cli;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use docketeer::core::{DockerManager, MetricsService, NetworkReconciler, PgMetricsStore};
use docketeer::server;
use docketeer::server::auth::generate_token;
use docketeer::utils::{format_timestamp, truncate_string, AppConfig, IngestMode, DEFAULT_LOG_FILTER};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, cors } => {
            let mut config = AppConfig::load(cli.config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.cors |= cors;
            config.validate()?;
            server::run(config).await?;
        }
        Commands::Networks => {
            let config = AppConfig::load(cli.config.as_deref())?;
            handle_networks(&config).await?;
        }
        Commands::Metrics { containers, hours } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            handle_metrics(&config, containers, hours).await?;
        }
        Commands::Migrate => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let store = PgMetricsStore::connect(&config).await?;
            store.migrate().await?;
            store.close().await;
            println!("{} Migrations applied", "✓".green());
        }
        Commands::Token => {
            let token = generate_token();
            println!("{}", token);
            println!();
            println!("To use it, export DOCKETEER_API_TOKEN=\"{}\"", token);
        }
    }

    Ok(())
}

async fn handle_networks(config: &AppConfig) -> Result<()> {
    let docker = Arc::new(DockerManager::connect(config.docker_timeout)?);
    let reconciler = NetworkReconciler::new(docker);
    let views = reconciler.list_with_containers().await?;

    println!("{:<28} {:<28} {:<15}", "NETWORK".bold(), "CONTAINER".bold(), "IPV4".bold());
    for view in views {
        if view.containers.is_empty() {
            println!("{:<28} {:<28} {:<15}", truncate_string(&view.network_name, 28), "-".dimmed(), "");
            continue;
        }
        for (i, container) in view.containers.iter().enumerate() {
            let network = if i == 0 {
                truncate_string(&view.network_name, 28)
            } else {
                String::new()
            };
            println!(
                "{:<28} {:<28} {:<15}",
                network,
                truncate_string(&container.container_name, 28),
                container.ipv4_address.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

async fn handle_metrics(config: &AppConfig, containers: Vec<String>, hours: i64) -> Result<()> {
    let store = PgMetricsStore::connect(config).await?;
    let service = MetricsService::new(Arc::new(store.clone()), IngestMode::Confirmed);
    let samples = service.query(containers, hours).await;
    store.close().await;
    let samples = samples?;

    if samples.is_empty() {
        println!("{}", "No samples in the requested window".yellow());
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:>8} {:>8} {:<22} {:<22} {:<22} {:>5}",
        "TIME".bold(),
        "CONTAINER".bold(),
        "CPU %".bold(),
        "MEM %".bold(),
        "MEM USAGE".bold(),
        "NET I/O".bold(),
        "BLOCK I/O".bold(),
        "PIDS".bold()
    );
    for sample in samples {
        println!(
            "{:<20} {:<20} {:>8.2} {:>8.2} {:<22} {:<22} {:<22} {:>5}",
            format_timestamp(&sample.created_at),
            truncate_string(&sample.container_name, 20),
            sample.cpu_pct,
            sample.memory_pct,
            sample.memory_usage,
            sample.net_io,
            sample.block_io,
            sample.pid
        );
    }

    Ok(())
}
