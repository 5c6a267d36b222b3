/// Server-side metrics collection
///
/// Polls one-shot stats for every running container on a fixed interval and
/// feeds them through the same best-effort ingest as `addMetrics`. Disabled
/// when the configured interval is zero.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::docker::{ContainerInfo, ContainerStats, DockerManager};
use super::metrics::{MetricsService, NewSample};
use crate::utils::{format_binary_bytes, format_decimal_bytes, format_pair};

pub struct MetricsCollector {
    docker: Arc<DockerManager>,
    metrics: MetricsService,
    interval: Duration,
}

impl MetricsCollector {
    pub fn new(docker: Arc<DockerManager>, metrics: MetricsService, interval: Duration) -> Self {
        Self {
            docker,
            metrics,
            interval,
        }
    }

    /// Run until `shutdown` flips to true
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "Metrics collector started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.collect_once().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Metrics collector stopped");
        })
    }

    async fn collect_once(&self) {
        let containers = match self.docker.running_containers().await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "Collector could not list containers");
                return;
            }
        };

        let reads = containers.iter().map(|container| async move {
            let stats = self.docker.get_container_stats(&container.id).await;
            (container, stats)
        });

        let mut entries = Vec::with_capacity(containers.len());
        for (container, stats) in futures::future::join_all(reads).await {
            match stats {
                Ok(Some(stats)) => {
                    entries.push((container.name.clone(), Ok(sample_from_stats(container, &stats))));
                }
                Ok(None) => debug!(container = %container.name, "No stats returned"),
                Err(e) => warn!(container = %container.name, error = %e, "Failed to read stats"),
            }
        }

        if entries.is_empty() {
            return;
        }
        let summary = self.metrics.ingest_samples(entries).await;
        debug!(submitted = summary.submitted, "Collector submitted samples");
    }
}

/// Build an ingest entry shaped like a `docker stats` row
pub fn sample_from_stats(container: &ContainerInfo, stats: &ContainerStats) -> NewSample {
    NewSample {
        container_id: container.id.clone(),
        container_name: container.name.clone(),
        cpu_pct: round2(stats.cpu_percent),
        memory_pct: round2(stats.memory_percent()),
        memory_usage: format_pair(
            format_binary_bytes(stats.memory_usage),
            format_binary_bytes(stats.memory_limit),
        ),
        net_io: format_pair(
            format_decimal_bytes(stats.network_rx),
            format_decimal_bytes(stats.network_tx),
        ),
        block_io: format_pair(
            format_decimal_bytes(stats.block_read),
            format_decimal_bytes(stats.block_write),
        ),
        pid: i32::try_from(stats.pids).unwrap_or(i32::MAX),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
