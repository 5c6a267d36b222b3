/// Docker engine integration
///
/// Wraps the bollard client: network operations for the reconciler,
/// one-shot container stats for the collector, and system and network prune.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    ListContainersOptions, PruneContainersOptions, Stats, StatsOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::PruneImagesOptions;
use bollard::models::{ContainerSummary, EndpointSettings, Network};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions,
    InspectNetworkOptions, ListNetworksOptions, PruneNetworksOptions,
};
use bollard::volume::PruneVolumesOptions;
use bollard::Docker;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use super::network::{ContainerRef, NetworkEngine, NetworkError};

/// A running container as seen by the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
}

/// Raw counters from one stats read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    pub pids: u64,
}

impl ContainerStats {
    pub fn memory_percent(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_usage as f64 / self.memory_limit as f64 * 100.0
        }
    }
}

/// Engine-wide operations outside network reconciliation
#[async_trait]
pub trait EngineHost: Send + Sync {
    async fn ping(&self) -> bool;

    async fn prune(&self, all: bool) -> Result<PruneReport>;

    /// Remove networks no container uses; returns the removed names
    async fn prune_networks(&self) -> Result<Vec<String>>;
}

/// Totals from a system prune
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub containers_deleted: usize,
    pub images_deleted: usize,
    pub networks_deleted: usize,
    pub volumes_deleted: usize,
    pub space_reclaimed: u64,
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    /// Connect to the local engine socket with an explicit request timeout
    pub fn connect(timeout: Duration) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?
            .with_timeout(timeout);
        Ok(Self { docker })
    }

    /// Check if Docker daemon is accessible
    pub async fn check_docker(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// Running containers only
    pub async fn running_containers(&self) -> Result<Vec<ContainerInfo>> {
        let options = Some(ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        });

        let containers = self.docker.list_containers(options).await?;
        Ok(containers.into_iter().map(container_summary_to_info).collect())
    }

    /// One stats read for a container; None when the engine returned nothing
    pub async fn get_container_stats(&self, container_id: &str) -> Result<Option<ContainerStats>> {
        let mut stats_stream = self.docker.stats(
            container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );

        match stats_stream.next().await {
            Some(Ok(stats)) => Ok(Some(stats_to_counters(&stats))),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Remove stopped containers, unused networks and volumes, and dangling
    /// images (every unused image when `all` is set)
    pub async fn prune(&self, all: bool) -> Result<PruneReport> {
        let mut report = PruneReport::default();

        let containers = self
            .docker
            .prune_containers(None::<PruneContainersOptions<String>>)
            .await
            .context("Failed to prune containers")?;
        report.containers_deleted = containers.containers_deleted.map(|d| d.len()).unwrap_or(0);
        report.space_reclaimed += non_negative(containers.space_reclaimed);

        let mut image_filters = HashMap::new();
        if all {
            image_filters.insert("dangling", vec!["false"]);
        }
        let images = self
            .docker
            .prune_images(Some(PruneImagesOptions { filters: image_filters }))
            .await
            .context("Failed to prune images")?;
        report.images_deleted = images.images_deleted.map(|d| d.len()).unwrap_or(0);
        report.space_reclaimed += non_negative(images.space_reclaimed);

        report.networks_deleted = self.prune_unused_networks().await?.len();

        let mut volume_filters = HashMap::new();
        if all {
            volume_filters.insert("all", vec!["true"]);
        }
        let volumes = self
            .docker
            .prune_volumes(Some(PruneVolumesOptions { filters: volume_filters }))
            .await
            .context("Failed to prune volumes")?;
        report.volumes_deleted = volumes.volumes_deleted.map(|d| d.len()).unwrap_or(0);
        report.space_reclaimed += non_negative(volumes.space_reclaimed);

        Ok(report)
    }

    /// Network-only prune; returns the removed network names
    pub async fn prune_unused_networks(&self) -> Result<Vec<String>> {
        let networks = self
            .docker
            .prune_networks(None::<PruneNetworksOptions<String>>)
            .await
            .context("Failed to prune networks")?;
        Ok(networks.networks_deleted.unwrap_or_default())
    }
}

fn non_negative(bytes: Option<i64>) -> u64 {
    bytes.and_then(|b| u64::try_from(b).ok()).unwrap_or(0)
}

/// Convert ContainerSummary to ContainerInfo
fn container_summary_to_info(summary: ContainerSummary) -> ContainerInfo {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name,
    }
}

/// Same arithmetic as `docker stats`: CPU share of the host across online CPUs
fn stats_to_counters(stats: &Stats) -> ContainerStats {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
    let num_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;

    let cpu_percent = if system_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * num_cpus * 100.0
    } else {
        0.0
    };

    let (network_rx, network_tx) = stats
        .networks
        .as_ref()
        .map(|networks| {
            networks
                .values()
                .fold((0u64, 0u64), |(rx, tx), net| (rx + net.rx_bytes, tx + net.tx_bytes))
        })
        .unwrap_or((0, 0));

    let (block_read, block_write) = stats
        .blkio_stats
        .io_service_bytes_recursive
        .as_ref()
        .map(|entries| {
            entries.iter().fold((0u64, 0u64), |(read, write), entry| {
                match entry.op.to_lowercase().as_str() {
                    "read" => (read + entry.value, write),
                    "write" => (read, write + entry.value),
                    _ => (read, write),
                }
            })
        })
        .unwrap_or((0, 0));

    ContainerStats {
        cpu_percent,
        memory_usage: stats.memory_stats.usage.unwrap_or(0),
        memory_limit: stats.memory_stats.limit.unwrap_or(0),
        network_rx,
        network_tx,
        block_read,
        block_write,
        pids: stats.pids_stats.current.unwrap_or(0),
    }
}

/// Map engine refusals (4xx) to reported conflicts; anything else is an outage
fn engine_error(err: DockerError) -> NetworkError {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } if (400..500).contains(&status_code) => NetworkError::Rejected {
            status: status_code,
            message,
        },
        other => NetworkError::Engine(other.to_string()),
    }
}

fn is_status(err: &DockerError, code: u16) -> bool {
    matches!(err, DockerError::DockerResponseServerError { status_code, .. } if *status_code == code)
}

#[async_trait]
impl EngineHost for DockerManager {
    async fn ping(&self) -> bool {
        self.check_docker().await
    }

    async fn prune(&self, all: bool) -> Result<PruneReport> {
        DockerManager::prune(self, all).await
    }

    async fn prune_networks(&self) -> Result<Vec<String>> {
        self.prune_unused_networks().await
    }
}

#[async_trait]
impl NetworkEngine for DockerManager {
    async fn list_networks(&self) -> Result<Vec<Network>, NetworkError> {
        self.docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(engine_error)
    }

    async fn network_containers(&self, network: &str) -> Result<Vec<ContainerRef>, NetworkError> {
        let inspected = self
            .docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| {
                if is_status(&e, 404) {
                    NetworkError::NotFound(network.to_string())
                } else {
                    engine_error(e)
                }
            })?;

        let containers = inspected
            .containers
            .unwrap_or_default()
            .into_iter()
            .map(|(id, container)| ContainerRef {
                container_name: container
                    .name
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone()),
                container_id: id,
                ipv4_address: container.ipv4_address.filter(|ip| !ip.is_empty()),
            })
            .collect();

        Ok(containers)
    }

    async fn create_network(&self, name: &str) -> Result<String, NetworkError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            check_duplicate: true,
            ..Default::default()
        };

        let response = self.docker.create_network(options).await.map_err(|e| {
            if is_status(&e, 409) {
                NetworkError::AlreadyExists(name.to_string())
            } else {
                engine_error(e)
            }
        })?;

        Ok(response.id.unwrap_or_default())
    }

    async fn remove_network(&self, network: &str) -> Result<(), NetworkError> {
        self.docker.remove_network(network).await.map_err(|e| {
            if is_status(&e, 404) {
                NetworkError::NotFound(network.to_string())
            } else {
                engine_error(e)
            }
        })
    }

    async fn connect(&self, network: &str, container: &str) -> Result<(), NetworkError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        self.docker
            .connect_network(network, options)
            .await
            .map_err(engine_error)
    }

    async fn disconnect(&self, network: &str, container: &str) -> Result<(), NetworkError> {
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force: false,
        };
        self.docker
            .disconnect_network(network, options)
            .await
            .map_err(engine_error)
    }
}
