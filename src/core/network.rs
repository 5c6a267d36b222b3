/// Docker network reconciliation
///
/// Builds the `{networkName, containers}` view from the live engine state and
/// proxies create / remove / connect / disconnect with name validation and
/// duplicate detection done here, before the engine is asked. Nothing is
/// cached: every call reads the engine again.

use async_trait::async_trait;
use bollard::models::Network;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info};

use super::error::ErrorClass;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid network name '{0}': use letters, digits, '_', '.' or '-', not starting with '-'")]
    InvalidName(String),
    #[error("Container name must not be empty")]
    MissingContainer,
    #[error("Network '{0}' already exists")]
    AlreadyExists(String),
    #[error("Network '{0}' not found")]
    NotFound(String),
    #[error("Container '{container}' is already connected to network '{network}'")]
    AlreadyConnected { network: String, container: String },
    #[error("Container '{container}' is not connected to network '{network}'")]
    NotConnected { network: String, container: String },
    #[error("Docker engine rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Docker engine unavailable: {0}")]
    Engine(String),
}

impl NetworkError {
    pub fn class(&self) -> ErrorClass {
        match self {
            NetworkError::InvalidName(_) | NetworkError::MissingContainer => ErrorClass::Validation,
            NetworkError::AlreadyExists(_)
            | NetworkError::NotFound(_)
            | NetworkError::AlreadyConnected { .. }
            | NetworkError::NotConnected { .. }
            | NetworkError::Rejected { .. } => ErrorClass::Conflict,
            NetworkError::Engine(_) => ErrorClass::Engine,
        }
    }
}

/// A container attached to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRef {
    pub container_id: String,
    pub container_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
}

impl ContainerRef {
    /// Exact name or full id
    pub fn matches(&self, container: &str) -> bool {
        let container = container.trim_start_matches('/');
        self.container_name == container || self.container_id == container
    }

    pub fn id_starts_with(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.container_id.starts_with(prefix)
    }
}

/// Whether `container` is attached, judged the way the engine resolves
/// references: exact name or id first, then a unique id prefix.
/// `None` when the prefix matches several containers.
pub fn attachment_of(containers: &[ContainerRef], container: &str) -> Option<bool> {
    if containers.iter().any(|c| c.matches(container)) {
        return Some(true);
    }
    let prefix = container.trim_start_matches('/');
    match containers.iter().filter(|c| c.id_starts_with(prefix)).count() {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// One network with its currently attached containers; derived, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkView {
    pub network_name: String,
    pub containers: Vec<ContainerRef>,
}

/// The engine operations the reconciler needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkEngine: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<Network>, NetworkError>;

    /// Containers attached to `network` (name or id)
    async fn network_containers(&self, network: &str) -> Result<Vec<ContainerRef>, NetworkError>;

    /// Returns the new network id
    async fn create_network(&self, name: &str) -> Result<String, NetworkError>;

    async fn remove_network(&self, network: &str) -> Result<(), NetworkError>;

    async fn connect(&self, network: &str, container: &str) -> Result<(), NetworkError>;

    async fn disconnect(&self, network: &str, container: &str) -> Result<(), NetworkError>;
}

fn network_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.][A-Za-z0-9_.-]*$").expect("network name pattern is valid")
    })
}

/// Docker network naming rules: alphanumerics, `_`, `.`, `-`, not starting with `-`
pub fn validate_network_name(name: &str) -> Result<(), NetworkError> {
    if network_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(NetworkError::InvalidName(name.to_string()))
    }
}

fn validate_container_name(container: &str) -> Result<(), NetworkError> {
    if container.trim().is_empty() {
        Err(NetworkError::MissingContainer)
    } else {
        Ok(())
    }
}

#[derive(Clone)]
pub struct NetworkReconciler {
    engine: Arc<dyn NetworkEngine>,
}

impl NetworkReconciler {
    pub fn new(engine: Arc<dyn NetworkEngine>) -> Self {
        Self { engine }
    }

    /// All networks, as reported by the engine
    pub async fn list(&self) -> Result<Vec<Network>, NetworkError> {
        self.engine.list_networks().await
    }

    /// Every network with its attached containers (empty list when none)
    pub async fn list_with_containers(&self) -> Result<Vec<NetworkView>, NetworkError> {
        let networks = self.engine.list_networks().await?;

        let names: Vec<String> = networks.into_iter().filter_map(|n| n.name).collect();

        let lookups = names.iter().map(|name| async move {
            (name, self.engine.network_containers(name).await)
        });

        let mut views = Vec::with_capacity(names.len());
        for (name, result) in join_all(lookups).await {
            match result {
                Ok(mut containers) => {
                    containers.sort_by(|a, b| a.container_name.cmp(&b.container_name));
                    views.push(NetworkView {
                        network_name: name.clone(),
                        containers,
                    });
                }
                // Removed between the list and the inspect
                Err(NetworkError::NotFound(_)) => {
                    debug!(network = %name, "Network disappeared while resolving containers");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(views)
    }

    /// Create a network; returns its id. Duplicates are reported, not raised.
    pub async fn create(&self, name: &str) -> Result<String, NetworkError> {
        validate_network_name(name)?;

        if self.find(name).await?.is_some() {
            return Err(NetworkError::AlreadyExists(name.to_string()));
        }

        let id = self.engine.create_network(name).await?;
        info!(network = %name, id = %id, "Created network");
        Ok(id)
    }

    /// Remove a network by name or id; returns the removed network's id
    pub async fn remove(&self, name: &str) -> Result<String, NetworkError> {
        validate_network_name(name)?;

        let network = self
            .find(name)
            .await?
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))?;
        let id = network.id.unwrap_or_else(|| name.to_string());

        self.engine.remove_network(name).await?;
        info!(network = %name, id = %id, "Removed network");
        Ok(id)
    }

    /// Attach a container; repeating the attach is reported as a conflict
    pub async fn connect(&self, network: &str, container: &str) -> Result<String, NetworkError> {
        let (id, attached) = self.resolve_attachment(network, container).await?;
        if attached == Some(true) {
            return Err(NetworkError::AlreadyConnected {
                network: network.to_string(),
                container: container.to_string(),
            });
        }

        self.engine.connect(network, container).await?;
        info!(network = %network, container = %container, "Connected container to network");
        Ok(id)
    }

    /// Detach a container; detaching when not attached is reported as a conflict
    pub async fn disconnect(&self, network: &str, container: &str) -> Result<String, NetworkError> {
        let (id, attached) = self.resolve_attachment(network, container).await?;
        if attached == Some(false) {
            return Err(NetworkError::NotConnected {
                network: network.to_string(),
                container: container.to_string(),
            });
        }

        self.engine.disconnect(network, container).await?;
        info!(network = %network, container = %container, "Disconnected container from network");
        Ok(id)
    }

    /// Network id and whether `container` is currently attached to it;
    /// an ambiguous id prefix is left for the engine to reject
    async fn resolve_attachment(
        &self,
        network: &str,
        container: &str,
    ) -> Result<(String, Option<bool>), NetworkError> {
        validate_network_name(network)?;
        validate_container_name(container)?;

        let found = self
            .find(network)
            .await?
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))?;
        let id = found.id.unwrap_or_else(|| network.to_string());

        let containers = self.engine.network_containers(network).await?;
        let attached = attachment_of(&containers, container);

        Ok((id, attached))
    }

    async fn find(&self, name: &str) -> Result<Option<Network>, NetworkError> {
        let networks = self.engine.list_networks().await?;
        Ok(networks.into_iter().find(|n| {
            n.name.as_deref() == Some(name) || n.id.as_deref() == Some(name)
        }))
    }
}
