//! In-memory engine and store used by the HTTP tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bollard::models::Network;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use docketeer::core::docker::{EngineHost, PruneReport};
use docketeer::core::metrics::{MetricSample, MetricsError, MetricsQuery, NewSample};
use docketeer::core::network::{ContainerRef, NetworkEngine, NetworkError};
use docketeer::core::store::{GithubUrl, MetricsStore};
use docketeer::core::MetricsService;
use docketeer::server::{create_router, AppState};
use docketeer::utils::{AppConfig, IngestMode};

#[derive(Debug, Clone)]
struct FakeNetwork {
    id: String,
    containers: Vec<ContainerRef>,
}

/// Docker engine state machine: networks keyed by name, containers attached by name
#[derive(Default)]
pub struct FakeEngine {
    networks: Mutex<BTreeMap<String, FakeNetwork>>,
    next_id: Mutex<u64>,
    pub offline: Mutex<bool>,
    /// Added before every listing to simulate a hung engine
    pub latency: Mutex<Option<std::time::Duration>>,
}

impl FakeEngine {
    pub fn with_networks(names: &[&str]) -> Arc<Self> {
        let engine = Arc::new(Self::default());
        for name in names {
            engine.insert(name);
        }
        engine
    }

    fn insert(&self, name: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let id = format!("{:064x}", *next);
        self.networks.lock().unwrap().insert(
            name.to_string(),
            FakeNetwork {
                id: id.clone(),
                containers: Vec::new(),
            },
        );
        id
    }

    pub fn attach(&self, network: &str, container: &str) {
        let mut networks = self.networks.lock().unwrap();
        let entry = networks.get_mut(network).expect("network exists");
        entry.containers.push(ContainerRef {
            container_id: format!("{}-id", container),
            container_name: container.to_string(),
            ipv4_address: Some("172.18.0.2".to_string()),
        });
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.networks.lock().unwrap().contains_key(name)
    }

    pub fn attached(&self, network: &str) -> Vec<String> {
        self.networks
            .lock()
            .unwrap()
            .get(network)
            .map(|n| n.containers.iter().map(|c| c.container_name.clone()).collect())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), NetworkError> {
        if *self.offline.lock().unwrap() {
            Err(NetworkError::Engine("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NetworkEngine for FakeEngine {
    async fn list_networks(&self) -> Result<Vec<Network>, NetworkError> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_online()?;
        Ok(self
            .networks
            .lock()
            .unwrap()
            .iter()
            .map(|(name, net)| Network {
                name: Some(name.clone()),
                id: Some(net.id.clone()),
                driver: Some("bridge".to_string()),
                ..Default::default()
            })
            .collect())
    }

    async fn network_containers(&self, network: &str) -> Result<Vec<ContainerRef>, NetworkError> {
        self.check_online()?;
        self.networks
            .lock()
            .unwrap()
            .get(network)
            .map(|n| n.containers.clone())
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))
    }

    async fn create_network(&self, name: &str) -> Result<String, NetworkError> {
        self.check_online()?;
        if self.has_network(name) {
            return Err(NetworkError::AlreadyExists(name.to_string()));
        }
        Ok(self.insert(name))
    }

    async fn remove_network(&self, network: &str) -> Result<(), NetworkError> {
        self.check_online()?;
        self.networks
            .lock()
            .unwrap()
            .remove(network)
            .map(|_| ())
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))
    }

    async fn connect(&self, network: &str, container: &str) -> Result<(), NetworkError> {
        self.check_online()?;
        if self.attached(network).iter().any(|c| c == container) {
            return Err(NetworkError::Rejected {
                status: 403,
                message: "endpoint already exists".to_string(),
            });
        }
        self.attach(network, container);
        Ok(())
    }

    async fn disconnect(&self, network: &str, container: &str) -> Result<(), NetworkError> {
        self.check_online()?;
        let mut networks = self.networks.lock().unwrap();
        let entry = networks
            .get_mut(network)
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))?;
        entry.containers.retain(|c| c.container_name != container);
        Ok(())
    }
}

#[async_trait]
impl EngineHost for FakeEngine {
    async fn ping(&self) -> bool {
        !*self.offline.lock().unwrap()
    }

    async fn prune(&self, _all: bool) -> Result<PruneReport> {
        Ok(PruneReport {
            containers_deleted: 2,
            space_reclaimed: 4096,
            ..Default::default()
        })
    }

    async fn prune_networks(&self) -> Result<Vec<String>> {
        let mut networks = self.networks.lock().unwrap();
        let unused: Vec<String> = networks
            .iter()
            .filter(|(_, net)| net.containers.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &unused {
            networks.remove(name);
        }
        Ok(unused)
    }
}

/// Append-only sample table with server-assigned ids and timestamps
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<Vec<MetricSample>>,
    pub github: Mutex<BTreeMap<String, String>>,
}

impl FakeStore {
    pub fn rows(&self) -> Vec<MetricSample> {
        self.rows.lock().unwrap().clone()
    }

    /// Seed a row `age_hours` in the past
    pub fn seed(&self, name: &str, cpu: f64, age_hours: i64) {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(MetricSample {
            id,
            container_id: format!("{}-id", name),
            container_name: name.to_string(),
            cpu_pct: cpu,
            memory_pct: 1.0,
            memory_usage: "1MiB / 1GiB".to_string(),
            net_io: "0B / 0B".to_string(),
            block_io: "0B / 0B".to_string(),
            pid: 1,
            created_at: Utc::now() - ChronoDuration::hours(age_hours),
        });
    }
}

#[async_trait]
impl MetricsStore for FakeStore {
    async fn insert_sample(&self, sample: &NewSample) -> Result<(), MetricsError> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(MetricSample {
            id,
            container_id: sample.container_id.clone(),
            container_name: sample.container_name.clone(),
            cpu_pct: sample.cpu_pct,
            memory_pct: sample.memory_pct,
            memory_usage: sample.memory_usage.clone(),
            net_io: sample.net_io.clone(),
            block_io: sample.block_io.clone(),
            pid: sample.pid,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn query_samples(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>, MetricsError> {
        let cutoff = Utc::now() - ChronoDuration::hours(query.hours() as i64);
        let mut rows: Vec<MetricSample> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.containers().contains(&r.container_name) && r.created_at >= cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn github_urls(&self, container: &str) -> Result<Vec<GithubUrl>, MetricsError> {
        Ok(self
            .github
            .lock()
            .unwrap()
            .get(container)
            .map(|url| {
                vec![GithubUrl {
                    github_url: Some(url.clone()),
                }]
            })
            .unwrap_or_default())
    }

    async fn set_timezone(&self, timezone: &str) -> Result<(), MetricsError> {
        if timezone.contains('/') || timezone == "UTC" {
            Ok(())
        } else {
            Err(MetricsError::UnknownTimezone(timezone.to_string()))
        }
    }

    async fn ping(&self) -> bool {
        true
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<FakeStore>,
}

impl TestApp {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self::with_config(engine, AppConfig::default())
    }

    pub fn with_token(engine: Arc<FakeEngine>, token: &str) -> Self {
        let config = AppConfig {
            api_token: Some(token.to_string()),
            ..AppConfig::default()
        };
        Self::with_config(engine, config)
    }

    pub fn with_scrape_path(engine: Arc<FakeEngine>, path: PathBuf) -> Self {
        let config = AppConfig {
            scrape_config_path: path,
            ..AppConfig::default()
        };
        Self::with_config(engine, config)
    }

    pub fn with_request_timeout(engine: Arc<FakeEngine>, request_timeout: std::time::Duration) -> Self {
        let config = AppConfig {
            request_timeout,
            ..AppConfig::default()
        };
        Self::with_config(engine, config)
    }

    fn with_config(engine: Arc<FakeEngine>, config: AppConfig) -> Self {
        let store = Arc::new(FakeStore::default());
        let metrics = MetricsService::new(store.clone(), IngestMode::Confirmed);
        let state = AppState::new(engine.clone(), engine.clone(), metrics, &config);
        let router = create_router(state, false, config.request_timeout);
        Self {
            router,
            engine,
            store,
        }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, body, None).await
    }

    /// Send `raw` verbatim as an `application/json` body
    pub async fn request_raw(&self, method: &str, uri: &str, raw: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        self.dispatch(request).await
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}

pub fn sample(id: &str, name: &str, cpu: &str) -> Value {
    serde_json::json!({
        "ID": id,
        "names": name,
        "cpu": cpu,
        "mem": "0.75%",
        "memuse": "24MiB / 7.7GiB",
        "net": "1.1kB / 0B",
        "block": "0B / 8.19kB",
        "pid": "3"
    })
}
