pub mod batch;
pub mod collector;
pub mod docker;
pub mod error;
pub mod metrics;
pub mod network;
pub mod scrape_config;
pub mod store;

pub use collector::MetricsCollector;
pub use docker::{DockerManager, EngineHost, PruneReport};
pub use error::ErrorClass;
pub use metrics::{MetricSample, MetricsError, MetricsService, NewSample};
pub use network::{NetworkEngine, NetworkError, NetworkReconciler, NetworkView};
pub use scrape_config::{ScrapeConfigError, ScrapeConfigService, ScrapeSettings};
pub use store::{MetricsStore, PgMetricsStore};
