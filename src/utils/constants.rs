/// Defaults and well-known names shared by the server, the CLI and the collector

use std::time::Duration;

/// Default bind address for `docketeer serve`
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Postgres pool sizing
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for a single HTTP request, end to end
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout handed to the bollard client (seconds granularity)
pub const DEFAULT_DOCKER_TIMEOUT: Duration = Duration::from_secs(20);

/// Collector is off unless configured
pub const DEFAULT_COLLECTOR_INTERVAL: Duration = Duration::from_secs(0);

pub const DEFAULT_SCRAPE_CONFIG_PATH: &str = "prometheus/prometheus.yml";

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx::query=warn,tower_http=info";

// Environment variables recognised on top of the config file
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_API_TOKEN: &str = "DOCKETEER_API_TOKEN";
pub const ENV_HOST: &str = "DOCKETEER_HOST";
pub const ENV_PORT: &str = "DOCKETEER_PORT";
pub const ENV_INGEST_MODE: &str = "DOCKETEER_INGEST_MODE";
pub const ENV_COLLECTOR_INTERVAL: &str = "DOCKETEER_COLLECTOR_INTERVAL";
pub const ENV_SCRAPE_CONFIG_PATH: &str = "DOCKETEER_SCRAPE_CONFIG";

/// Config directory name under the platform config dir
pub const CONFIG_DIR_NAME: &str = "docketeer";
pub const CONFIG_FILE_NAME: &str = "config.toml";
