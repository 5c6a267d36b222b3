/// Application configuration management
///
/// Layers, lowest to highest precedence: built-in defaults, a TOML file
/// (`--config` or ~/.config/docketeer/config.toml), environment variables
/// (a `.env` file is loaded by the binary), then CLI flags.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::constants::*;

/// Whether `addMetrics` waits for its inserts before answering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Respond immediately, inserts run in a spawned task
    #[default]
    Detached,
    /// Await every insert and report per-item failures
    Confirmed,
}

impl FromStr for IngestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "detached" => Ok(IngestMode::Detached),
            "confirmed" => Ok(IngestMode::Confirmed),
            other => Err(anyhow!("unknown ingest mode '{}' (expected detached or confirmed)", other)),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Detached => write!(f, "detached"),
            IngestMode::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// On-disk shape; every key is optional so a file can override a subset
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    cors: Option<bool>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    db_acquire_timeout: Option<String>,
    request_timeout: Option<String>,
    docker_timeout: Option<String>,
    ingest_mode: Option<IngestMode>,
    collector_interval: Option<String>,
    scrape_config_path: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
    pub database_url: String,
    pub max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub docker_timeout: Duration,
    pub ingest_mode: IngestMode,
    pub collector_interval: Duration,
    pub scrape_config_path: PathBuf,
    pub api_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors: false,
            database_url: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            db_acquire_timeout: DEFAULT_DB_ACQUIRE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            docker_timeout: DEFAULT_DOCKER_TIMEOUT,
            ingest_mode: IngestMode::default(),
            collector_interval: DEFAULT_COLLECTOR_INTERVAL,
            scrape_config_path: PathBuf::from(DEFAULT_SCRAPE_CONFIG_PATH),
            api_token: None,
        }
    }
}

impl AppConfig {
    /// Default config file location (~/.config/docketeer/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load defaults, then the config file, then the process environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match explicit {
            Some(path) => config.apply_file(path)?,
            None => {
                if let Some(path) = Self::config_path().filter(|p| p.exists()) {
                    config.apply_file(&path)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        self.apply_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_toml(&mut self, contents: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(contents)?;

        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(cors) = file.cors {
            self.cors = cors;
        }
        if let Some(url) = file.database_url {
            self.database_url = url;
        }
        if let Some(max) = file.max_connections {
            self.max_connections = max;
        }
        if let Some(raw) = file.db_acquire_timeout {
            self.db_acquire_timeout = parse_duration("db_acquire_timeout", &raw)?;
        }
        if let Some(raw) = file.request_timeout {
            self.request_timeout = parse_duration("request_timeout", &raw)?;
        }
        if let Some(raw) = file.docker_timeout {
            self.docker_timeout = parse_duration("docker_timeout", &raw)?;
        }
        if let Some(mode) = file.ingest_mode {
            self.ingest_mode = mode;
        }
        if let Some(raw) = file.collector_interval {
            self.collector_interval = parse_duration("collector_interval", &raw)?;
        }
        if let Some(path) = file.scrape_config_path {
            self.scrape_config_path = PathBuf::from(path);
        }
        if let Some(token) = file.api_token {
            self.api_token = Some(token).filter(|t| !t.trim().is_empty());
        }

        Ok(())
    }

    /// Overlay environment variables; `lookup` is injected so tests avoid process env
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        }
        if let Some(mode) = lookup(ENV_INGEST_MODE) {
            self.ingest_mode = mode.parse()?;
        }
        if let Some(raw) = lookup(ENV_COLLECTOR_INTERVAL) {
            self.collector_interval = parse_duration(ENV_COLLECTOR_INTERVAL, &raw)?;
        }
        if let Some(path) = lookup(ENV_SCRAPE_CONFIG_PATH) {
            self.scrape_config_path = PathBuf::from(path);
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than zero");
        }
        Ok(())
    }

    /// Database URL, required by every command that touches the metrics store
    pub fn require_database_url(&self) -> Result<&str> {
        if self.database_url.trim().is_empty() {
            bail!("{} must be set (environment, .env or config file)", ENV_DATABASE_URL);
        }
        Ok(&self.database_url)
    }

    pub fn collector_enabled(&self) -> bool {
        !self.collector_interval.is_zero()
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} must be a duration like \"30s\", got '{}'", key, raw))
}
