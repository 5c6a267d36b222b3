/// Prometheus scrape configuration management
///
/// Reads and replaces the `scrape_configs` section of the YAML file the
/// monitoring stack loads. Keys this service does not manage are preserved.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ScrapeConfigError {
    #[error("Failed to access scrape config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Scrape config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid scrape config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
    /// `scheme`, `basic_auth`, `relabel_configs` and the rest, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The whole file; unknown top-level sections ride along in `other`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<serde_yaml::Value>,
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeJob>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

/// What `GET /config/scrape` returns and `PUT /config/scrape` accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<serde_json::Value>,
    pub scrape_configs: Vec<ScrapeJob>,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfigService {
    path: PathBuf,
}

impl ScrapeConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current settings; a missing file reads as empty
    pub fn load(&self) -> Result<ScrapeSettings, ScrapeConfigError> {
        settings_from_file(self.read_file()?)
    }

    /// Replace `scrape_configs` (and `global` when given). Last writer wins.
    pub fn replace(&self, settings: ScrapeSettings) -> Result<ScrapeSettings, ScrapeConfigError> {
        validate_jobs(&settings.scrape_configs)?;

        let mut file = self.read_file()?;
        file.scrape_configs = settings.scrape_configs;
        if let Some(global) = settings.global {
            file.global = Some(serde_yaml::to_value(global)?);
        }

        let rendered = serde_yaml::to_string(&file)?;
        self.write_atomic(&rendered)?;
        info!(
            path = %self.path.display(),
            jobs = file.scrape_configs.len(),
            "Scrape config updated"
        );

        settings_from_file(file)
    }

    fn read_file(&self) -> Result<ScrapeConfigFile, ScrapeConfigError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(ScrapeConfigFile::default()),
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScrapeConfigFile::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Write to a uniquely named temp file in the same directory, then rename
    /// it over the original so readers only ever see a complete file
    fn write_atomic(&self, content: &str) -> Result<(), ScrapeConfigError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(content.as_bytes()).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        tmp.persist(&self.path)
            .map(|_| ())
            .map_err(|e| self.io_error(e.error))
    }

    fn io_error(&self, source: std::io::Error) -> ScrapeConfigError {
        ScrapeConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn settings_from_file(file: ScrapeConfigFile) -> Result<ScrapeSettings, ScrapeConfigError> {
    let global = match file.global {
        Some(value) => Some(yaml_to_json(value)?),
        None => None,
    };
    Ok(ScrapeSettings {
        global,
        scrape_configs: file.scrape_configs,
    })
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value, ScrapeConfigError> {
    serde_json::to_value(value).map_err(|e| ScrapeConfigError::Invalid(e.to_string()))
}

/// Job names non-empty and unique; every target non-empty
pub fn validate_jobs(jobs: &[ScrapeJob]) -> Result<(), ScrapeConfigError> {
    let mut seen = HashSet::new();

    for job in jobs {
        let name = job.job_name.trim();
        if name.is_empty() {
            return Err(ScrapeConfigError::Invalid("job_name must not be empty".to_string()));
        }
        if !seen.insert(name) {
            return Err(ScrapeConfigError::Invalid(format!("duplicate job_name '{}'", name)));
        }
        let blank_target = job
            .static_configs
            .iter()
            .flat_map(|c| c.targets.iter())
            .any(|t| t.trim().is_empty());
        if blank_target {
            return Err(ScrapeConfigError::Invalid(format!(
                "job '{}' has an empty target",
                name
            )));
        }
    }

    Ok(())
}
