/// Container metrics: ingest and time-series query
///
/// Ingest is append-only and best-effort: each container's sample is inserted
/// independently and a bad entry never drops the rest of the batch. Queries
/// select every sample for a set of container names inside a trailing window
/// of hours, oldest first.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::batch::{run_best_effort, BatchReport};
use super::error::ErrorClass;
use super::store::{GithubUrl, MetricsStore};
use crate::utils::{parse_percent, IngestMode};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("containers must name at least one container")]
    EmptyContainerList,
    #[error("container names must not be blank")]
    BlankContainerName,
    #[error("time window must be a positive number of hours, got {0}")]
    InvalidWindow(i64),
    #[error("invalid metric sample: {0}")]
    InvalidSample(String),
    #[error("unknown time zone '{0}'")]
    UnknownTimezone(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MetricsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MetricsError::Database(_) => ErrorClass::Database,
            _ => ErrorClass::Validation,
        }
    }
}

/// One stored row of the `metrics` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MetricSample {
    pub id: i64,
    pub container_id: String,
    pub container_name: String,
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub memory_usage: String,
    pub net_io: String,
    pub block_io: String,
    pub pid: i32,
    pub created_at: DateTime<Utc>,
}

/// A sample ready to insert; `created_at` is assigned by the database
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSample {
    #[serde(rename = "ID")]
    pub container_id: String,
    #[serde(rename = "names")]
    pub container_name: String,
    #[serde(rename = "cpu", deserialize_with = "percent")]
    pub cpu_pct: f64,
    #[serde(rename = "mem", deserialize_with = "percent")]
    pub memory_pct: f64,
    #[serde(rename = "memuse")]
    pub memory_usage: String,
    #[serde(rename = "net")]
    pub net_io: String,
    #[serde(rename = "block")]
    pub block_io: String,
    #[serde(deserialize_with = "pid_count")]
    pub pid: i32,
}

impl NewSample {
    /// Parse one entry of an `addMetrics` body (`{ID, names, cpu, mem, memuse, net, block, pid}`)
    pub fn from_value(raw: serde_json::Value) -> Result<Self, MetricsError> {
        let sample: NewSample =
            serde_json::from_value(raw).map_err(|e| MetricsError::InvalidSample(e.to_string()))?;

        if sample.container_id.trim().is_empty() {
            return Err(MetricsError::InvalidSample("`ID` must not be empty".to_string()));
        }
        if sample.container_name.trim().is_empty() {
            return Err(MetricsError::InvalidSample("`names` must not be empty".to_string()));
        }
        Ok(sample)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Accepts `12.5` or `"12.50%"`
fn percent<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) if n.is_finite() => Ok(n),
        NumberOrText::Number(n) => Err(de::Error::custom(format!("invalid percentage {}", n))),
        NumberOrText::Text(s) => {
            parse_percent(&s).ok_or_else(|| de::Error::custom(format!("invalid percentage '{}'", s)))
        }
    }
}

/// Accepts `12` or `"12"`
fn pid_count<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) if n.fract() == 0.0 => n,
        NumberOrText::Number(n) => return Err(de::Error::custom(format!("invalid pid count {}", n))),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.fract() == 0.0)
            .ok_or_else(|| de::Error::custom(format!("invalid pid count '{}'", s)))?,
    };

    if value < 0.0 || value > i32::MAX as f64 {
        return Err(de::Error::custom(format!("pid count out of range: {}", value)));
    }
    Ok(value as i32)
}

/// A validated time-series query: at least one name and a positive window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    containers: Vec<String>,
    hours: i32,
}

impl MetricsQuery {
    pub fn new(containers: Vec<String>, hours: i64) -> Result<Self, MetricsError> {
        if containers.is_empty() {
            return Err(MetricsError::EmptyContainerList);
        }
        if containers.iter().any(|c| c.trim().is_empty()) {
            return Err(MetricsError::BlankContainerName);
        }
        let hours = i32::try_from(hours)
            .ok()
            .filter(|h| *h > 0)
            .ok_or(MetricsError::InvalidWindow(hours))?;

        let mut containers = containers;
        containers.sort();
        containers.dedup();

        Ok(Self { containers, hours })
    }

    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    pub fn hours(&self) -> i32 {
        self.hours
    }
}

/// `SELECT ... WHERE container_name IN ($1, .., $n) AND created_at >= now() - <hours>`
///
/// Every name and the window are bound parameters.
pub fn build_metrics_query(query: &MetricsQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT id, container_id, container_name, cpu_pct, memory_pct, memory_usage, \
         net_io, block_io, pid, created_at FROM metrics WHERE container_name IN (",
    );

    {
        let mut names = builder.separated(", ");
        for name in query.containers() {
            names.push_bind(name.clone());
        }
    }

    builder.push(") AND created_at >= now() - make_interval(hours => ");
    builder.push_bind(query.hours());
    builder.push(") ORDER BY created_at ASC, id ASC");
    builder
}

/// What `addMetrics` reports back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub mode: IngestMode,
    pub submitted: usize,
    /// Only known when the batch was awaited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<IngestFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub container: String,
    pub error: String,
}

/// Insert each sample independently; a parse or insert failure only affects its own entry
pub async fn insert_best_effort(
    store: Arc<dyn MetricsStore>,
    entries: Vec<(String, Result<NewSample, MetricsError>)>,
) -> BatchReport<String> {
    let items = entries.into_iter().map(|(key, parsed)| {
        let store = store.clone();
        let insert = async move {
            let sample = parsed?;
            store.insert_sample(&sample).await
        };
        (key, insert)
    });

    let report = run_best_effort(items).await;
    for (container, error) in report.failures() {
        warn!(container = %container, error = %error, "Failed to insert metric sample");
    }
    debug!(inserted = report.succeeded(), total = report.len(), "Metric batch finished");
    report
}

#[derive(Clone)]
pub struct MetricsService {
    store: Arc<dyn MetricsStore>,
    mode: IngestMode,
}

impl MetricsService {
    pub fn new(store: Arc<dyn MetricsStore>, mode: IngestMode) -> Self {
        Self { store, mode }
    }

    pub fn store(&self) -> &Arc<dyn MetricsStore> {
        &self.store
    }

    /// Ingest an `addMetrics` container map (key -> raw sample)
    pub async fn ingest(&self, containers: BTreeMap<String, serde_json::Value>) -> IngestSummary {
        let entries: Vec<_> = containers
            .into_iter()
            .map(|(key, raw)| (key, NewSample::from_value(raw)))
            .collect();
        self.ingest_samples(entries).await
    }

    /// Ingest already-parsed samples under the configured completion mode
    pub async fn ingest_samples(
        &self,
        entries: Vec<(String, Result<NewSample, MetricsError>)>,
    ) -> IngestSummary {
        let submitted = entries.len();

        match self.mode {
            IngestMode::Detached => {
                let store = self.store.clone();
                tokio::spawn(async move {
                    insert_best_effort(store, entries).await;
                });
                IngestSummary {
                    mode: self.mode,
                    submitted,
                    inserted: None,
                    failed: Vec::new(),
                }
            }
            IngestMode::Confirmed => {
                let report = insert_best_effort(self.store.clone(), entries).await;
                IngestSummary {
                    mode: self.mode,
                    submitted,
                    inserted: Some(report.succeeded()),
                    failed: report
                        .failures()
                        .map(|(container, error)| IngestFailure {
                            container: container.clone(),
                            error: error.to_string(),
                        })
                        .collect(),
                }
            }
        }
    }

    /// Samples for any of the named containers inside the window, oldest first
    pub async fn query(&self, containers: Vec<String>, hours: i64) -> Result<Vec<MetricSample>, MetricsError> {
        let query = MetricsQuery::new(containers, hours)?;
        self.store.query_samples(&query).await
    }

    pub async fn set_timezone(&self, timezone: &str) -> Result<(), MetricsError> {
        if timezone.is_empty() {
            return Err(MetricsError::UnknownTimezone(timezone.to_string()));
        }
        self.store.set_timezone(timezone).await
    }

    /// Repository URLs recorded for a container name
    pub async fn github_urls(&self, container: &str) -> Result<Vec<GithubUrl>, MetricsError> {
        if container.trim().is_empty() {
            return Err(MetricsError::BlankContainerName);
        }
        self.store.github_urls(container).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MockMetricsStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw_sample(id: &str, name: &str) -> serde_json::Value {
        json!({
            "ID": id,
            "names": name,
            "cpu": "0.50%",
            "mem": 1.25,
            "memuse": "12MiB / 1GiB",
            "net": "1.2kB / 3kB",
            "block": "0B / 0B",
            "pid": 7
        })
    }

    #[test]
    fn test_sample_accepts_docker_stats_strings() {
        let sample = NewSample::from_value(raw_sample("abc", "web")).unwrap();
        assert_eq!(sample.container_id, "abc");
        assert_eq!(sample.container_name, "web");
        assert_eq!(sample.cpu_pct, 0.5);
        assert_eq!(sample.memory_pct, 1.25);
        assert_eq!(sample.pid, 7);

        let mut raw = raw_sample("abc", "web");
        raw["pid"] = json!("12");
        assert_eq!(NewSample::from_value(raw).unwrap().pid, 12);
    }

    #[test]
    fn test_sample_rejects_malformed_fields() {
        let mut missing = raw_sample("abc", "web");
        missing.as_object_mut().unwrap().remove("memuse");
        assert!(matches!(NewSample::from_value(missing), Err(MetricsError::InvalidSample(_))));

        let mut bad_cpu = raw_sample("abc", "web");
        bad_cpu["cpu"] = json!("lots");
        assert!(NewSample::from_value(bad_cpu).is_err());

        let mut negative_pid = raw_sample("abc", "web");
        negative_pid["pid"] = json!(-1);
        assert!(NewSample::from_value(negative_pid).is_err());

        assert!(NewSample::from_value(raw_sample("", "web")).is_err());
        assert!(NewSample::from_value(json!("not an object")).is_err());
    }

    #[test]
    fn test_query_validation() {
        assert!(matches!(MetricsQuery::new(vec![], 1), Err(MetricsError::EmptyContainerList)));
        assert!(matches!(
            MetricsQuery::new(vec!["web".into(), " ".into()], 1),
            Err(MetricsError::BlankContainerName)
        ));
        assert!(matches!(MetricsQuery::new(vec!["web".into()], 0), Err(MetricsError::InvalidWindow(0))));
        assert!(matches!(
            MetricsQuery::new(vec!["web".into()], i64::MAX),
            Err(MetricsError::InvalidWindow(_))
        ));

        let q = MetricsQuery::new(vec!["db".into(), "web".into(), "db".into()], 24).unwrap();
        assert_eq!(q.containers(), &["db".to_string(), "web".to_string()]);
        assert_eq!(q.hours(), 24);
    }

    #[test]
    fn test_query_sql_binds_every_name() {
        let single = MetricsQuery::new(vec!["web".into()], 1).unwrap();
        let sql = build_metrics_query(&single).sql().to_string();
        assert!(sql.contains("container_name IN ($1)"));
        assert!(sql.contains("make_interval(hours => $2)"));
        assert!(sql.ends_with("ORDER BY created_at ASC, id ASC"));

        let names: Vec<String> = (0..5).map(|i| format!("c{}", i)).collect();
        let many = MetricsQuery::new(names, 6).unwrap();
        let sql = build_metrics_query(&many).sql().to_string();
        assert!(sql.contains("container_name IN ($1, $2, $3, $4, $5)"));
        assert!(sql.contains("make_interval(hours => $6)"));
        assert!(!sql.contains("c0"));
    }

    #[tokio::test]
    async fn test_one_bad_entry_does_not_drop_the_batch() {
        let mut store = MockMetricsStore::new();
        store
            .expect_insert_sample()
            .returning(|sample| {
                if sample.container_name == "broken-db" {
                    Err(MetricsError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(())
                }
            });

        let service = MetricsService::new(Arc::new(store), IngestMode::Confirmed);

        let mut malformed = raw_sample("x", "cache");
        malformed["cpu"] = json!({});

        let containers: BTreeMap<String, serde_json::Value> = [
            ("a".to_string(), raw_sample("1", "web")),
            ("b".to_string(), raw_sample("2", "broken-db")),
            ("c".to_string(), malformed),
            ("d".to_string(), raw_sample("4", "worker")),
        ]
        .into_iter()
        .collect();

        let summary = service.ingest(containers).await;
        assert_eq!(summary.submitted, 4);
        assert_eq!(summary.inserted, Some(2));
        let failed: Vec<&str> = summary.failed.iter().map(|f| f.container.as_str()).collect();
        assert_eq!(failed, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_ingest_succeeds_without_inserts() {
        let mut store = MockMetricsStore::new();
        store.expect_insert_sample().never();

        let service = MetricsService::new(Arc::new(store), IngestMode::Confirmed);
        let summary = service.ingest(BTreeMap::new()).await;
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.inserted, Some(0));
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_identical_ingest_appends_twice() {
        let inserts = Arc::new(AtomicUsize::new(0));
        let counter = inserts.clone();

        let mut store = MockMetricsStore::new();
        store.expect_insert_sample().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let service = MetricsService::new(Arc::new(store), IngestMode::Confirmed);
        let body: BTreeMap<String, serde_json::Value> =
            [("web".to_string(), raw_sample("1", "web"))].into_iter().collect();

        service.ingest(body.clone()).await;
        service.ingest(body).await;
        assert_eq!(inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_detached_ingest_answers_before_inserting() {
        let mut store = MockMetricsStore::new();
        store.expect_insert_sample().returning(|_| Ok(()));

        let service = MetricsService::new(Arc::new(store), IngestMode::Detached);
        let body: BTreeMap<String, serde_json::Value> =
            [("web".to_string(), raw_sample("1", "web"))].into_iter().collect();

        let summary = service.ingest(body).await;
        assert_eq!(summary.mode, IngestMode::Detached);
        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.inserted, None);
    }

    #[tokio::test]
    async fn test_query_rejects_empty_list_before_store() {
        let mut store = MockMetricsStore::new();
        store.expect_query_samples().never();

        let service = MetricsService::new(Arc::new(store), IngestMode::Detached);
        let err = service.query(vec![], 24).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);
    }
}
