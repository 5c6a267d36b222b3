/// Postgres-backed store for metric samples and container metadata
///
/// The pool is built once at startup from `AppConfig`, handed to the
/// services that need it, and closed on shutdown.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::metrics::{build_metrics_query, MetricSample, MetricsError, MetricsQuery, NewSample};
use crate::utils::AppConfig;

/// `github_url` row from the `containers` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GithubUrl {
    pub github_url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append one sample; never updates an existing row
    async fn insert_sample(&self, sample: &NewSample) -> Result<(), MetricsError>;

    async fn query_samples(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>, MetricsError>;

    async fn github_urls(&self, container: &str) -> Result<Vec<GithubUrl>, MetricsError>;

    /// Set the database default time zone after checking the name is known
    async fn set_timezone(&self, timezone: &str) -> Result<(), MetricsError>;

    async fn ping(&self) -> bool;
}

#[derive(Clone)]
pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the pool from config; does not run migrations
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let url = config.require_database_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.db_acquire_timeout)
            .connect(url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to metrics database");
        Ok(Self { pool })
    }

    /// Apply the embedded migrations under ./migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Metrics database pool closed");
    }
}

const INSERT_SAMPLE: &str = "INSERT INTO metrics \
    (container_id, container_name, cpu_pct, memory_pct, memory_usage, net_io, block_io, pid) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

#[async_trait]
impl MetricsStore for PgMetricsStore {
    async fn insert_sample(&self, sample: &NewSample) -> Result<(), MetricsError> {
        sqlx::query(INSERT_SAMPLE)
            .bind(&sample.container_id)
            .bind(&sample.container_name)
            .bind(sample.cpu_pct)
            .bind(sample.memory_pct)
            .bind(&sample.memory_usage)
            .bind(&sample.net_io)
            .bind(&sample.block_io)
            .bind(sample.pid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_samples(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>, MetricsError> {
        let mut builder = build_metrics_query(query);
        let rows = builder
            .build_query_as::<MetricSample>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn github_urls(&self, container: &str) -> Result<Vec<GithubUrl>, MetricsError> {
        let rows = sqlx::query_as::<_, GithubUrl>("SELECT github_url FROM containers WHERE name = $1")
            .bind(container)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_timezone(&self, timezone: &str) -> Result<(), MetricsError> {
        let known: Option<String> =
            sqlx::query_scalar("SELECT name FROM pg_timezone_names WHERE name = $1")
                .bind(timezone)
                .fetch_optional(&self.pool)
                .await?;
        let zone = known.ok_or_else(|| MetricsError::UnknownTimezone(timezone.to_string()))?;

        let database: String = sqlx::query_scalar("SELECT current_database()")
            .fetch_one(&self.pool)
            .await?;

        // ALTER DATABASE takes no bind parameters; both parts come from the catalog
        let statement = format!(
            "ALTER DATABASE {} SET timezone TO {}",
            quote_identifier(&database),
            quote_literal(&zone)
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        info!(timezone = %zone, database = %database, "Database time zone updated");
        Ok(())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
