//! Query metadata lookup
//!
//! Resolves a backend pid to the database, user and statement it is running.

use crate::config::DatabaseConfig;
use crate::utils::{TracerError, TracerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub db_name: String,
    pub user_name: String,
    pub query_text: String,
    pub backend_state: Option<String>,
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// `Ok(None)` when the pid is not (or no longer) a client backend
    async fn lookup(&self, pid: i32) -> TracerResult<Option<QueryMetadata>>;
}

/// Used when no database is configured
pub struct NoopMetadataLookup;

#[async_trait]
impl MetadataLookup for NoopMetadataLookup {
    async fn lookup(&self, _pid: i32) -> TracerResult<Option<QueryMetadata>> {
        Ok(None)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    datname: Option<String>,
    usename: Option<String>,
    query: Option<String>,
    state: Option<String>,
}

/// Looks pids up in `pg_stat_activity`
pub struct PgActivityLookup {
    pool: PgPool,
}

impl PgActivityLookup {
    pub async fn connect(config: &DatabaseConfig) -> TracerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;
        tracing::info!("Metadata lookup pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataLookup for PgActivityLookup {
    async fn lookup(&self, pid: i32) -> TracerResult<Option<QueryMetadata>> {
        let row: Option<ActivityRow> = sqlx::query_as(
            "SELECT datname, usename, query, state FROM pg_stat_activity \
             WHERE pid = $1 AND coalesce(datname, '') <> ''",
        )
        .bind(pid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| QueryMetadata {
            db_name: row.datname.unwrap_or_default(),
            user_name: row.usename.unwrap_or_default(),
            query_text: row.query.unwrap_or_default(),
            backend_state: row.state,
        }))
    }
}

/// Pick the lookup for `config`: Postgres when a url is set, no-op otherwise
pub async fn build_metadata_lookup(
    config: &DatabaseConfig,
) -> TracerResult<Arc<dyn MetadataLookup>> {
    if config.url.trim().is_empty() {
        return Ok(Arc::new(NoopMetadataLookup));
    }
    let lookup = PgActivityLookup::connect(config)
        .await
        .map_err(|e| TracerError::metadata(format!("failed to connect metadata pool: {}", e)))?;
    Ok(Arc::new(lookup))
}
