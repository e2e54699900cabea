pub mod operations;
pub mod schema;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::{env_parse, env_string};

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DbInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Shared handle to the SQLite store.
///
/// Every service call that touches the store is bounded by `store_timeout`.
#[derive(Debug, Clone)]
pub struct DatabaseProxy {
    pool: SqlitePool,
    store_timeout: Duration,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Self, DbInitError> {
        let configured = env_string("DATABASE_URL");
        if configured.is_none() {
            if let Some(parent) = default_db_path().parent() {
                std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
            }
        }
        let url = database_url(configured);
        let timeout = env_parse::<u64>("STORE_TIMEOUT_MS").unwrap_or(DEFAULT_STORE_TIMEOUT_MS);
        Self::connect(&url, Duration::from_millis(timeout)).await
    }

    pub async fn connect(url: &str, store_timeout: Duration) -> Result<Self, DbInitError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // an in-memory database lives exactly as long as its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        schema::apply_schema(&pool).await?;

        tracing::info!(in_memory, "sqlite store ready");
        Ok(Self {
            pool,
            store_timeout,
        })
    }

    pub async fn in_memory() -> Result<Self, DbInitError> {
        Self::connect("sqlite::memory:", Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS)).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub async fn healthy(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// Falls back to a file under the user data directory when no URL is set.
fn database_url(configured: Option<String>) -> String {
    match configured.filter(|v| !v.trim().is_empty()) {
        Some(url) => url.trim().to_string(),
        None => format!("sqlite:{}?mode=rwc", default_db_path().display()),
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexiflow")
        .join("data.db")
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
