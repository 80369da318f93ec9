//! # Database Connection Pool Module
//!
//! Provides SQLite connection pooling for the media catalog.
//!
//! ## Features
//!
//! - **WAL Mode**: A running migration writes while `status`/`cancel`
//!   commands read from another process
//! - **Connection Pooling**: Configurable min/max connections with timeouts
//! - **Automatic Migrations**: Runs on initialization
//! - **Health Checks**: Connection validation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{DatabaseConfig, create_pool};
//!
//! let pool = create_pool(DatabaseConfig::new("/srv/media/catalog.db")).await?;
//! ```
//!
//! ## Testing
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite:<path>` or `sqlite::memory:`)
    pub database_url: String,

    pub min_connections: u32,

    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Time a writer waits on a locked database before failing
    pub busy_timeout: Duration,

    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Create a configuration for an in-memory database (useful for testing)
    ///
    /// Every connection to `:memory:` opens a separate database, so the pool
    /// is pinned to a single connection that never expires.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the catalog database, apply pending migrations and verify the
/// connection.
///
/// File-backed databases use WAL journaling so a running batch and a
/// `status`/`cancel` invocation in another process do not block each other.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, a migration fails or
/// the health check query fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(database_url = %config.database_url, "Opening catalog database");

    let file_backed = !config.is_in_memory();
    let mut options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout)
        .synchronous(SqliteSynchronous::Normal);
    if file_backed {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(file_backed.then(|| Duration::from_secs(30 * 60)))
        .connect_with(options)
        .await
        .inspect_err(|e| warn!(error = %e, "Cannot open catalog database"))?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;
    Ok(pool)
}

/// Create an in-memory pool with migrations applied
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Apply the embedded `migrations/` that have not run yet
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;
    debug!("Catalog schema up to date");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool_applies_migrations() {
        let pool = create_test_pool().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('attachments', 'batch_states') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables.into_iter().map(|(n,)| n).collect::<Vec<_>>(),
            vec!["attachments".to_string(), "batch_states".to_string()]
        );
    }

    #[tokio::test]
    async fn test_file_backed_pool() {
        let dir = std::env::temp_dir().join(format!("core-library-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        assert!(health_check(&pool).await.is_ok());
        pool.close().await;

        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("/tmp/catalog.db")
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(60))
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.database_url, "sqlite:/tmp/catalog.db");
        assert!(!config.is_in_memory());
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(DatabaseConfig::in_memory().is_in_memory());
    }
}
