//! SQLite connection pool wrapper for the storage crate.

use log::info;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

/// Manages a single SQLite pool; creates the DB file if missing.
#[derive(Clone)]
pub struct SqlitePoolManager {
    pool: SqlitePool,
}

impl SqlitePoolManager {
    /// Creates a pool for the given database path, or an in-memory database for
    /// `sqlite::memory:` / `:memory:`.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("Initializing SQLite pool: {}", database_url);

        let options = if matches!(database_url, "sqlite::memory:" | ":memory:") {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .create_if_missing(true)
                .filename(database_url.trim_start_matches("sqlite://"))
        };

        // A single connection keeps an in-memory database alive and shared.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Returns the underlying pool for running queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
