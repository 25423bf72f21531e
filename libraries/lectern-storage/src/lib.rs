//! Lectern Storage
//!
//! Device-local persistence for Lectern: progress of works played from local
//! copies and the offline queue of session snapshots that still have to reach
//! the server.
//!
//! # Architecture
//!
//! - **SQLite** (`SqliteProgressStore`): survives restarts, used by the apps
//! - **Memory** (`MemoryProgressStore`): ephemeral, used for dry runs
//! - **Offline-First**: Queue snapshots when offline, sync when connected
//!
//! # Example
//!
//! ```rust,no_run
//! use lectern_storage::{create_pool, run_migrations, SqliteProgressStore};
//! use lectern_core::ProgressStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://lectern.db").await?;
//! run_migrations(&pool).await?;
//!
//! let store = SqliteProgressStore::new(pool);
//! let pending = store.pending().await?;
//! println!("{} sessions waiting to sync", pending.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod memory;
mod sqlite;

pub use error::StorageError;
pub use memory::MemoryProgressStore;
pub use sqlite::SqliteProgressStore;

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// This should be called once when the application starts to ensure
/// the database schema is up to date.
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://lectern.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    debug!(url = %database_url, "Creating progress store pool");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}
