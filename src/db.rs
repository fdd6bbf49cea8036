//! SQLite pool construction shared by every storage in the crate

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::time::Duration;

/// Open (creating if missing) the database at `db_path`, along with its
/// parent directory.
pub async fn connect(db_path: &Path, max_connections: u32) -> Result<SqlitePool, String> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }

    let mut options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    options.disable_statement_logging();

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to connect to database {}: {}", db_path.display(), e))?;

    tracing::debug!(path = %db_path.display(), max_connections, "Opened SQLite pool");
    Ok(pool)
}
