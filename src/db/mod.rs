// Database layer: relationship store, denormalized counters, notifications.
//
// SQLite (rusqlite, "bundled" feature so there's no system SQLite dependency)
// is the default backend; the file lives wherever MURMUR_DB_PATH points
// (defaults to ./murmur.db). PostgreSQL is available behind the `postgres`
// feature when DATABASE_URL points at a Postgres server.

pub mod models;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use traits::Database;

#[cfg(feature = "sqlite")]
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
#[cfg(feature = "sqlite")]
use anyhow::Context;
#[cfg(feature = "sqlite")]
use rusqlite::Connection;

/// Open (or create) the SQLite database, run migrations, and wrap it.
///
/// This is the main entry point, called by `murmur init` and by any
/// command that needs database access.
#[cfg(feature = "sqlite")]
pub fn initialize_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(Arc::new(sqlite::SqliteDatabase::new(conn)))
}

/// Open an existing SQLite database (fails if it doesn't exist yet).
#[cfg(feature = "sqlite")]
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `murmur init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Pick up any migrations added since the file was created.
    schema::create_tables(&conn)?;

    Ok(Arc::new(sqlite::SqliteDatabase::new(conn)))
}

/// Connect to PostgreSQL and run migrations.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(database_url: &str) -> Result<Arc<dyn Database>> {
    let db = postgres::PgDatabase::connect(database_url).await?;
    Ok(Arc::new(db))
}
