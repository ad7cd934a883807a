//! SQLite-backed persistence for the operational and analytics stores.
//!
//! Both stores follow the teacher's `Arc<Mutex<Connection>>` pattern: a
//! single connection per store, guarded by a tokio mutex so async callers
//! never block the runtime on SQLite's own locking.

pub mod analytics;
pub mod operational;
mod schema;

pub use analytics::AnalyticsStore;
pub use operational::OperationalStore;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe database connection shared by a store's methods.
pub type DbConnection = Arc<Mutex<Connection>>;

fn open(db_path: &Path, schema_sql: &str) -> Result<DbConnection, Box<dyn std::error::Error + Send + Sync>> {
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(schema_sql)?;
    Ok(Arc::new(Mutex::new(conn)))
}
