//! Shared libSQL handle and schema.
//!
//! One database carries both tables, so the record store and the expiry
//! index can share a single connection. It can connect to:
//! - Remote Turso database (cloud)
//! - Local embedded SQLite file
//! - In-memory database (tests, ephemeral runs)

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use tracing::debug;

use crate::error::{Result, StoreError};

/// SQL schema for the selections table.
const SCHEMA_SELECTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS selections (
    id TEXT PRIMARY KEY,
    arm INTEGER NOT NULL,
    feature TEXT NOT NULL,
    status TEXT NOT NULL,
    reward REAL NOT NULL DEFAULT 0,
    origin TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL schema for the expiry index; one sorted set per namespace.
const SCHEMA_EXPIRY_INDEX: &str = r#"
CREATE TABLE IF NOT EXISTS expiry_index (
    namespace TEXT NOT NULL,
    member TEXT NOT NULL,
    score INTEGER NOT NULL,
    PRIMARY KEY (namespace, member)
)
"#;

const INDEX_EXPIRY_SCORE: &str = r#"
CREATE INDEX IF NOT EXISTS idx_expiry_index_score
ON expiry_index(namespace, score)
"#;

/// Handle to a libSQL database with the lever schema applied
#[derive(Clone)]
pub struct TursoDatabase {
    _db: Arc<Database>,
    conn: Connection,
}

impl TursoDatabase {
    /// Open (or create) a local embedded database file.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::open(db).await
    }

    /// Connect to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        Self::open(db).await
    }

    /// Create an in-memory database (for testing).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::open(db).await
    }

    async fn open(db: Database) -> Result<Self> {
        // An in-memory database lives as long as its connection, so keep one.
        let conn = db.connect()?;
        let database = Self {
            _db: Arc::new(db),
            conn,
        };
        database.ensure_schema().await?;
        Ok(database)
    }

    /// Get a database connection.
    pub(crate) fn conn(&self) -> Connection {
        self.conn.clone()
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute(SCHEMA_SELECTIONS, ()).await?;
        conn.execute(SCHEMA_EXPIRY_INDEX, ()).await?;
        conn.execute(INDEX_EXPIRY_SCORE, ()).await?;
        debug!("Database schema ready");
        Ok(())
    }
}

/// Format a datetime for storage, keeping sub-second precision.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a datetime from storage.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidData(format!("invalid datetime: {s}")))
}
