//! SQLite database holding all persisted state.

use crate::error::Result;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::info;

const SCHEMA_SQL: &str = r"
-- Small JSON-encoded values: playlist, cursor, volume, rate limiter timestamps
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Expiring asset lookups (cover URLs)
CREATE TABLE IF NOT EXISTS asset_cache (
    provider TEXT NOT NULL,
    asset_id TEXT NOT NULL,
    variant TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (provider, asset_id, variant)
);

CREATE INDEX IF NOT EXISTS idx_asset_cache_expires ON asset_cache(expires_at);
";

/// Handle to the state database. Cheap to clone; all clones share one
/// background connection, so writes are serialized.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or opened.
    pub async fn new() -> Result<Self> {
        Self::open(&crate::paths::state_db_path()).await
    }

    /// Open a database at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening state database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::init(conn, true).await
    }

    /// Open a throwaway in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal: bool) -> Result<Self> {
        conn.call(move |conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            Ok(())
        })
        .await?;

        info!("State database initialized");
        Ok(Self { conn })
    }

    pub(crate) const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint WAL for clean shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}
