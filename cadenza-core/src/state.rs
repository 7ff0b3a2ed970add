//! Keyed JSON state persisted in the `kv` table.

use crate::db::Database;
use crate::error::Result;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Playlist blob (ordered track list)
pub const PLAYLIST_KEY: &str = "playlist";
/// Selected playlist index
pub const CURRENT_INDEX_KEY: &str = "current_index";
/// Playback volume (0-100)
pub const VOLUME_KEY: &str = "volume";
/// Search timestamps for the rate limiter
pub const SEARCH_REQUESTS_KEY: &str = "search_requests";

/// Local persistent key-value store with JSON-encoded values.
#[derive(Clone)]
pub struct StateStore {
    db: Database,
}

impl StateStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
                let value = stmt
                    .query_row(rusqlite::params![key], |row| row.get::<_, String>(0))
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(Into::into)
    }

    /// Write a raw value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn put_raw(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        let now = Utc::now().timestamp();
        self.db
            .conn()
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                ",
                    rusqlite::params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Read and decode a JSON value.
    ///
    /// A value that no longer decodes (hand-edited, or written by an older
    /// layout) is treated as missing so startup never fails on stale state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key).await? else {
            debug!("No persisted value for {}", key);
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring undecodable persisted value for {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Encode and write a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the database write fails.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put_raw(key, raw).await
    }
}
