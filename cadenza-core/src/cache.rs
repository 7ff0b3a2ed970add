use crate::db::Database;
use crate::error::Result;
use crate::time::{Clock, DurationExt};
use crate::track::ProviderId;
use rusqlite::OptionalExtension;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "cadenza::cache";

/// Composite cache key: provider, provider asset id and variant (e.g. cover size)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub provider: ProviderId,
    pub asset_id: String,
    pub variant: String,
}

impl AssetKey {
    pub fn new(
        provider: ProviderId,
        asset_id: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            asset_id: asset_id.into(),
            variant: variant.into(),
        }
    }

    /// Cover key for a given pixel size
    pub fn cover(provider: ProviderId, asset_id: impl Into<String>, size: u32) -> Self {
        Self::new(provider, asset_id, size.to_string())
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.asset_id, self.variant)
    }
}

/// Expiring key/value cache for resolved asset URLs.
///
/// Entries are never returned after their expiry. Expired rows are deleted
/// when a lookup hits them; [`AssetCache::purge_expired`] is optional
/// housekeeping.
#[derive(Clone)]
pub struct AssetCache {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl AssetCache {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Look up a live entry
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, key: &AssetKey) -> Result<Option<String>> {
        let now = self.clock.now().timestamp_millis();
        debug!(target: LOG_TARGET, "Looking up asset cache entry {}", key);
        let AssetKey {
            provider,
            asset_id,
            variant,
        } = key.clone();

        self.db
            .conn()
            .call(move |conn| {
                let params = rusqlite::params![provider.as_str(), asset_id, variant];
                let entry = conn
                    .prepare_cached(
                        r"
                        SELECT value, expires_at FROM asset_cache
                        WHERE provider = ?1 AND asset_id = ?2 AND variant = ?3
                    ",
                    )?
                    .query_row(params, |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .optional()?;

                match entry {
                    Some((value, expires_at)) if now < expires_at => Ok(Some(value)),
                    Some(_) => {
                        conn.execute(
                            "DELETE FROM asset_cache WHERE provider = ?1 AND asset_id = ?2 AND variant = ?3",
                            params,
                        )?;
                        Ok(None)
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(Into::into)
    }

    /// Store an entry that expires `ttl` from now
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn put(&self, key: &AssetKey, value: &str, ttl: Duration) -> Result<()> {
        let value = value.to_string();
        let expires_at = self
            .clock
            .now()
            .timestamp_millis()
            .saturating_add(ttl.as_millis_i64());
        debug!(target: LOG_TARGET, "Caching asset {} for {:?}", key, ttl);
        let AssetKey {
            provider,
            asset_id,
            variant,
        } = key.clone();

        self.db
            .conn()
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO asset_cache (provider, asset_id, variant, value, expires_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(provider, asset_id, variant) DO UPDATE SET
                        value = excluded.value,
                        expires_at = excluded.expires_at
                ",
                    rusqlite::params![provider.as_str(), asset_id, variant, value, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Delete every expired entry, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the database cleanup fails.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now().timestamp_millis();
        let deleted = self
            .db
            .conn()
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM asset_cache WHERE expires_at <= ?1",
                    rusqlite::params![now],
                )?;
                Ok(deleted)
            })
            .await?;
        if deleted > 0 {
            info!(target: LOG_TARGET, "Purged {} expired asset cache entries", deleted);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::DateTime;

    async fn cache_with_clock() -> (AssetCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let db = Database::open_in_memory().await.unwrap();
        (AssetCache::new(db, clock.clone()), clock)
    }

    fn key() -> AssetKey {
        AssetKey::cover(ProviderId::new("netease"), "pic42", 500)
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key().to_string(), "netease:pic42:500");
    }

    #[test]
    fn test_variants_are_distinct_keys() {
        let small = AssetKey::cover(ProviderId::new("netease"), "pic42", 300);
        assert_ne!(small.to_string(), key().to_string());
    }

    #[tokio::test]
    async fn test_colons_in_ids_do_not_collide() {
        let (cache, _clock) = cache_with_clock().await;
        let a = AssetKey::new(ProviderId::new("netease"), "a:b", "c");
        let b = AssetKey::new(ProviderId::new("netease"), "a", "b:c");
        assert_eq!(a.to_string(), b.to_string());

        cache.put(&a, "first", Duration::from_secs(60)).await.unwrap();
        cache.put(&b, "second", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&a).await.unwrap().as_deref(), Some("first"));
        assert_eq!(cache.get(&b).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_get_before_expiry() {
        let (cache, clock) = cache_with_clock().await;
        cache
            .put(&key(), "https://img.example/42.jpg", Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(59));
        assert_eq!(
            cache.get(&key()).await.unwrap().as_deref(),
            Some("https://img.example/42.jpg")
        );
    }

    #[tokio::test]
    async fn test_get_after_ttl_is_absent() {
        let (cache, clock) = cache_with_clock().await;
        cache
            .put(&key(), "https://img.example/42.jpg", Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));
        assert!(cache.get(&key()).await.unwrap().is_none());
        // Lazily evicted: nothing left to purge
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_refreshes_expiry() {
        let (cache, clock) = cache_with_clock().await;
        cache.put(&key(), "old", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        cache.put(&key(), "new", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&key()).await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (cache, clock) = cache_with_clock().await;
        let other = AssetKey::cover(ProviderId::new("kuwo"), "7", 300);
        cache.put(&key(), "a", Duration::from_secs(10)).await.unwrap();
        cache.put(&other, "b", Duration::from_secs(100)).await.unwrap();
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.get(&other).await.unwrap().as_deref(), Some("b"));
    }
}
