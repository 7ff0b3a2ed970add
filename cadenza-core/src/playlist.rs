//! Ordered, deduplicated playlist with a persisted cursor.

use crate::error::Result;
use crate::state::{StateStore, CURRENT_INDEX_KEY, PLAYLIST_KEY};
use crate::track::{ProviderId, Track};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "cadenza::playlist";

/// Playlist of unique tracks (by source + id) and the selected position.
///
/// Every mutation is written through to the state store before returning.
pub struct PlaylistStore {
    tracks: Vec<Track>,
    current: usize,
    store: StateStore,
}

impl PlaylistStore {
    /// Load the persisted playlist
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub async fn load(store: StateStore) -> Result<Self> {
        let loaded: Vec<Track> = store.get(PLAYLIST_KEY).await?.unwrap_or_default();

        // Older saves may contain duplicates; keep the first of each identity.
        let mut tracks: Vec<Track> = Vec::with_capacity(loaded.len());
        for track in loaded {
            if !tracks.iter().any(|t| t.same_identity(&track)) {
                tracks.push(track);
            }
        }

        let current = store.get(CURRENT_INDEX_KEY).await?.unwrap_or(0);
        let mut playlist = Self {
            tracks,
            current,
            store,
        };
        playlist.clamp_cursor();
        info!(
            target: LOG_TARGET,
            "Restored playlist with {} tracks (current: {})",
            playlist.tracks.len(),
            playlist.current
        );
        Ok(playlist)
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Selected index. Always 0 for an empty playlist.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current)
    }

    /// Select `track`, appending it unless an identity-equal track is already present.
    /// Returns the selected index.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist cannot be persisted.
    pub async fn add_and_select(&mut self, track: Track) -> Result<usize> {
        if let Some(existing) = self.tracks.iter().position(|t| t.same_identity(&track)) {
            debug!(target: LOG_TARGET, "{} already queued at {}", track, existing);
            self.current = existing;
        } else {
            debug!(target: LOG_TARGET, "Queueing {}", track);
            self.tracks.push(track);
            self.current = self.tracks.len() - 1;
        }
        self.persist().await?;
        Ok(self.current)
    }

    /// Select the entry at `index`. Out-of-range indices leave the cursor alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be persisted.
    pub async fn select_index(&mut self, index: usize) -> Result<Option<&Track>> {
        if index >= self.tracks.len() {
            warn!(
                target: LOG_TARGET,
                "Ignoring selection of index {} in playlist of {}",
                index,
                self.tracks.len()
            );
            return Ok(None);
        }
        self.current = index;
        self.persist_cursor().await?;
        Ok(self.current())
    }

    /// Advance to the next entry, wrapping to the start
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be persisted.
    pub async fn select_next(&mut self) -> Result<Option<&Track>> {
        if self.tracks.is_empty() {
            return Ok(None);
        }
        self.current = (self.current + 1) % self.tracks.len();
        self.persist_cursor().await?;
        Ok(self.current())
    }

    /// Step back to the previous entry, wrapping to the end
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor cannot be persisted.
    pub async fn select_previous(&mut self) -> Result<Option<&Track>> {
        if self.tracks.is_empty() {
            return Ok(None);
        }
        let len = self.tracks.len();
        self.current = (self.current + len - 1) % len;
        self.persist_cursor().await?;
        Ok(self.current())
    }

    /// Empty the playlist and reset the cursor
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist cannot be persisted.
    pub async fn remove_all(&mut self) -> Result<()> {
        info!(target: LOG_TARGET, "Clearing playlist of {} tracks", self.tracks.len());
        self.tracks.clear();
        self.current = 0;
        self.persist().await
    }

    /// Record that the entry at `index` is now served by `provider`.
    ///
    /// Skipped (returns `false`) when the index is out of range or the
    /// rewrite would duplicate another entry's identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist cannot be persisted.
    pub async fn reassign_source(&mut self, index: usize, provider: ProviderId) -> Result<bool> {
        let Some(track) = self.tracks.get(index) else {
            return Ok(false);
        };
        if track.source == provider {
            return Ok(true);
        }
        let id = track.id.clone();
        let collides = self
            .tracks
            .iter()
            .enumerate()
            .any(|(i, t)| i != index && t.source == provider && t.id == id);
        if collides {
            warn!(
                target: LOG_TARGET,
                "Not moving track {} to {}: already queued from there", id, provider
            );
            return Ok(false);
        }

        self.tracks[index].source = provider;
        self.persist().await?;
        Ok(true)
    }

    fn clamp_cursor(&mut self) {
        if self.current >= self.tracks.len() {
            self.current = 0;
        }
    }

    async fn persist(&mut self) -> Result<()> {
        self.clamp_cursor();
        self.store.put(PLAYLIST_KEY, &self.tracks).await?;
        self.persist_cursor().await
    }

    async fn persist_cursor(&self) -> Result<()> {
        self.store.put(CURRENT_INDEX_KEY, &self.current).await
    }
}
