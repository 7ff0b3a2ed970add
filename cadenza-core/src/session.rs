//! Player session: playlist, search budget, asset resolution and lyrics for
//! one user, with newer selections superseding older in-flight ones.

use crate::cache::{AssetCache, AssetKey};
use crate::config::CadenzaConfig;
use crate::db::Database;
use crate::error::{CoreError, Result};
use crate::lrc::{LyricCue, LyricTrack};
use crate::playlist::PlaylistStore;
use crate::provider::ProviderClient;
use crate::rate_limit::RateLimiter;
use crate::resolver::ResolutionEngine;
use crate::state::{StateStore, VOLUME_KEY};
use crate::time::Clock;
use crate::track::{ProviderId, StreamResult, Track};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "cadenza::session";

/// Shown when a track has no cover or the cover cannot be resolved
pub const PLACEHOLDER_COVER: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iNjAiIGhlaWdodD0iNjAiIHZpZXdCb3g9IjAgMCA2MCA2MCIgZmlsbD0ibm9uZSIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj4KPGNpcmNsZSBjeD0iMzAiIGN5PSIzMCIgcj0iMzAiIGZpbGw9IiMzMzMiLz4KPHRleHQgeD0iMzAiIHk9IjM1IiB0ZXh0LWFuY2hvcj0ibWlkZGxlIiBmaWxsPSIjOTk5IiBmb250LWZhbWlseT0iQXJpYWwiIGZvbnQtc2l6ZT0iMTIiPk5vIENvdmVyPC90ZXh0Pgo8L3N2Zz4K";

pub const DEFAULT_VOLUME: u8 = 80;
pub const MAX_VOLUME: u8 = 100;

/// Events emitted by the session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A stream is ready to play
    StreamResolved { track: Track, stream: StreamResult },
    /// No provider could serve the selected track
    StreamFailed { track: Track, message: String },
    /// Cover for the now-playing track (may be the placeholder)
    CoverResolved { url: String },
    /// Lyrics were loaded for the now-playing track
    LyricsLoaded { cues: usize },
    /// No lyrics found for the now-playing track
    LyricsNotFound,
    /// A search was refused by the rate limiter
    RateLimited { retry_after: Duration },
    /// Playlist contents or cursor changed
    PlaylistChanged { len: usize, current: usize },
    /// Volume changed
    VolumeChanged { volume: u8 },
    /// Playlist was cleared; nothing is playing
    PlaybackStopped,
}

/// Everything the shell needs to start playing a track
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub index: usize,
    pub track: Track,
    pub stream: StreamResult,
    pub cover: String,
    pub lyrics: LyricTrack,
}

/// Outcome of a selection
#[derive(Debug)]
pub enum Resolution {
    Ready(Box<NowPlaying>),
    /// A newer selection started while this one was resolving; nothing was applied
    Superseded,
    /// The playlist is empty or the index was out of range
    NoSelection,
}

/// Tunables the session reads from config
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub search_count: u32,
    pub cover_size: u32,
    /// Cover size for search hits
    pub thumbnail_size: u32,
    pub cover_ttl: Duration,
    pub rate_window: Duration,
    pub rate_budget: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&CadenzaConfig::default())
    }
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &CadenzaConfig) -> Self {
        Self {
            search_count: config.providers.search_count,
            cover_size: config.cache.cover_size,
            thumbnail_size: config.cache.thumbnail_size,
            cover_ttl: config.cache.cover_ttl(),
            rate_window: config.rate_limit.window(),
            rate_budget: config.rate_limit.budget,
        }
    }
}

/// Player session shared by the shell's tasks
pub struct Session {
    engine: ResolutionEngine,
    playlist: Mutex<PlaylistStore>,
    limiter: Mutex<RateLimiter>,
    lyrics: RwLock<LyricTrack>,
    cache: AssetCache,
    state: StateStore,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    generation: AtomicU64,
    volume: AtomicU8,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Restore a session from the state database
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read.
    pub async fn open(
        db: Database,
        engine: ResolutionEngine,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Result<Self> {
        let state = StateStore::new(db.clone());
        let playlist = PlaylistStore::load(state.clone()).await?;
        let limiter =
            RateLimiter::load(state.clone(), settings.rate_window, settings.rate_budget).await?;
        let volume = state
            .get::<u8>(VOLUME_KEY)
            .await?
            .unwrap_or(DEFAULT_VOLUME)
            .min(MAX_VOLUME);
        let (event_tx, _) = broadcast::channel(64);

        let cache = AssetCache::new(db, clock.clone());
        if let Err(e) = cache.purge_expired().await {
            warn!(target: LOG_TARGET, "Failed to purge expired cache entries: {}", e);
        }

        Ok(Self {
            engine,
            playlist: Mutex::new(playlist),
            limiter: Mutex::new(limiter),
            lyrics: RwLock::new(LyricTrack::default()),
            cache,
            state,
            clock,
            settings,
            generation: AtomicU64::new(0),
            volume: AtomicU8::new(volume),
            event_tx,
        })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub const fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Search `provider` for `keyword`, spending one unit of the search budget
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyQuery`] for a blank keyword and
    /// [`CoreError::RateLimited`] when the budget is spent. Neither issues a
    /// network call.
    pub async fn search(&self, keyword: &str, provider: &ProviderId) -> Result<Vec<Track>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CoreError::EmptyQuery);
        }

        let decision = self.limiter.lock().await.try_acquire(self.clock.now()).await?;
        if !decision.allowed {
            let retry_after = decision.retry_after.unwrap_or(self.settings.rate_window);
            self.emit(SessionEvent::RateLimited { retry_after });
            return Err(CoreError::RateLimited {
                retry_after_secs: retry_after.as_secs_f64(),
            });
        }

        info!(target: LOG_TARGET, "Searching {} for {:?}", provider, keyword);
        let results = self
            .engine
            .client()
            .search(keyword, provider, self.settings.search_count)
            .await;
        debug!(target: LOG_TARGET, "{} results from {}", results.len(), provider);
        Ok(results)
    }

    /// Queue `track` (or reselect it if already queued) and resolve it
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StreamUnavailable`] if no provider can serve the
    /// track, or a persistence error.
    pub async fn add_and_select(&self, track: Track) -> Result<Resolution> {
        let generation = {
            let mut playlist = self.playlist.lock().await;
            playlist.add_and_select(track).await?;
            self.begin_selection(&playlist).await
        };
        self.resolve_current(generation).await
    }

    /// Select the playlist entry at `index` and resolve it
    ///
    /// # Errors
    ///
    /// See [`Session::add_and_select`].
    pub async fn select_index(&self, index: usize) -> Result<Resolution> {
        let generation = {
            let mut playlist = self.playlist.lock().await;
            if playlist.select_index(index).await?.is_none() {
                return Ok(Resolution::NoSelection);
            }
            self.begin_selection(&playlist).await
        };
        self.resolve_current(generation).await
    }

    /// Advance to the next entry (wrapping) and resolve it
    ///
    /// # Errors
    ///
    /// See [`Session::add_and_select`].
    pub async fn next(&self) -> Result<Resolution> {
        let generation = {
            let mut playlist = self.playlist.lock().await;
            if playlist.select_next().await?.is_none() {
                return Ok(Resolution::NoSelection);
            }
            self.begin_selection(&playlist).await
        };
        self.resolve_current(generation).await
    }

    /// Step back to the previous entry (wrapping) and resolve it
    ///
    /// # Errors
    ///
    /// See [`Session::add_and_select`].
    pub async fn previous(&self) -> Result<Resolution> {
        let generation = {
            let mut playlist = self.playlist.lock().await;
            if playlist.select_previous().await?.is_none() {
                return Ok(Resolution::NoSelection);
            }
            self.begin_selection(&playlist).await
        };
        self.resolve_current(generation).await
    }

    /// Resolve the persisted selection, e.g. when resuming at startup
    ///
    /// # Errors
    ///
    /// See [`Session::add_and_select`].
    pub async fn play_current(&self) -> Result<Resolution> {
        let generation = {
            let playlist = self.playlist.lock().await;
            if playlist.current().is_none() {
                return Ok(Resolution::NoSelection);
            }
            self.begin_selection(&playlist).await
        };
        self.resolve_current(generation).await
    }

    /// Empty the playlist and stop playback. Pending resolutions are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty playlist cannot be persisted.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut playlist = self.playlist.lock().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            playlist.remove_all().await?;
            *self.lyrics.write().await = LyricTrack::default();
            self.emit(SessionEvent::PlaylistChanged { len: 0, current: 0 });
        }
        self.emit(SessionEvent::PlaybackStopped);
        Ok(())
    }

    /// Start a new selection: invalidates in-flight resolutions and drops
    /// the previous track's lyrics. Called with the playlist locked.
    async fn begin_selection(&self, playlist: &PlaylistStore) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.lyrics.write().await = LyricTrack::default();
        self.emit(SessionEvent::PlaylistChanged {
            len: playlist.len(),
            current: playlist.current_index(),
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn resolve_current(&self, generation: u64) -> Result<Resolution> {
        let selected = {
            let playlist = self.playlist.lock().await;
            playlist
                .current()
                .cloned()
                .map(|track| (playlist.current_index(), track))
        };
        let Some((index, mut track)) = selected else {
            return Ok(Resolution::NoSelection);
        };
        let original_source = track.source.clone();

        let stream = match self.engine.resolve_stream(&mut track).await {
            Ok(stream) => stream,
            Err(e) => {
                if !self.is_current(generation) {
                    return Ok(Resolution::Superseded);
                }
                self.emit(SessionEvent::StreamFailed {
                    track: track.clone(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        if !self.is_current(generation) {
            debug!(target: LOG_TARGET, "Discarding stream for {}: superseded", track);
            return Ok(Resolution::Superseded);
        }
        self.emit(SessionEvent::StreamResolved {
            track: track.clone(),
            stream: stream.clone(),
        });

        let cover = self.cover_for(&track, self.settings.cover_size).await;
        let lyrics = self.engine.resolve_lyrics(&track).await;

        {
            let mut playlist = self.playlist.lock().await;
            if !self.is_current(generation) {
                debug!(target: LOG_TARGET, "Discarding assets for {}: superseded", track);
                return Ok(Resolution::Superseded);
            }
            if track.source != original_source {
                playlist.reassign_source(index, track.source.clone()).await?;
            }
            *self.lyrics.write().await = lyrics.clone();
        }

        self.emit(SessionEvent::CoverResolved { url: cover.clone() });
        if lyrics.is_empty() {
            self.emit(SessionEvent::LyricsNotFound);
        } else {
            self.emit(SessionEvent::LyricsLoaded { cues: lyrics.len() });
        }

        Ok(Resolution::Ready(Box::new(NowPlaying {
            index,
            track,
            stream,
            cover,
            lyrics,
        })))
    }

    /// Cover URL for `track` at `size` pixels.
    ///
    /// Served from the asset cache when fresh; otherwise resolved and cached.
    /// Falls back to [`PLACEHOLDER_COVER`].
    pub async fn cover_for(&self, track: &Track, size: u32) -> String {
        let Some(asset_id) = track.cover_asset_id.as_deref() else {
            return PLACEHOLDER_COVER.to_string();
        };
        let key = AssetKey::cover(track.source.clone(), asset_id, size);

        match self.cache.get(&key).await {
            Ok(Some(url)) => return url,
            Ok(None) => {}
            Err(e) => warn!(target: LOG_TARGET, "Cover cache lookup failed for {}: {}", key, e),
        }

        let Some(url) = self.engine.resolve_cover(track, size).await else {
            return PLACEHOLDER_COVER.to_string();
        };
        if let Err(e) = self.cache.put(&key, &url, self.settings.cover_ttl).await {
            warn!(target: LOG_TARGET, "Failed to cache cover {}: {}", key, e);
        }
        url
    }

    /// Thumbnail cover for each track, in order. Resolved one at a time.
    pub async fn thumbnails(&self, tracks: &[Track]) -> Vec<String> {
        let mut covers = Vec::with_capacity(tracks.len());
        for track in tracks {
            covers.push(self.cover_for(track, self.settings.thumbnail_size).await);
        }
        covers
    }

    /// Active lyric cue at `position` in the now-playing track
    pub async fn cue_at(&self, position: Duration) -> Option<LyricCue> {
        self.lyrics.read().await.active_cue_at(position).cloned()
    }

    /// Lyrics of the now-playing track (empty when none are loaded)
    pub async fn lyrics(&self) -> LyricTrack {
        self.lyrics.read().await.clone()
    }

    pub async fn tracks(&self) -> Vec<Track> {
        self.playlist.lock().await.tracks().to_vec()
    }

    pub async fn current_index(&self) -> usize {
        self.playlist.lock().await.current_index()
    }

    pub async fn current(&self) -> Option<Track> {
        self.playlist.lock().await.current().cloned()
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    /// Set and persist the volume, clamped to `0..=100`. Returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume cannot be persisted.
    pub async fn set_volume(&self, volume: u8) -> Result<u8> {
        let volume = volume.min(MAX_VOLUME);
        self.state.put(VOLUME_KEY, &volume).await?;
        self.volume.store(volume, Ordering::SeqCst);
        self.emit(SessionEvent::VolumeChanged { volume });
        Ok(volume)
    }
}
