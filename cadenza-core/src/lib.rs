pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod lrc;
pub mod paths;
pub mod playlist;
pub mod provider;
pub mod rate_limit;
pub mod resolver;
pub mod session;
pub mod state;
pub mod time;
pub mod track;
pub mod validate;

pub use cache::{AssetCache, AssetKey};
pub use config::{
    CacheConfig, CadenzaConfig, LoggingConfig, ProvidersConfig, RateLimitConfig, ResolutionConfig,
};
pub use db::Database;
pub use error::{CoreError, Result};
pub use lrc::{LyricCue, LyricMetadata, LyricTrack};
pub use paths::{
    config_dir, config_path, log_file_path, state_db_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LOG_FILE_NAME, STATE_DB_FILE_NAME,
};
pub use playlist::PlaylistStore;
pub use provider::ProviderClient;
pub use rate_limit::{RateDecision, RateLimiter, SlidingWindow};
pub use resolver::{LadderOrder, ResolutionEngine, DEFAULT_BITRATE_LADDER};
pub use session::{
    NowPlaying, Resolution, Session, SessionEvent, SessionSettings, PLACEHOLDER_COVER,
};
pub use state::StateStore;
pub use time::{Clock, DurationExt, ManualClock, SystemClock};
pub use track::{ProviderId, StreamResult, Track};
pub use validate::StreamValidator;
