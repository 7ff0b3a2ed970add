use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please review it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Resolution errors
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("No playable stream for {track} on any provider")]
    StreamUnavailable { track: String },

    #[error("Too many searches, retry after {retry_after_secs:.0}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Asset {asset_id} unavailable from {provider}")]
    AssetUnavailable { provider: String, asset_id: String },

    #[error("Search keyword is empty")]
    EmptyQuery,

    // Persistence errors
    #[error("Cache database error: {0}")]
    Cache(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode persisted state: {0}")]
    Json(#[from] serde_json::Error),

    // Network errors
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error is meant to be shown to the user rather than logged.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::StreamUnavailable { .. } | Self::RateLimited { .. } | Self::EmptyQuery
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
