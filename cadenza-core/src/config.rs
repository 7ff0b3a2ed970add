use crate::error::{CoreError, Result};
use crate::resolver::{LadderOrder, DEFAULT_BITRATE_LADDER};
use crate::track::ProviderId;
use crate::validate::{StreamValidator, DEFAULT_AUDIO_EXTENSIONS, DEFAULT_DENY_PATTERNS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenzaConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider precedence: earlier providers are tried first during fallback
    #[serde(default = "default_provider_order")]
    pub order: Vec<String>,
    /// Aggregator endpoint shared by every provider
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-provider endpoint overrides (provider name -> URL)
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_count")]
    pub search_count: u32,
}

fn default_provider_order() -> Vec<String> {
    vec!["netease".into(), "kuwo".into(), "tencent".into()]
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api.php".into()
}

const fn default_timeout_secs() -> u64 {
    8
}

const fn default_search_count() -> u32 {
    20
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            base_url: default_base_url(),
            endpoints: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            search_count: default_search_count(),
        }
    }
}

impl ProvidersConfig {
    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.order.iter().map(|p| ProviderId::new(p.as_str())).collect()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Bitrates (kbps) to try, highest first
    #[serde(default = "default_bitrate_ladder")]
    pub bitrate_ladder: Vec<u32>,
    #[serde(default)]
    pub order: LadderOrder,
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,
    #[serde(default = "default_deny_patterns")]
    pub deny_patterns: Vec<String>,
}

fn default_bitrate_ladder() -> Vec<u32> {
    DEFAULT_BITRATE_LADDER.to_vec()
}

fn default_audio_extensions() -> Vec<String> {
    DEFAULT_AUDIO_EXTENSIONS.iter().map(ToString::to_string).collect()
}

fn default_deny_patterns() -> Vec<String> {
    DEFAULT_DENY_PATTERNS.iter().map(ToString::to_string).collect()
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            bitrate_ladder: default_bitrate_ladder(),
            order: LadderOrder::default(),
            audio_extensions: default_audio_extensions(),
            deny_patterns: default_deny_patterns(),
        }
    }
}

impl ResolutionConfig {
    #[must_use]
    pub fn validator(&self) -> StreamValidator {
        StreamValidator::new(&self.audio_extensions, &self.deny_patterns)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_budget")]
    pub budget: usize,
}

const fn default_window_secs() -> u64 {
    300
}

const fn default_budget() -> usize {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            budget: default_budget(),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cover_ttl_secs")]
    pub cover_ttl_secs: u64,
    /// Cover size for the now-playing view
    #[serde(default = "default_cover_size")]
    pub cover_size: u32,
    /// Cover size for search result lists
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

const fn default_cover_ttl_secs() -> u64 {
    86_400
}

const fn default_cover_size() -> u32 {
    500
}

const fn default_thumbnail_size() -> u32 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cover_ttl_secs: default_cover_ttl_secs(),
            cover_size: default_cover_size(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn cover_ttl(&self) -> Duration {
        Duration::from_secs(self.cover_ttl_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/cadenza/cadenza.log
    #[serde(default)]
    pub file: bool,
}

impl CadenzaConfig {
    /// Get the configuration directory path (~/.config/cadenza/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/cadenza/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from `path`, or write the template there on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template when the
    /// file is missing, otherwise any read, parse or validation error.
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(CoreError::ConfigInvalid {
                message: message.to_string(),
            })
        };

        if self.providers.order.is_empty() {
            return invalid("providers.order must name at least one provider");
        }
        if self.providers.order.iter().any(|p| p.trim().is_empty()) {
            return invalid("providers.order contains an empty name");
        }
        if self.providers.timeout_secs == 0 {
            return invalid("providers.timeout_secs must be positive");
        }
        if self.resolution.bitrate_ladder.is_empty() {
            return invalid("resolution.bitrate_ladder must not be empty");
        }
        if self.resolution.audio_extensions.is_empty() {
            return invalid("resolution.audio_extensions must not be empty");
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.budget == 0 {
            return invalid("rate_limit.window_secs and rate_limit.budget must be positive");
        }
        Ok(())
    }
}

const CONFIG_TEMPLATE: &str = r#"# Cadenza Configuration
# ~/.config/cadenza/config.toml

[providers]
# Provider precedence: earlier providers are tried first when a stream
# cannot be resolved from the provider a track came from
order = ["netease", "kuwo", "tencent"]
# Aggregator endpoint answering ?types=search|url|pic|lyric&source=<provider>
base_url = "http://127.0.0.1:8080/api.php"
timeout_secs = 8
search_count = 20

# Optional per-provider endpoint overrides
# [providers.endpoints]
# kuwo = "https://example.com/api.php"

[resolution]
# Bitrates in kbps, highest first (999 = lossless)
bitrate_ladder = [999, 320, 128]
# "provider_precedence": exhaust every bitrate on a provider before moving on
# "quality_first": try every provider at a bitrate before dropping quality
order = "provider_precedence"
audio_extensions = ["mp3", "flac", "m4a", "aac", "ogg", "opus", "wav", "ape"]
deny_patterns = ["douyinvod.com", "douyin.com", "kuaishou", "ixigua.com"]

[rate_limit]
# At most `budget` searches in any trailing `window_secs`
window_secs = 300
budget = 60

[cache]
cover_ttl_secs = 86400
cover_size = 500
thumbnail_size = 300

[logging]
# Also write logs to ~/.config/cadenza/cadenza.log
file = false
"#;
