//! Canonical track, provider and stream types shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an upstream provider (e.g. `netease`, `kuwo`, `tencent`).
///
/// The set of providers is configured, and the configured order defines
/// precedence during fallback. The identifier is persisted with every
/// playlist entry, so it must stay stable once established.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A track as returned by search and stored in the playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Provider-specific track id
    pub id: String,
    /// Provider currently serving this track
    pub source: ProviderId,
    /// Track name
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
    /// Album name
    #[serde(default)]
    pub album: String,
    /// Provider-specific cover id, if the provider exposed one
    #[serde(default)]
    pub cover_asset_id: Option<String>,
    /// Provider-specific lyric id, if different from the track id
    #[serde(default)]
    pub lyric_asset_id: Option<String>,
}

impl Track {
    pub fn new(
        source: impl Into<ProviderId>,
        id: impl Into<String>,
        name: impl Into<String>,
        artists: Vec<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            name: name.into(),
            artists,
            album: album.into(),
            cover_asset_id: None,
            lyric_asset_id: None,
        }
    }

    #[must_use]
    pub fn with_cover(mut self, asset_id: impl Into<String>) -> Self {
        self.cover_asset_id = Some(asset_id.into());
        self
    }

    #[must_use]
    pub fn with_lyrics(mut self, asset_id: impl Into<String>) -> Self {
        self.lyric_asset_id = Some(asset_id.into());
        self
    }

    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.source == other.source && self.id == other.id
    }

    /// Artists joined for display, e.g. `"A / B"`.
    #[must_use]
    pub fn artist_line(&self) -> String {
        self.artists.join(" / ")
    }

    /// Asset id used for lyric lookup. Falls back to the track id.
    #[must_use]
    pub fn lyric_id(&self) -> &str {
        self.lyric_asset_id.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artists.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.name, self.artist_line())
        }
    }
}

/// A playable stream resolved for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    pub url: String,
    pub bitrate_kbps: u32,
    pub source: ProviderId,
}
