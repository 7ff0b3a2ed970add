//! Response shapes of the aggregator API.
//!
//! Providers behind the aggregator disagree on field types: ids come back as
//! numbers or strings, artists as a list or a single `/`-joined string, and
//! bitrates as numbers, numeric strings, or bits per second. Each loose field
//! is an untagged enum with an adapter to the canonical type.

use cadenza_core::{ProviderId, StreamResult, Track};
use serde::Deserialize;

/// Id that may be encoded as a JSON number or string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(serde_json::Number),
    Text(String),
}

impl LooseId {
    /// Canonical string form, `None` when blank
    #[must_use]
    pub fn normalize(&self) -> Option<String> {
        let text = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Artist credit as a list or a single joined string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseArtists {
    List(Vec<String>),
    Joined(String),
}

impl LooseArtists {
    #[must_use]
    pub fn normalize(self) -> Vec<String> {
        let names = match self {
            Self::List(names) => names,
            Self::Joined(joined) => joined.split('/').map(str::to_string).collect(),
        };
        names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Bitrate as a number or numeric string, in kbps or bps
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseBitrate {
    Number(serde_json::Number),
    Text(String),
}

/// Values above this are taken to be bits per second
const BPS_THRESHOLD: f64 = 10_000.0;

impl LooseBitrate {
    /// Bitrate in kbps, `None` when missing, zero or unparseable
    #[must_use]
    pub fn kbps(&self) -> Option<u32> {
        let raw = match self {
            Self::Number(n) => n.as_f64()?,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        if !raw.is_finite() || raw <= 0.0 {
            return None;
        }
        let kbps = if raw > BPS_THRESHOLD { raw / 1000.0 } else { raw };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let kbps = kbps.round().min(f64::from(u32::MAX)) as u32;
        (kbps > 0).then_some(kbps)
    }
}

/// One search hit (`types=search`)
#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub id: Option<LooseId>,
    pub name: Option<String>,
    pub artist: Option<LooseArtists>,
    pub album: Option<String>,
    pub pic_id: Option<LooseId>,
    pub lyric_id: Option<LooseId>,
    pub source: Option<String>,
}

impl SearchItem {
    /// Convert to a track. Hits without an id or name are dropped.
    #[must_use]
    pub fn into_track(self, requested: &ProviderId) -> Option<Track> {
        let id = self.id.as_ref().and_then(LooseId::normalize)?;
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let source = self
            .source
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map_or_else(|| requested.clone(), ProviderId::new);
        let artists = self.artist.map(LooseArtists::normalize).unwrap_or_default();

        let mut track = Track::new(source, id, name, artists, self.album.unwrap_or_default());
        track.cover_asset_id = self.pic_id.as_ref().and_then(LooseId::normalize);
        track.lyric_asset_id = self.lyric_id.as_ref().and_then(LooseId::normalize);
        Some(track)
    }
}

/// Stream answer (`types=url`)
#[derive(Debug, Deserialize)]
pub struct UrlResponse {
    pub url: Option<String>,
    pub br: Option<LooseBitrate>,
}

impl UrlResponse {
    /// Stream for `provider`. A missing bitrate is reported as the one requested.
    #[must_use]
    pub fn into_stream(self, provider: &ProviderId, requested_kbps: u32) -> Option<StreamResult> {
        let url = non_blank(self.url)?;
        let bitrate_kbps = self
            .br
            .as_ref()
            .and_then(LooseBitrate::kbps)
            .unwrap_or(requested_kbps);
        Some(StreamResult {
            url,
            bitrate_kbps,
            source: provider.clone(),
        })
    }
}

/// Cover answer (`types=pic`)
#[derive(Debug, Deserialize)]
pub struct PicResponse {
    pub url: Option<String>,
}

impl PicResponse {
    #[must_use]
    pub fn into_url(self) -> Option<String> {
        non_blank(self.url)
    }
}

/// Lyric answer (`types=lyric`). The translated `tlyric` field is not used.
#[derive(Debug, Deserialize)]
pub struct LyricResponse {
    pub lyric: Option<String>,
}

impl LyricResponse {
    #[must_use]
    pub fn into_lyric(self) -> Option<String> {
        self.lyric.filter(|l| !l.trim().is_empty())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
