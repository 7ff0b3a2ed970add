use crate::track::{ProviderId, StreamResult, Track};
use async_trait::async_trait;

/// Adapter from upstream provider wire formats to the canonical types.
///
/// Implementations absorb every upstream failure: an empty body, a non-2xx
/// status, JSON without the expected fields, an empty result and a timeout
/// all come back as an empty `Vec` or `None`. Every call must be bounded by
/// a timeout so the caller never hangs.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Search `provider` by free-text keyword
    async fn search(&self, keyword: &str, provider: &ProviderId, count: u32) -> Vec<Track>;

    /// Ask `provider` for a stream of `track` at the given bitrate
    async fn resolve_stream(
        &self,
        track: &Track,
        provider: &ProviderId,
        bitrate_kbps: u32,
    ) -> Option<StreamResult>;

    /// Ask `provider` for a cover image URL of the given pixel size
    async fn resolve_cover(&self, provider: &ProviderId, asset_id: &str, size: u32)
        -> Option<String>;

    /// Ask `provider` for raw LRC text
    async fn resolve_lyrics(&self, provider: &ProviderId, asset_id: &str) -> Option<String>;
}
