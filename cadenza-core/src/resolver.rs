//! Resolution engine that walks providers and bitrates until a stream plays.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CadenzaConfig;
use crate::error::{CoreError, Result};
use crate::lrc::LyricTrack;
use crate::provider::ProviderClient;
use crate::track::{ProviderId, StreamResult, Track};
use crate::validate::StreamValidator;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "cadenza::resolver";

/// Default bitrate ladder in kbps. 999 asks aggregator providers for lossless.
pub const DEFAULT_BITRATE_LADDER: &[u32] = &[999, 320, 128];

/// Nesting of the provider and bitrate loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderOrder {
    /// Exhaust every bitrate on a provider before moving to the next one.
    /// A low-quality hit on the track's own provider beats a high-quality
    /// hit elsewhere.
    #[default]
    ProviderPrecedence,
    /// Try every provider at a bitrate before stepping down in quality.
    QualityFirst,
}

/// Resolves streams, covers and lyrics for tracks.
///
/// Calls are issued one at a time in precedence order; there is never more
/// than one request in flight per resolution.
pub struct ResolutionEngine {
    client: Arc<dyn ProviderClient>,
    providers: Vec<ProviderId>,
    ladder: Vec<u32>,
    order: LadderOrder,
    validator: StreamValidator,
}

impl ResolutionEngine {
    /// Create an engine over `providers` in precedence order
    pub fn new(client: Arc<dyn ProviderClient>, providers: Vec<ProviderId>) -> Self {
        Self {
            client,
            providers,
            ladder: DEFAULT_BITRATE_LADDER.to_vec(),
            order: LadderOrder::default(),
            validator: StreamValidator::default(),
        }
    }

    /// Engine configured from `[providers]` and `[resolution]`
    pub fn from_config(client: Arc<dyn ProviderClient>, config: &CadenzaConfig) -> Self {
        Self::new(client, config.providers.provider_ids())
            .with_ladder(config.resolution.bitrate_ladder.clone())
            .with_order(config.resolution.order)
            .with_validator(config.resolution.validator())
    }

    /// Set the bitrate ladder. Levels are tried highest first regardless of input order.
    #[must_use]
    pub fn with_ladder(mut self, mut ladder: Vec<u32>) -> Self {
        ladder.sort_unstable_by(|a, b| b.cmp(a));
        ladder.dedup();
        self.ladder = ladder;
        self
    }

    #[must_use]
    pub const fn with_order(mut self, order: LadderOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: StreamValidator) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.client
    }

    /// Provider order for a track: its current provider first, then the rest
    /// of the configured providers, each at most once.
    fn provider_order(&self, track: &Track) -> Vec<ProviderId> {
        let mut order = vec![track.source.clone()];
        for provider in &self.providers {
            if !order.contains(provider) {
                order.push(provider.clone());
            }
        }
        order
    }

    /// Every (provider, bitrate) attempt for a track, in the order they are tried
    fn attempts(&self, track: &Track) -> Vec<(ProviderId, u32)> {
        let providers = self.provider_order(track);
        match self.order {
            LadderOrder::ProviderPrecedence => providers
                .iter()
                .flat_map(|p| self.ladder.iter().map(move |&br| (p.clone(), br)))
                .collect(),
            LadderOrder::QualityFirst => self
                .ladder
                .iter()
                .flat_map(|&br| providers.iter().map(move |p| (p.clone(), br)))
                .collect(),
        }
    }

    /// Resolve a playable stream for `track`.
    ///
    /// On success `track.source` is rewritten to the provider that served the
    /// stream so later resolutions start there.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StreamUnavailable`] once every provider and
    /// bitrate combination has been tried.
    pub async fn resolve_stream(&self, track: &mut Track) -> Result<StreamResult> {
        let attempts = self.attempts(track);
        info!(
            target: LOG_TARGET,
            "Resolving stream for {} (source: {}, {} attempts)",
            track,
            track.source,
            attempts.len()
        );

        for (provider, bitrate) in attempts {
            match self.try_stream(track, &provider, bitrate).await {
                Ok(stream) => {
                    if track.source != provider {
                        info!(
                            target: LOG_TARGET,
                            "Switching {} from {} to {}",
                            track.name, track.source, provider
                        );
                        track.source = provider;
                    }
                    info!(
                        target: LOG_TARGET,
                        "Resolved {} at {}kbps from {}",
                        track.name, stream.bitrate_kbps, stream.source
                    );
                    return Ok(stream);
                }
                Err(e) => debug!(target: LOG_TARGET, "{}", e),
            }
        }

        warn!(target: LOG_TARGET, "No playable stream for {}", track);
        Err(CoreError::StreamUnavailable {
            track: track.to_string(),
        })
    }

    /// One rung of the ladder. Failures are `ProviderUnavailable` and only
    /// ever drive the loop forward.
    async fn try_stream(
        &self,
        track: &Track,
        provider: &ProviderId,
        bitrate: u32,
    ) -> Result<StreamResult> {
        let unavailable = |reason: String| CoreError::ProviderUnavailable {
            provider: provider.to_string(),
            reason,
        };

        let Some(mut stream) = self.client.resolve_stream(track, provider, bitrate).await else {
            return Err(unavailable(format!("no stream at {bitrate}kbps")));
        };

        if let Some(reason) = self.validator.rejection(&stream.url) {
            return Err(unavailable(format!(
                "rejected {bitrate}kbps url ({reason}): {}",
                stream.url
            )));
        }

        // The stream is attributed to the provider that was asked.
        stream.source = provider.clone();
        Ok(stream)
    }

    /// Cover URL from the track's current provider, `None` if unavailable
    pub async fn resolve_cover(&self, track: &Track, size: u32) -> Option<String> {
        let asset_id = track.cover_asset_id.as_deref()?;
        let url = self
            .client
            .resolve_cover(&track.source, asset_id, size)
            .await
            .filter(|url| !url.trim().is_empty());
        if url.is_none() {
            debug!(
                target: LOG_TARGET,
                "{}",
                CoreError::AssetUnavailable {
                    provider: track.source.to_string(),
                    asset_id: asset_id.to_string(),
                }
            );
        }
        url
    }

    /// Lyrics from the track's current provider. Missing or unparseable
    /// lyrics give an empty track.
    pub async fn resolve_lyrics(&self, track: &Track) -> LyricTrack {
        let asset_id = track.lyric_id();
        match self.client.resolve_lyrics(&track.source, asset_id).await {
            Some(raw) => {
                let lyrics = LyricTrack::parse(&raw);
                info!(
                    target: LOG_TARGET,
                    "Loaded {} lyric cues for {}",
                    lyrics.len(),
                    track.name
                );
                lyrics
            }
            None => {
                debug!(
                    target: LOG_TARGET,
                    "{}",
                    CoreError::AssetUnavailable {
                        provider: track.source.to_string(),
                        asset_id: asset_id.to_string(),
                    }
                );
                LyricTrack::default()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted provider client recording every call it receives.
    #[derive(Default)]
    pub struct MockClient {
        streams: HashMap<(String, u32), String>,
        covers: HashMap<(String, String), String>,
        lyrics: HashMap<(String, String), String>,
        search_results: Vec<Track>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockClient {
        pub fn with_stream(mut self, provider: &str, bitrate: u32, url: &str) -> Self {
            self.streams.insert((provider.to_string(), bitrate), url.to_string());
            self
        }

        pub fn with_cover(mut self, provider: &str, asset: &str, url: &str) -> Self {
            self.covers.insert((provider.to_string(), asset.to_string()), url.to_string());
            self
        }

        pub fn with_lyrics(mut self, provider: &str, asset: &str, text: &str) -> Self {
            self.lyrics.insert((provider.to_string(), asset.to_string()), text.to_string());
            self
        }

        pub fn with_search_results(mut self, tracks: Vec<Track>) -> Self {
            self.search_results = tracks;
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl ProviderClient for MockClient {
        async fn search(&self, keyword: &str, provider: &ProviderId, _count: u32) -> Vec<Track> {
            self.record(format!("search:{provider}:{keyword}"));
            self.search_results.clone()
        }

        async fn resolve_stream(
            &self,
            _track: &Track,
            provider: &ProviderId,
            bitrate_kbps: u32,
        ) -> Option<StreamResult> {
            self.record(format!("stream:{provider}:{bitrate_kbps}"));
            self.streams
                .get(&(provider.to_string(), bitrate_kbps))
                .map(|url| StreamResult {
                    url: url.clone(),
                    bitrate_kbps,
                    source: provider.clone(),
                })
        }

        async fn resolve_cover(
            &self,
            provider: &ProviderId,
            asset_id: &str,
            size: u32,
        ) -> Option<String> {
            self.record(format!("cover:{provider}:{asset_id}:{size}"));
            self.covers
                .get(&(provider.to_string(), asset_id.to_string()))
                .cloned()
        }

        async fn resolve_lyrics(&self, provider: &ProviderId, asset_id: &str) -> Option<String> {
            self.record(format!("lyrics:{provider}:{asset_id}"));
            self.lyrics
                .get(&(provider.to_string(), asset_id.to_string()))
                .cloned()
        }
    }

    pub fn providers() -> Vec<ProviderId> {
        ["p1", "p2", "p3"].into_iter().map(ProviderId::new).collect()
    }

    pub fn track_on(source: &str) -> Track {
        Track::new(source, "42", "Song", vec!["Artist".to_string()], "Album")
    }

    fn engine(client: MockClient) -> (ResolutionEngine, Arc<MockClient>) {
        let client = Arc::new(client);
        let engine = ResolutionEngine::new(client.clone(), providers()).with_ladder(vec![320, 128]);
        (engine, client)
    }

    #[tokio::test]
    async fn test_fallback_provider_serves_low_bitrate() {
        let (engine, _) = engine(MockClient::default().with_stream("p2", 128, "https://p2.example/42.mp3"));
        let mut track = track_on("p1");

        let stream = engine.resolve_stream(&mut track).await.unwrap();
        assert_eq!(stream.source, ProviderId::new("p2"));
        assert_eq!(stream.bitrate_kbps, 128);
        assert_eq!(track.source, ProviderId::new("p2"));
    }

    #[tokio::test]
    async fn test_own_provider_low_quality_beats_other_provider_high_quality() {
        let (engine, client) = engine(
            MockClient::default()
                .with_stream("p1", 128, "https://p1.example/42.mp3")
                .with_stream("p2", 320, "https://p2.example/42.mp3"),
        );
        let mut track = track_on("p1");

        let stream = engine.resolve_stream(&mut track).await.unwrap();
        assert_eq!(stream.source, ProviderId::new("p1"));
        assert_eq!(stream.bitrate_kbps, 128);
        assert_eq!(track.source, ProviderId::new("p1"));
        assert_eq!(client.calls(), ["stream:p1:320", "stream:p1:128"]);
    }

    #[tokio::test]
    async fn test_quality_first_order_prefers_bitrate() {
        let client = Arc::new(
            MockClient::default()
                .with_stream("p1", 128, "https://p1.example/42.mp3")
                .with_stream("p2", 320, "https://p2.example/42.mp3"),
        );
        let engine = ResolutionEngine::new(client.clone(), providers())
            .with_ladder(vec![128, 320])
            .with_order(LadderOrder::QualityFirst);
        let mut track = track_on("p1");

        let stream = engine.resolve_stream(&mut track).await.unwrap();
        assert_eq!(stream.source, ProviderId::new("p2"));
        assert_eq!(stream.bitrate_kbps, 320);
        assert_eq!(client.calls(), ["stream:p1:320", "stream:p2:320"]);
    }

    #[tokio::test]
    async fn test_invalid_urls_are_skipped() {
        let (engine, _) = engine(
            MockClient::default()
                .with_stream("p1", 320, "https://www.douyin.com/redirect/42.mp3")
                .with_stream("p1", 128, "https://p1.example/landing.html")
                .with_stream("p3", 320, "https://p3.example/42.flac"),
        );
        let mut track = track_on("p1");

        let stream = engine.resolve_stream(&mut track).await.unwrap();
        assert_eq!(stream.source, ProviderId::new("p3"));
        assert_eq!(stream.url, "https://p3.example/42.flac");
        assert_eq!(track.source, ProviderId::new("p3"));
    }

    #[tokio::test]
    async fn test_exhausted_ladder_is_stream_unavailable() {
        let (engine, client) = engine(MockClient::default());
        let mut track = track_on("p2");

        let err = engine.resolve_stream(&mut track).await.unwrap_err();
        assert!(matches!(err, CoreError::StreamUnavailable { .. }));
        assert_eq!(track.source, ProviderId::new("p2"));
        // Current provider first, no provider asked twice at one bitrate
        assert_eq!(
            client.calls(),
            [
                "stream:p2:320",
                "stream:p2:128",
                "stream:p1:320",
                "stream:p1:128",
                "stream:p3:320",
                "stream:p3:128",
            ]
        );
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_tried_first() {
        let (engine, client) = engine(MockClient::default());
        let mut track = track_on("legacy");
        let _ = engine.resolve_stream(&mut track).await;
        assert_eq!(client.calls()[0], "stream:legacy:320");
        assert_eq!(client.calls().len(), 8);
    }

    #[test]
    fn test_ladder_sorted_descending() {
        let engine = ResolutionEngine::new(Arc::new(MockClient::default()), providers())
            .with_ladder(vec![128, 999, 320, 128]);
        assert_eq!(engine.ladder, vec![999, 320, 128]);
    }

    #[tokio::test]
    async fn test_cover_uses_current_provider_only() {
        let (engine, client) = engine(MockClient::default().with_cover("p2", "pic1", "https://img/1.jpg"));
        let on_p1 = track_on("p1").with_cover("pic1");
        assert!(engine.resolve_cover(&on_p1, 300).await.is_none());

        let on_p2 = track_on("p2").with_cover("pic1");
        assert_eq!(
            engine.resolve_cover(&on_p2, 300).await.as_deref(),
            Some("https://img/1.jpg")
        );
        assert_eq!(client.calls(), ["cover:p1:pic1:300", "cover:p2:pic1:300"]);
    }

    #[tokio::test]
    async fn test_cover_without_asset_id_makes_no_call() {
        let (engine, client) = engine(MockClient::default());
        assert!(engine.resolve_cover(&track_on("p1"), 300).await.is_none());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lyrics_parsed_or_empty() {
        let (engine, _) = engine(MockClient::default().with_lyrics("p1", "L1", "[00:01.00]Hi"));
        let with_id = track_on("p1").with_lyrics("L1");
        assert_eq!(engine.resolve_lyrics(&with_id).await.len(), 1);

        // Falls back to the track id, which has no lyrics
        assert!(engine.resolve_lyrics(&track_on("p1")).await.is_empty());
    }
}
