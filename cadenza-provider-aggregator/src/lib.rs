//! [`ProviderClient`] for the music aggregator HTTP API.
//!
//! Every operation is a `GET <endpoint>?types=<kind>&source=<provider>&...`
//! returning JSON. Failures of any kind (timeout, non-2xx, empty body, JSON
//! without the expected fields) are logged and reported as "no result".

pub mod wire;

use async_trait::async_trait;
use cadenza_core::{CoreError, ProviderClient, ProviderId, ProvidersConfig, StreamResult, Track};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use wire::{LyricResponse, PicResponse, SearchItem, UrlResponse};

const LOG_TARGET: &str = "cadenza::aggregator";

/// Default timeout for HTTP requests (8 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

const USER_AGENT: &str = concat!("Cadenza/", env!("CARGO_PKG_VERSION"));

/// Aggregator API client.
///
/// All providers share one endpoint unless overridden per provider.
pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: Url,
    endpoints: HashMap<ProviderId, Url>,
}

impl AggregatorClient {
    /// Create a client for `base_url` with a hard per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: parse_endpoint(base_url)?,
            endpoints: HashMap::new(),
        })
    }

    /// Create a client from the `[providers]` config section
    ///
    /// # Errors
    ///
    /// Returns an error if any configured URL is invalid or the HTTP client
    /// cannot be created.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, CoreError> {
        let mut client = Self::new(&config.base_url, config.timeout())?;
        for (provider, url) in &config.endpoints {
            client = client.with_endpoint(ProviderId::new(provider.as_str()), url)?;
        }
        Ok(client)
    }

    /// Route requests for `provider` to a dedicated endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_endpoint(mut self, provider: ProviderId, url: &str) -> Result<Self, CoreError> {
        self.endpoints.insert(provider, parse_endpoint(url)?);
        Ok(self)
    }

    fn endpoint(&self, provider: &ProviderId) -> &Url {
        self.endpoints.get(provider).unwrap_or(&self.base_url)
    }

    /// Issue one API call and decode the body, `None` on any failure
    async fn get_json<T: DeserializeOwned>(
        &self,
        kind: &str,
        provider: &ProviderId,
        params: &[(&str, String)],
    ) -> Option<T> {
        let mut url = self.endpoint(provider).clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("types", kind);
            query.append_pair("source", provider.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        debug!(target: LOG_TARGET, "GET {}", url);

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(target: LOG_TARGET, "{} {} request timed out", provider, kind);
                return None;
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "{} {} request failed: {}", provider, kind, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(target: LOG_TARGET, "{} {} returned status {}", provider, kind, status);
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(target: LOG_TARGET, "{} {} body unreadable: {}", provider, kind, e);
                return None;
            }
        };
        if body.trim().is_empty() {
            debug!(target: LOG_TARGET, "{} {} returned an empty body", provider, kind);
            return None;
        }

        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(target: LOG_TARGET, "{} {} returned unexpected JSON: {}", provider, kind, e);
                None
            }
        }
    }
}

fn parse_endpoint(url: &str) -> Result<Url, CoreError> {
    Url::parse(url).map_err(|e| CoreError::ConfigInvalid {
        message: format!("invalid provider endpoint {url:?}: {e}"),
    })
}

#[async_trait]
impl ProviderClient for AggregatorClient {
    async fn search(&self, keyword: &str, provider: &ProviderId, count: u32) -> Vec<Track> {
        let params = [("name", keyword.to_string()), ("count", count.to_string())];
        let Some(items) = self
            .get_json::<Vec<serde_json::Value>>("search", provider, &params)
            .await
        else {
            return Vec::new();
        };

        // Decode hits one by one so a single malformed entry does not sink the page
        let tracks: Vec<Track> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<SearchItem>(item).ok())
            .filter_map(|item| item.into_track(provider))
            .collect();
        info!(target: LOG_TARGET, "{} search returned {} tracks", provider, tracks.len());
        tracks
    }

    async fn resolve_stream(
        &self,
        track: &Track,
        provider: &ProviderId,
        bitrate_kbps: u32,
    ) -> Option<StreamResult> {
        let params = [("id", track.id.clone()), ("br", bitrate_kbps.to_string())];
        self.get_json::<UrlResponse>("url", provider, &params)
            .await?
            .into_stream(provider, bitrate_kbps)
    }

    async fn resolve_cover(&self, provider: &ProviderId, asset_id: &str, size: u32) -> Option<String> {
        let params = [("id", asset_id.to_string()), ("size", size.to_string())];
        self.get_json::<PicResponse>("pic", provider, &params)
            .await?
            .into_url()
    }

    async fn resolve_lyrics(&self, provider: &ProviderId, asset_id: &str) -> Option<String> {
        let params = [("id", asset_id.to_string())];
        self.get_json::<LyricResponse>("lyric", provider, &params)
            .await?
            .into_lyric()
    }
}
