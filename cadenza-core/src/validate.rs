//! Audio URL validation.
//!
//! Some providers answer a stream request with HTTP 200 and a URL that is not
//! audio at all (short-video redirect hosts, HTML landing pages). A stream is
//! only accepted when its URL looks like a direct link to an audio file.

use url::Url;

/// Audio containers accepted by default
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "flac", "m4a", "aac", "ogg", "opus", "wav", "ape"];

/// Hosts known to hand out non-audio redirects
pub const DEFAULT_DENY_PATTERNS: &[&str] = &["douyinvod.com", "douyin.com", "kuaishou", "ixigua.com"];

#[derive(Debug, Clone)]
pub struct StreamValidator {
    extensions: Vec<String>,
    deny_patterns: Vec<String>,
}

impl Default for StreamValidator {
    fn default() -> Self {
        Self::new(
            DEFAULT_AUDIO_EXTENSIONS.iter().copied(),
            DEFAULT_DENY_PATTERNS.iter().copied(),
        )
    }
}

impl StreamValidator {
    pub fn new<E, D>(extensions: E, deny_patterns: D) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            deny_patterns: deny_patterns
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `url` is an http(s) link to a recognized audio file on an allowed host
    #[must_use]
    pub fn accepts(&self, url: &str) -> bool {
        self.rejection(url).is_none()
    }

    /// Why `url` would be rejected, if it would be
    #[must_use]
    pub fn rejection(&self, url: &str) -> Option<&'static str> {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return Some("not a valid URL");
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return Some("not an http(s) URL");
        }

        let lowered = url.to_ascii_lowercase();
        if self.deny_patterns.iter().any(|p| lowered.contains(p.as_str())) {
            return Some("deny-listed host");
        }

        let path = parsed.path().to_ascii_lowercase();
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext);
        match extension {
            Some(ext) if self.extensions.iter().any(|e| e == ext) => None,
            _ => Some("not an audio file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_audio_links() {
        let v = StreamValidator::default();
        assert!(v.accepts("https://cdn.example.com/a/b/song.mp3"));
        assert!(v.accepts("http://cdn.example.com/song.FLAC"));
        assert!(v.accepts("https://cdn.example.com/song.m4a?vkey=abc&guid=1#t=3"));
    }

    #[test]
    fn test_rejects_non_http_schemes() {
        let v = StreamValidator::default();
        assert!(!v.accepts("ftp://cdn.example.com/song.mp3"));
        assert!(!v.accepts("data:audio/mp3;base64,AAAA"));
        assert!(!v.accepts("/relative/song.mp3"));
    }

    #[test]
    fn test_rejects_non_audio_paths() {
        let v = StreamValidator::default();
        assert!(!v.accepts("https://cdn.example.com/watch?id=song.mp3"));
        assert!(!v.accepts("https://cdn.example.com/index.html"));
        assert!(!v.accepts("https://cdn.example.com/mp3"));
        assert!(!v.accepts(""));
    }

    #[test]
    fn test_rejects_deny_listed_hosts() {
        let v = StreamValidator::default();
        assert_eq!(
            v.rejection("https://v3-web.douyinvod.com/obj/audio.mp3"),
            Some("deny-listed host")
        );
    }

    #[test]
    fn test_custom_lists() {
        let v = StreamValidator::new([".MP3"], ["bad.example"]);
        assert!(v.accepts("https://good.example/x.mp3"));
        assert!(!v.accepts("https://good.example/x.flac"));
        assert!(!v.accepts("https://bad.example/x.mp3"));
    }
}
