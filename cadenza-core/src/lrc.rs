use std::collections::HashSet;
use std::time::Duration;

/// Parsed lyric track: metadata plus cues sorted by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricTrack {
    pub metadata: LyricMetadata,
    pub cues: Vec<LyricCue>,
}

/// Metadata from LRC ID tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
    pub offset: i64, // milliseconds, can be negative
}

/// A single timestamped lyric line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricCue {
    pub time: Duration,
    pub text: String,
}

impl LyricCue {
    pub fn new(time: Duration, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

impl LyricTrack {
    /// Parse raw LRC text.
    ///
    /// Never fails: lines without a timestamp are skipped, cues with empty
    /// text are dropped, and when two cues share a time the first one in the
    /// input wins.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut metadata = LyricMetadata::default();
        let mut cues = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((tag, value)) = parse_id_tag(line) {
                match tag.to_lowercase().as_str() {
                    "ti" => metadata.title = Some(value),
                    "ar" => metadata.artist = Some(value),
                    "al" => metadata.album = Some(value),
                    "au" | "by" => metadata.author = Some(value),
                    "offset" => {
                        if let Ok(offset) = value.parse::<i64>() {
                            metadata.offset = offset;
                        }
                    }
                    _ => {}
                }
                continue;
            }

            if let Some(parsed) = parse_lyric_line(line) {
                cues.extend(parsed);
            }
        }

        if metadata.offset != 0 {
            for cue in &mut cues {
                cue.time = apply_offset(cue.time, metadata.offset);
            }
        }

        // Stable sort keeps input order among equal times, so dedup keeps the first.
        cues.sort_by_key(|c| c.time);
        let mut seen = HashSet::new();
        cues.retain(|c| seen.insert(c.time));

        Self { metadata, cues }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// The cue being sung at `position`: the last cue whose time has passed.
    #[must_use]
    pub fn active_cue_at(&self, position: Duration) -> Option<&LyricCue> {
        self.active_index_at(position).map(|i| &self.cues[i])
    }

    /// Index of the active cue at `position`
    #[must_use]
    pub fn active_index_at(&self, position: Duration) -> Option<usize> {
        // Cues are sorted, so the partition point is the first cue in the future.
        let upcoming = self.cues.partition_point(|c| c.time <= position);
        upcoming.checked_sub(1)
    }

    /// Cues around the active one for display. Before the first cue the
    /// window starts at the top of the track.
    #[must_use]
    pub fn window(&self, position: Duration, before: usize, after: usize) -> &[LyricCue] {
        if self.cues.is_empty() {
            return &[];
        }
        let current = self.active_index_at(position).unwrap_or(0);
        let start = current.saturating_sub(before);
        let end = (current + after + 1).min(self.cues.len());
        &self.cues[start..end]
    }
}

/// Parse an ID tag like [ti:Title] or [offset:+250]
fn parse_id_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') || !line.contains(':') {
        return None;
    }

    let end = line.find(']')?;
    let content = &line[1..end];

    let first_colon = content.find(':')?;
    let tag = &content[..first_colon];

    // A numeric tag is a timestamp, not an ID tag
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let value = content[first_colon + 1..].trim().to_string();
    Some((tag.to_string(), value))
}

/// Parse a lyric line like [00:12.34]Hello or [00:12.34][00:15.67]Same lyrics
fn parse_lyric_line(line: &str) -> Option<Vec<LyricCue>> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while remaining.starts_with('[') {
        let Some(end) = remaining.find(']') else {
            break;
        };
        let Some(time) = parse_timestamp(&remaining[1..end]) else {
            break;
        };
        timestamps.push(time);
        remaining = &remaining[end + 1..];
    }

    if timestamps.is_empty() {
        return None;
    }

    let text = remaining.trim();
    if text.is_empty() {
        return None;
    }

    Some(
        timestamps
            .into_iter()
            .map(|time| LyricCue::new(time, text))
            .collect(),
    )
}

/// Parse a timestamp like "00:12.34", "00:12.345", "00:12" or "00:12:34"
fn parse_timestamp(s: &str) -> Option<Duration> {
    let parts: Vec<&str> = s.trim().split(':').collect();

    let (minutes, seconds, fraction) = match parts.as_slice() {
        [minutes, rest] => match rest.split_once('.') {
            Some((seconds, fraction)) => (*minutes, seconds, Some(fraction)),
            None => (*minutes, *rest, None),
        },
        // mm:ss:xx uses a colon before the hundredths
        [minutes, seconds, fraction] => (*minutes, *seconds, Some(*fraction)),
        _ => return None,
    };

    let minutes: u64 = parse_digits(minutes)?;
    let seconds: u64 = parse_digits(seconds)?;
    if seconds >= 60 {
        return None;
    }
    let millis = match fraction {
        Some(fraction) => fraction_millis(fraction)?,
        None => 0,
    };

    // Out-of-range minutes leave the tag unmatched
    let total = minutes
        .checked_mul(60_000)?
        .checked_add(seconds * 1000)?
        .checked_add(millis)?;
    Some(Duration::from_millis(total))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Convert a 1-3 digit decimal fraction of a second to milliseconds
fn fraction_millis(fraction: &str) -> Option<u64> {
    let value = parse_digits(fraction)?;
    match fraction.len() {
        1 => Some(value * 100),
        2 => Some(value * 10),
        3 => Some(value),
        _ => None,
    }
}

/// Apply a millisecond offset to a duration (can be negative)
fn apply_offset(duration: Duration, offset_ms: i64) -> Duration {
    let magnitude = Duration::from_millis(offset_ms.unsigned_abs());
    if offset_ms >= 0 {
        duration + magnitude
    } else {
        duration.saturating_sub(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_parse_drops_duplicates_and_untagged_lines() {
        let input = "[00:01.50]Hello\n[00:03.00]World\n[00:01.50]Duplicate\nNo Tag Line";
        let track = LyricTrack::parse(input);
        assert_eq!(
            track.cues,
            vec![
                LyricCue::new(Duration::from_millis(1500), "Hello"),
                LyricCue::new(Duration::from_millis(3000), "World"),
            ]
        );
    }

    #[test]
    fn test_active_cue_at() {
        let track = LyricTrack::parse("[00:01.50]Hello\n[00:03.00]World");
        assert_eq!(track.active_cue_at(secs(2.0)).unwrap().text, "Hello");
        assert!(track.active_cue_at(secs(0.5)).is_none());
        assert_eq!(track.active_cue_at(secs(3.5)).unwrap().text, "World");
        // Exactly on a cue boundary the new cue is active
        assert_eq!(track.active_cue_at(secs(3.0)).unwrap().text, "World");
    }

    #[test]
    fn test_active_cue_on_empty_track() {
        let track = LyricTrack::parse("");
        assert!(track.is_empty());
        assert!(track.active_cue_at(secs(10.0)).is_none());
        assert!(track.window(secs(10.0), 1, 1).is_empty());
    }

    #[test]
    fn test_millisecond_precision() {
        let track = LyricTrack::parse("[01:02.345]Precise");
        assert_eq!(track.cues[0].time, Duration::from_millis(62_345));
    }

    #[test]
    fn test_out_of_order_input_is_sorted() {
        let track = LyricTrack::parse("[00:10.00]Second\n[00:05.00]First\n[00:15.00]Third");
        let texts: Vec<_> = track.cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["First", "Second", "Third"]);
    }

    #[test]
    fn test_empty_text_dropped() {
        let track = LyricTrack::parse("[00:01.00]   \n[00:02.00]Kept");
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues[0].text, "Kept");
    }

    #[test]
    fn test_text_is_trimmed() {
        let track = LyricTrack::parse("[00:01.00]   padded words   ");
        assert_eq!(track.cues[0].text, "padded words");
    }

    #[test]
    fn test_parse_id_tags() {
        let input = "[ti:Song Title]\n[ar:Artist Name]\n[al:Album Name]\n[by:Someone]\n[00:05.00]Lyrics here";
        let track = LyricTrack::parse(input);
        assert_eq!(track.metadata.title.as_deref(), Some("Song Title"));
        assert_eq!(track.metadata.artist.as_deref(), Some("Artist Name"));
        assert_eq!(track.metadata.album.as_deref(), Some("Album Name"));
        assert_eq!(track.metadata.author.as_deref(), Some("Someone"));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_parse_offset() {
        let track = LyricTrack::parse("[offset:500]\n[00:10.00]Test");
        assert_eq!(track.cues[0].time, Duration::from_millis(10_500));
    }

    #[test]
    fn test_parse_negative_offset_saturates() {
        let track = LyricTrack::parse("[offset:-1500]\n[00:01.00]Early\n[00:10.00]Late");
        assert_eq!(track.cues[0].time, Duration::ZERO);
        assert_eq!(track.cues[1].time, Duration::from_millis(8500));
    }

    #[test]
    fn test_parse_multi_timestamp_line() {
        let track = LyricTrack::parse("[00:05.00][00:15.00]Chorus");
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues[0].time, Duration::from_secs(5));
        assert_eq!(track.cues[1].time, Duration::from_secs(15));
        assert!(track.cues.iter().all(|c| c.text == "Chorus"));
    }

    #[test]
    fn test_alternative_timestamp_formats() {
        let track = LyricTrack::parse("[00:12:34]Colon\n[00:20]Whole second");
        assert_eq!(track.cues[0].time, Duration::from_millis(12_340));
        assert_eq!(track.cues[1].time, Duration::from_secs(20));
    }

    #[test]
    fn test_malformed_timestamps_ignored() {
        let track = LyricTrack::parse("[0a:12.00]Bad\n[00:75.00]Bad seconds\n[00:01.1234]Too precise");
        assert!(track.is_empty());
    }

    #[test]
    fn test_overflowing_minutes_ignored() {
        let track = LyricTrack::parse("[99999999999999999:00.00]Overflow\n[00:01.00]Fine");
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues[0].text, "Fine");
        assert_eq!(track.cues[0].time, Duration::from_secs(1));
    }

    #[test]
    fn test_cjk_lyrics() {
        let track = LyricTrack::parse("[00:05.00]你好世界");
        assert_eq!(track.cues[0].text, "你好世界");
    }

    #[test]
    fn test_window() {
        let track = LyricTrack::parse(
            "[00:05.00]Line 1\n[00:10.00]Line 2\n[00:15.00]Line 3\n[00:20.00]Line 4\n[00:25.00]Line 5",
        );
        let visible = track.window(secs(12.0), 1, 1);
        let texts: Vec<_> = visible.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["Line 1", "Line 2", "Line 3"]);

        let visible = track.window(secs(0.0), 1, 1);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].text, "Line 1");
    }
}
