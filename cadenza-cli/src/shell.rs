//! Interactive shell driving a [`Session`].

use crate::commands::{self, Command, HELP};
use cadenza_core::{
    CoreError, LyricCue, NowPlaying, ProviderId, Resolution, Session, Track, PLACEHOLDER_COVER,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

const LOG_TARGET: &str = "cadenza::shell";

/// Lines of context shown around the active lyric
const LYRIC_CONTEXT: usize = 2;

pub struct Shell {
    session: Arc<Session>,
    source: ProviderId,
    results: Vec<Track>,
    search_gate: SearchGate,
}

/// Refuses searches locally once the limiter has reported a wait
#[derive(Debug, Default)]
struct SearchGate {
    blocked_until: Option<Instant>,
}

impl SearchGate {
    fn block(&mut self, now: Instant, retry_after: Duration) {
        self.blocked_until = now.checked_add(retry_after);
    }

    /// Wait left before the next search may be sent
    fn remaining(&mut self, now: Instant) -> Option<Duration> {
        match self.blocked_until {
            Some(until) if until > now => Some(until - now),
            _ => {
                self.blocked_until = None;
                None
            }
        }
    }
}

/// Whether the shell keeps reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl Shell {
    #[must_use]
    pub const fn new(session: Arc<Session>, source: ProviderId) -> Self {
        Self {
            session,
            source,
            results: Vec::new(),
            search_gate: SearchGate {
                blocked_until: None,
            },
        }
    }

    /// Handle one input line
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match commands::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("! {e}");
                Flow::Continue
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Flow {
        let outcome = match command {
            Command::Quit => return Flow::Quit,
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Search(keyword) => self.search(&keyword).await,
            Command::Source(name) => {
                self.change_source(&name);
                Ok(())
            }
            Command::Play(index) => self.play_result(index).await,
            Command::Select(index) => {
                let resolution = self.session.select_index(index).await;
                report(resolution, "No such playlist entry")
            }
            Command::Next => {
                let resolution = self.session.next().await;
                report(resolution, "Playlist is empty")
            }
            Command::Prev => {
                let resolution = self.session.previous().await;
                report(resolution, "Playlist is empty")
            }
            Command::List => {
                self.list().await;
                Ok(())
            }
            Command::Lyrics => {
                self.print_lyrics().await;
                Ok(())
            }
            Command::At(position) => {
                self.print_lyrics_at(position).await;
                Ok(())
            }
            Command::Cover => {
                self.print_cover().await;
                Ok(())
            }
            Command::Volume(None) => {
                println!("Volume: {}", self.session.volume());
                Ok(())
            }
            Command::Volume(Some(volume)) => self
                .session
                .set_volume(volume)
                .await
                .map(|v| println!("Volume: {v}")),
            Command::Clear => self.session.clear().await.map(|()| println!("Playlist cleared")),
        };

        if let Err(e) = outcome {
            self.print_error(&e);
        }
        Flow::Continue
    }

    /// Resume the persisted selection
    pub async fn resume(&self) {
        let resolution = self.session.play_current().await;
        if let Err(e) = report(resolution, "Nothing to resume") {
            self.print_error(&e);
        }
    }

    async fn search(&mut self, keyword: &str) -> Result<(), CoreError> {
        if let Some(left) = self.search_gate.remaining(Instant::now()) {
            return Err(CoreError::RateLimited {
                retry_after_secs: left.as_secs_f64(),
            });
        }

        let results = match self.session.search(keyword, &self.source).await {
            Ok(results) => results,
            Err(e) => {
                if let CoreError::RateLimited { retry_after_secs } = &e {
                    let wait = Duration::try_from_secs_f64(*retry_after_secs).unwrap_or_default();
                    self.search_gate.block(Instant::now(), wait);
                }
                return Err(e);
            }
        };
        if results.is_empty() {
            println!("No results on {}", self.source);
        }
        let covers = self.session.thumbnails(&results).await;
        for (i, (track, cover)) in results.iter().zip(&covers).enumerate() {
            println!("{:>3}. {}", i + 1, describe(track));
            if cover != PLACEHOLDER_COVER {
                println!("     cover: {cover}");
            }
        }
        self.results = results;
        Ok(())
    }

    fn change_source(&mut self, name: &str) {
        if name.is_empty() {
            let known: Vec<_> = self
                .session
                .engine()
                .providers()
                .iter()
                .map(ToString::to_string)
                .collect();
            println!("Source: {} (configured: {})", self.source, known.join(", "));
            return;
        }
        self.source = ProviderId::new(name);
        self.results.clear();
        println!("Searching {} from now on", self.source);
    }

    async fn play_result(&self, index: usize) -> Result<(), CoreError> {
        let Some(track) = self.results.get(index).cloned() else {
            println!("! No search result {}", index + 1);
            return Ok(());
        };
        let resolution = self.session.add_and_select(track).await;
        report(resolution, "Nothing selected")
    }

    async fn list(&self) {
        let tracks = self.session.tracks().await;
        if tracks.is_empty() {
            println!("Playlist is empty");
            return;
        }
        let current = self.session.current_index().await;
        for (i, track) in tracks.iter().enumerate() {
            let marker = if i == current { '>' } else { ' ' };
            println!("{marker}{:>3}. {}", i + 1, describe(track));
        }
    }

    async fn print_lyrics(&self) {
        let lyrics = self.session.lyrics().await;
        if lyrics.is_empty() {
            println!("No lyrics");
            return;
        }
        for cue in &lyrics.cues {
            println!("{}", format_cue(cue));
        }
    }

    async fn print_lyrics_at(&self, position: Duration) {
        let lyrics = self.session.lyrics().await;
        if lyrics.is_empty() {
            println!("No lyrics");
            return;
        }
        let active = self.session.cue_at(position).await;
        for cue in lyrics.window(position, LYRIC_CONTEXT, LYRIC_CONTEXT) {
            let marker = if active.as_ref() == Some(cue) { '>' } else { ' ' };
            println!("{marker} {}", format_cue(cue));
        }
        if active.is_none() {
            println!("  (no line yet at {})", format_position(position));
        }
    }

    async fn print_cover(&self) {
        let Some(track) = self.session.current().await else {
            println!("Nothing selected");
            return;
        };
        let size = self.session.settings().cover_size;
        let cover = self.session.cover_for(&track, size).await;
        println!("Cover: {}", display_cover(&cover));
    }

    fn print_error(&self, e: &CoreError) {
        match e {
            CoreError::RateLimited { retry_after_secs } => {
                let settings = self.session.settings();
                println!(
                    "! Too many searches: at most {} every {} minutes. Try again in {} min.",
                    settings.rate_budget,
                    settings.rate_window.as_secs().div_ceil(60),
                    minutes_rounded_up(*retry_after_secs)
                );
            }
            e if e.is_user_facing() => println!("! {e}"),
            e => {
                error!(target: LOG_TARGET, "{e}");
                println!("! Something went wrong, see the log for details");
            }
        }
    }
}

fn report(resolution: Result<Resolution, CoreError>, nothing: &str) -> Result<(), CoreError> {
    match resolution? {
        Resolution::Ready(now_playing) => print_now_playing(&now_playing),
        // A newer selection already printed its own result
        Resolution::Superseded => {}
        Resolution::NoSelection => println!("{nothing}"),
    }
    Ok(())
}

fn print_now_playing(now: &NowPlaying) {
    println!(
        "Now playing: {} [{}kbps via {}]",
        now.track, now.stream.bitrate_kbps, now.stream.source
    );
    println!("  stream: {}", now.stream.url);
    println!("  cover:  {}", display_cover(&now.cover));
    if now.lyrics.is_empty() {
        println!("  lyrics: none");
    } else {
        println!("  lyrics: {} lines", now.lyrics.len());
    }
}

fn describe(track: &Track) -> String {
    if track.album.is_empty() {
        format!("{track} ({})", track.source)
    } else {
        format!("{track} [{}] ({})", track.album, track.source)
    }
}

fn display_cover(cover: &str) -> &str {
    if cover == PLACEHOLDER_COVER {
        "(no cover)"
    } else {
        cover
    }
}

fn format_cue(cue: &LyricCue) -> String {
    format!("[{}] {}", format_position(cue.time), cue.text)
}

/// `mm:ss.cc`
fn format_position(position: Duration) -> String {
    let centis = position.as_millis() / 10;
    format!(
        "{:02}:{:02}.{:02}",
        centis / 6000,
        (centis / 100) % 60,
        centis % 100
    )
}

fn minutes_rounded_up(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 1;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let minutes = (secs / 60.0).ceil() as u64;
    minutes.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(Duration::from_millis(1500)), "00:01.50");
        assert_eq!(format_position(Duration::from_millis(83_456)), "01:23.45");
    }

    #[test]
    fn test_minutes_rounded_up() {
        assert_eq!(minutes_rounded_up(240.0), 4);
        assert_eq!(minutes_rounded_up(241.0), 5);
        assert_eq!(minutes_rounded_up(0.2), 1);
    }

    #[test]
    fn test_describe() {
        let track = Track::new("kuwo", "1", "Song", vec!["A".into()], "Album");
        assert_eq!(describe(&track), "Song - A [Album] (kuwo)");
        let track = Track::new("kuwo", "1", "Song", vec![], "");
        assert_eq!(describe(&track), "Song (kuwo)");
    }

    #[test]
    fn test_search_gate_blocks_until_deadline() {
        let now = Instant::now();
        let mut gate = SearchGate::default();
        assert_eq!(gate.remaining(now), None);

        gate.block(now, Duration::from_secs(240));
        assert_eq!(gate.remaining(now), Some(Duration::from_secs(240)));
        assert_eq!(
            gate.remaining(now + Duration::from_secs(239)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(gate.remaining(now + Duration::from_secs(240)), None);
        assert!(gate.blocked_until.is_none());
    }

    #[test]
    fn test_placeholder_cover_hidden() {
        assert_eq!(display_cover(PLACEHOLDER_COVER), "(no cover)");
        assert_eq!(display_cover("https://img/1.jpg"), "https://img/1.jpg");
    }
}
