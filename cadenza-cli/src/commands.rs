//! Shell command parsing.

use std::time::Duration;
use thiserror::Error;

/// A parsed shell command. Indices are zero-based; the shell shows them one-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Search(String),
    Source(String),
    /// Queue and play a search result
    Play(usize),
    /// Play a playlist entry
    Select(usize),
    Next,
    Prev,
    List,
    Lyrics,
    /// Show the lyric cue at a playback position
    At(Duration),
    Cover,
    /// Show (`None`) or set the volume
    Volume(Option<u8>),
    Clear,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: {0} (type `help` for a list)")]
    Unknown(String),

    #[error("`{command}` needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },

    #[error("Not a valid {what}: {value}")]
    InvalidArgument { what: &'static str, value: String },
}

pub const HELP: &str = "\
Commands:
  search <keyword>   search the current source (alias: s)
  source [name]      show or change the search source
  play <n>           queue and play search result n
  select <n>         play playlist entry n
  next | prev        move through the playlist (aliases: n, p)
  list               show the playlist (alias: ls)
  lyrics             show the lyrics of the current track
  at <seconds>       show the lyric line at a playback position
  cover              show the cover of the current track
  volume [0-100]     show or set the volume
  clear              empty the playlist and stop
  help               show this help (alias: ?)
  quit               exit (aliases: q, exit)";

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns an error for unknown commands and missing or malformed arguments.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    let command = match word.to_lowercase().as_str() {
        "search" | "s" => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument {
                    command: "search",
                    what: "a keyword",
                });
            }
            Command::Search(rest.to_string())
        }
        "source" => Command::Source(rest.to_string()),
        "play" => Command::Play(parse_position("play", rest)?),
        "select" => Command::Select(parse_position("select", rest)?),
        "next" | "n" => Command::Next,
        "prev" | "previous" | "p" => Command::Prev,
        "list" | "ls" => Command::List,
        "lyrics" => Command::Lyrics,
        "at" => Command::At(parse_seconds(rest)?),
        "cover" => Command::Cover,
        "volume" | "vol" => Command::Volume(parse_volume(rest)?),
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(word.to_string())),
    };
    Ok(Some(command))
}

/// One-based list position to zero-based index
fn parse_position(command: &'static str, arg: &str) -> Result<usize, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument {
            command,
            what: "a number",
        });
    }
    arg.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .ok_or_else(|| ParseError::InvalidArgument {
            what: "position",
            value: arg.to_string(),
        })
}

fn parse_seconds(arg: &str) -> Result<Duration, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument {
            command: "at",
            what: "a position in seconds",
        });
    }
    arg.parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ParseError::InvalidArgument {
            what: "position in seconds",
            value: arg.to_string(),
        })
}

fn parse_volume(arg: &str) -> Result<Option<u8>, ParseError> {
    if arg.is_empty() {
        return Ok(None);
    }
    let value = arg.parse::<u32>().map_err(|_| ParseError::InvalidArgument {
        what: "volume",
        value: arg.to_string(),
    })?;
    Ok(Some(u8::try_from(value.min(100)).unwrap_or(100)))
}
