use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Textual commands accepted from every command source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Stop,
    Pause,
    Next,
    Prev,
    /// 1-based station number; `None` asks for the current one.
    Station(Option<u32>),
    /// `None` asks for the current volume.
    Volume(Option<VolumeChange>),
    Status,
    Info,
    List,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    Up(u32),
    Down(u32),
    Set(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (available: play, stop, pause, next, prev, station [n], volume [+|-]n, status, info, list, quit)")]
    UnknownVerb(String),
    #[error("invalid argument '{arg}' for {verb}")]
    BadArgument { verb: &'static str, arg: String },
    #[error("unexpected argument '{arg}' for {verb}")]
    UnexpectedArgument { verb: String, arg: String },
    #[error("invalid station number {0} (stations start at 1)")]
    StationOutOfRange(i64),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(ParseError::Empty)?.to_lowercase();
        let arg = parts.next();

        let cmd = match verb.as_str() {
            "play" | "p" => Command::Play,
            "stop" | "s" => Command::Stop,
            "pause" => Command::Pause,
            "next" | "n" => Command::Next,
            "prev" | "previous" => Command::Prev,
            "station" => Command::Station(arg.map(parse_station).transpose()?),
            "volume" | "v" => Command::Volume(arg.map(parse_volume).transpose()?),
            "status" => Command::Status,
            "info" => Command::Info,
            "list" => Command::List,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ParseError::UnknownVerb(verb)),
        };

        let extra = match cmd {
            Command::Station(_) | Command::Volume(_) => parts.next(),
            _ => arg,
        };
        if let Some(extra) = extra {
            return Err(ParseError::UnexpectedArgument {
                verb,
                arg: extra.to_string(),
            });
        }
        Ok(cmd)
    }
}

fn parse_station(arg: &str) -> Result<u32, ParseError> {
    let n: i64 = arg.parse().map_err(|_| ParseError::BadArgument {
        verb: "station",
        arg: arg.to_string(),
    })?;
    if n < 1 {
        return Err(ParseError::StationOutOfRange(n));
    }
    u32::try_from(n).map_err(|_| ParseError::BadArgument {
        verb: "station",
        arg: arg.to_string(),
    })
}

fn parse_volume(arg: &str) -> Result<VolumeChange, ParseError> {
    let bad = || ParseError::BadArgument {
        verb: "volume",
        arg: arg.to_string(),
    };
    // Digits only after the optional sign; "+-5" and "--5" are rejected.
    let amount = |digits: &str| -> Result<u32, ParseError> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        // Anything beyond u32 clamps the same way as any other overflow.
        Ok(digits.parse::<u32>().unwrap_or(u32::MAX))
    };

    if let Some(rest) = arg.strip_prefix('+') {
        Ok(VolumeChange::Up(amount(rest)?))
    } else if let Some(rest) = arg.strip_prefix('-') {
        Ok(VolumeChange::Down(amount(rest)?))
    } else {
        Ok(VolumeChange::Set(amount(arg)?))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play => f.write_str("play"),
            Command::Stop => f.write_str("stop"),
            Command::Pause => f.write_str("pause"),
            Command::Next => f.write_str("next"),
            Command::Prev => f.write_str("prev"),
            Command::Station(None) => f.write_str("station"),
            Command::Station(Some(n)) => write!(f, "station {}", n),
            Command::Volume(None) => f.write_str("volume"),
            Command::Volume(Some(VolumeChange::Up(n))) => write!(f, "volume +{}", n),
            Command::Volume(Some(VolumeChange::Down(n))) => write!(f, "volume -{}", n),
            Command::Volume(Some(VolumeChange::Set(n))) => write!(f, "volume {}", n),
            Command::Status => f.write_str("status"),
            Command::Info => f.write_str("info"),
            Command::List => f.write_str("list"),
            Command::Quit => f.write_str("quit"),
        }
    }
}

// ── now-playing metadata ──────────────────────────────────────────────────────

/// What the decoder has told us about the current stream.  Field names on the
/// wire match the snapshot file other programs already read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub stream_url: String,
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bitrate: String,
    #[serde(default, rename = "samplerate")]
    pub sample_rate: String,
    #[serde(default)]
    pub channels: String,
    #[serde(default)]
    pub station_url: String,
    #[serde(default, rename = "timestamp")]
    pub last_updated: Option<DateTime<Local>>,
}

impl StreamMetadata {
    /// Fresh record for a stream that has just been started.
    pub fn for_stream(url: &str) -> Self {
        Self {
            stream_url: url.to_string(),
            ..Self::default()
        }
    }
}

// ── command outcomes ─────────────────────────────────────────────────────────

/// Coarse failure taxonomy, used by adapters to choose a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed verb or argument.
    Command,
    /// Decoder spawn or mixer call failed.
    Resource,
    /// Empty playlist and similar conditions outside the caller's control.
    Environment,
    /// The daemon is shutting down.
    Unavailable,
}

/// State as seen at the end of a command, captured under the same lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub playing: bool,
    /// 1-based.
    pub current_station: usize,
    pub total_stations: usize,
    pub volume: u8,
    pub metadata: StreamMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationEntry {
    /// 1-based.
    pub id: usize,
    pub url: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub report: StatusReport,
    /// Only filled by `list`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stations: Vec<StationEntry>,
}

impl CommandOutcome {
    pub fn success(message: impl Into<String>, report: StatusReport) -> Self {
        Self {
            ok: true,
            message: message.into(),
            failure: None,
            report,
            stations: Vec::new(),
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>, report: StatusReport) -> Self {
        Self {
            ok: false,
            message: message.into(),
            failure: Some(kind),
            report,
            stations: Vec::new(),
        }
    }

    /// One-line reply for the local command channel.
    pub fn to_reply_line(&self) -> String {
        if self.ok {
            format!("OK: {}", self.message)
        } else {
            format!("ERROR: {}", self.message)
        }
    }
}

/// True when a control-channel reply reports a failure.
pub fn is_error_reply(reply: &str) -> bool {
    reply.trim_start().starts_with("ERROR:")
}
