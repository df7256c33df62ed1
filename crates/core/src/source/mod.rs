//! Per-protocol stream sources.
//!
//! A [`Source`] turns the bytes of one endpoint into operator log records
//! and tells the reactor what to send next. The reactor owns the sockets;
//! sources never touch the network except for the blocking range lookup
//! an Axon source performs before it is handed over.
//!
//! | Variant | Module | Primary stream | Control channel |
//! |---------|--------|----------------|-----------------|
//! | HTTP/FLV | [`flv`] | `GET` + FLV tags | `GET /?control=..` on a side port |
//! | RTSP | [`rtsp`] | RTSP dialog + interleaved RTP | none |
//! | Axon | [`axon`] | as RTSP, start time in URL | reconnect on `scale`/`seek` |

pub mod axon;
pub mod flv;
pub mod rtsp;

use std::fmt;
use std::str::FromStr;

use crate::error::{InspectError, Result};

pub use axon::{AxonOptions, AxonSource};
pub use flv::FlvSource;
pub use rtsp::RtspSource;

/// Playback command accepted from the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Scale,
    Seek,
    Play,
    Rplay,
    Pause,
    Forward,
    Backward,
    Shift,
    GetPos,
}

impl Command {
    /// Name used on the wire and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Seek => "seek",
            Self::Play => "play",
            Self::Rplay => "rplay",
            Self::Pause => "pause",
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Shift => "shift",
            Self::GetPos => "getpos",
        }
    }
}

impl FromStr for Command {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scale" => Ok(Self::Scale),
            "seek" => Ok(Self::Seek),
            "play" => Ok(Self::Play),
            "rplay" => Ok(Self::Rplay),
            "pause" => Ok(Self::Pause),
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            "shift" => Ok(Self::Shift),
            "getpos" => Ok(Self::GetPos),
            _ => Err(InspectError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued playback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub command: Command,
    pub param: Option<String>,
}

impl Action {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            param: None,
        }
    }

    pub fn with_param(command: Command, param: &str) -> Self {
        Self {
            command,
            param: Some(param.to_string()),
        }
    }

    /// Parse a command line such as `scale 2` or `pause`.
    ///
    /// ```
    /// use tsinspect::source::{Action, Command};
    ///
    /// let action = Action::parse("seek 20240101T101500Z").unwrap();
    /// assert_eq!(action.command, Command::Seek);
    /// assert_eq!(action.param.as_deref(), Some("20240101T101500Z"));
    /// assert!(Action::parse("rewind").is_err());
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command: Command = words.next().unwrap_or_default().parse()?;
        let param = words.next().map(str::to_string);
        Ok(Self { command, param })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{} {}", self.command, param),
            None => write!(f, "{}", self.command),
        }
    }
}

/// What the reactor has to do after a source accepted an action.
#[derive(Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Nothing to send; the source has no use for the command.
    Ignored,
    /// Open a secondary connection to `port` on the same host and send
    /// `request` on it.
    Control { port: u16, request: Vec<u8> },
    /// Drop the primary connection and reopen it with a fresh
    /// [`Source::stream_request`].
    Reconnect,
}

/// Result of feeding primary-stream bytes to a source.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feed {
    /// Parser hint handed back on the next [`Source::on_stream`] call.
    pub expected_len: usize,
    /// Bytes to write to the primary connection.
    pub outbound: Option<Vec<u8>>,
}

impl Feed {
    pub fn expect(expected_len: usize) -> Self {
        Self {
            expected_len,
            outbound: None,
        }
    }
}

/// Whether a control reply has been fully consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyProgress {
    /// Keep the buffered bytes and call again after the next read.
    Incomplete,
    /// The reply was handled; the buffer can be dropped.
    Complete,
}

/// Protocol-specific handling of one inspected stream.
///
/// All methods run on the reactor thread.
pub trait Source: Send {
    /// Initial request written to a freshly opened primary connection.
    fn stream_request(&mut self, host: &str, port: u16) -> Vec<u8>;

    /// Bytes read from a control connection.
    ///
    /// `data` is everything received on that connection since the last
    /// [`ReplyProgress::Complete`]. `closed` is set once the peer closed
    /// the connection, in which case the source must handle whatever it got.
    fn on_action_reply(&mut self, data: &[u8], closed: bool) -> Result<ReplyProgress>;

    /// Bytes read from the primary connection.
    ///
    /// `expected_len` is the hint returned by the previous call (zero at
    /// first). An error is fatal for the whole connection.
    fn on_stream(&mut self, data: &[u8], expected_len: usize) -> Result<Feed>;

    /// Translate a queued action into work for the reactor.
    fn add_action(&mut self, host: &str, port: u16, action: &Action) -> Result<ActionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip() {
        for name in [
            "scale", "seek", "play", "rplay", "pause", "forward", "backward", "shift", "getpos",
        ] {
            let command: Command = name.parse().unwrap();
            assert_eq!(command.as_str(), name);
        }
    }

    #[test]
    fn command_is_case_insensitive() {
        assert_eq!("GetPos".parse::<Command>().unwrap(), Command::GetPos);
    }

    #[test]
    fn parse_action_without_param() {
        let action = Action::parse("  pause ").unwrap();
        assert_eq!(action, Action::new(Command::Pause));
        assert_eq!(action.to_string(), "pause");
    }

    #[test]
    fn parse_empty_line() {
        assert!(matches!(
            Action::parse(""),
            Err(InspectError::UnknownCommand(_))
        ));
    }

    #[test]
    fn display_with_param() {
        assert_eq!(Action::with_param(Command::Scale, "4").to_string(), "scale 4");
    }
}
