//! Operator-facing log channels.
//!
//! Sources never own a display. They write human-readable records to a
//! [`LogSink`], one channel per pane of a front-end: protocol dialog on
//! `Http`/`Rtsp`, per-unit drift on `Rtp`/`Flv`, play position reports and
//! errors.

use std::fmt;

use parking_lot::Mutex;

/// Destination of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Http,
    Rtsp,
    Rtp,
    Flv,
    Position,
    Error,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Rtsp => "rtsp",
            Self::Rtp => "rtp",
            Self::Flv => "flv",
            Self::Position => "position",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of operator log records.
///
/// Called from the reactor thread only; implementations are shared with
/// the front-end through an `Arc`.
pub trait LogSink: Send + Sync {
    fn log(&self, channel: Channel, message: &str);
}

/// Forwards every record as a `tracing` event.
///
/// Errors are emitted at `ERROR` level, everything else at `INFO`, each
/// tagged with its channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, channel: Channel, message: &str) {
        let message = message.trim_end();
        match channel {
            Channel::Error => tracing::error!(channel = %channel, "{message}"),
            _ => tracing::info!(channel = %channel, "{message}"),
        }
    }
}

/// Keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Channel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written to `channel` so far.
    pub fn entries(&self, channel: Channel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, channel: Channel, message: &str) {
        self.entries.lock().push((channel, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_filters_by_channel() {
        let sink = MemorySink::new();
        sink.log(Channel::Rtsp, "OPTIONS");
        sink.log(Channel::Rtp, "Rtp(type=5, ts=0, delta=0)");
        sink.log(Channel::Rtsp, "DESCRIBE");
        assert_eq!(sink.entries(Channel::Rtsp), vec!["OPTIONS", "DESCRIBE"]);
        assert_eq!(sink.entries(Channel::Rtp).len(), 1);
        assert!(sink.entries(Channel::Flv).is_empty());
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::Position.to_string(), "position");
        assert_eq!(Channel::Error.as_str(), "error");
    }
}
