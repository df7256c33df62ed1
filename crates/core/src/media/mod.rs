//! Binary framing parsers and timestamp bookkeeping.
//!
//! Only headers are decoded; media payloads are skipped.
//!
//! | Format | Module | Reference |
//! |--------|--------|-----------|
//! | RTP interleaved framing | [`rtp`] | RFC 2326 §10.12, RFC 3550 §5.1 |
//! | H.264 NAL / FU-A headers | [`h264`] | RFC 6184 §5.3, §5.8 |
//! | FLV header and tags | [`flv`] | Adobe FLV File Format v10 |
//!
//! Every parser returns `None` on a short buffer. Partial TCP reads are the
//! normal case, so the caller keeps the bytes and retries after the next
//! read instead of treating it as an error.

pub mod flv;
pub mod h264;
pub mod rtp;

/// Timestamp pair `[initial, last]` used to report drift between units.
///
/// The first observed timestamp initialises both ends. Each observation
/// returns `current - previous`, so the first unit and repeated timestamps
/// report zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampDelta {
    initial: Option<u32>,
    last: u32,
}

impl TimestampDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit timestamp and return the drift from the previous unit.
    pub fn observe(&mut self, timestamp: u32) -> i64 {
        if self.initial.is_none() {
            self.initial = Some(timestamp);
            self.last = timestamp;
        }
        let delta = i64::from(timestamp) - i64::from(self.last);
        self.last = timestamp;
        delta
    }

    pub fn initial(&self) -> Option<u32> {
        self.initial
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    /// Media time covered since the first unit, in clock ticks.
    ///
    /// Measured modulo 2^32, so a timestamp that wrapped past `u32::MAX`
    /// still counts forward.
    pub fn elapsed(&self) -> i64 {
        self.initial
            .map_or(0, |initial| i64::from(self.last.wrapping_sub(initial)))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
