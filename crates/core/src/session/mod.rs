//! RTSP client session state (RFC 2326 §A.1, client side).
//!
//! ## Session lifecycle
//!
//! ```text
//! OPTIONS / DESCRIBE reply with SDP  -> Described
//! SETUP reply with Session           -> Setup
//! PLAY sent                          -> AskPlaying
//! PLAY reply / first '$' frame       -> Playing
//! clear()                            -> Initial   (reconnect for seek/scale)
//! ```
//!
//! Transitions only move forward. A reply that would skip a step, such as
//! a `Session` header before any DESCRIBE succeeded, is a protocol error.

pub mod transport;

use std::fmt;

use crate::error::{InspectError, Result};
use crate::media::TimestampDelta;
use crate::protocol::Range;
pub use transport::TransportHeader;

/// RTSP client state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RtspState {
    #[default]
    Initial,
    Described,
    Setup,
    AskPlaying,
    Playing,
}

impl RtspState {
    /// Whether moving from `self` to `next` keeps the negotiation order.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_advance_to(self, next: RtspState) -> bool {
        use RtspState::*;
        self == next
            || matches!(
                (self, next),
                (Initial, Described)
                    | (Described, Setup)
                    | (Setup, AskPlaying)
                    | (Setup, Playing)
                    | (AskPlaying, Playing)
            )
    }
}

impl fmt::Display for RtspState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "INITIAL",
            Self::Described => "DESCRIBED",
            Self::Setup => "SETUP",
            Self::AskPlaying => "ASK_PLAYING",
            Self::Playing => "PLAYING",
        };
        f.write_str(name)
    }
}

/// Negotiation state of one RTSP client session.
#[derive(Debug, Default)]
pub struct Session {
    state: RtspState,
    /// Server-assigned session id, without `;timeout=` parameters.
    pub id: Option<String>,
    /// CSeq for the next request.
    pub sequence: u32,
    /// `Authorization` header value once a Basic challenge was answered.
    pub authorization: Option<String>,
    /// Set after the single credential-bearing DESCRIBE retry.
    pub auth_retried: bool,
    pub content_base: Option<String>,
    pub controls: Vec<String>,
    pub transport: TransportHeader,
    pub range: Option<Range>,
    pub timestamps: TimestampDelta,
}

impl Session {
    pub fn new() -> Self {
        Session {
            sequence: 1,
            ..Default::default()
        }
    }

    pub fn state(&self) -> RtspState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == RtspState::Playing
    }

    /// Transition to `next`, rejecting moves that skip or reverse steps.
    pub fn advance(&mut self, next: RtspState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(InspectError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        if self.state != next {
            tracing::debug!(old_state = %self.state, new_state = %next, "state transition");
        }
        self.state = next;
        Ok(())
    }

    /// Return to [`RtspState::Initial`] ahead of a reconnect.
    ///
    /// Credentials, sequence numbering, the control paths and the range
    /// survive; everything tied to the old server session is dropped.
    pub fn clear(&mut self) {
        tracing::debug!(old_state = %self.state, "session cleared");
        self.state = RtspState::Initial;
        self.id = None;
        self.timestamps.reset();
    }
}

/// Extract the session id from a `Session` header value (RFC 2326 §12.37).
///
/// Handles the timeout suffix: `"SESSIONID;timeout=60"` -> `"SESSIONID"`.
pub fn session_id(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}
