//! Error types for the stream inspector.

use std::fmt;

/// Errors that can occur while inspecting a stream.
///
/// Variants map to the failure modes of each layer:
///
/// - **Startup**: [`InvalidUrl`](Self::InvalidUrl), [`RangeLookup`](Self::RangeLookup).
/// - **Transport**: [`Io`](Self::Io), for socket failures.
/// - **Protocol**: [`Parse`](Self::Parse), [`Status`](Self::Status),
///   [`Unauthorized`](Self::Unauthorized),
///   [`InvalidTransition`](Self::InvalidTransition), [`Json`](Self::Json).
/// - **Commands**: [`UnknownCommand`](Self::UnknownCommand),
///   [`InvalidParameter`](Self::InvalidParameter),
///   [`InvalidTimestamp`](Self::InvalidTimestamp).
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The startup URL is not of the form `proto://[user:pass@]host:port/content`.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Failed to parse an RTSP or HTTP reply.
    #[error("reply parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The source answered with a status other than 200 or 401.
    #[error("source {url} answered with status {code}")]
    Status { code: u16, url: String },

    /// The source demanded authentication that cannot be satisfied.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A reply would move the RTSP state machine backwards or skip a step.
    #[error("invalid RTSP state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The out-of-band range query of an Axon source failed.
    #[error("range lookup failed: {0}")]
    RangeLookup(String),

    /// A JSON body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Command name outside the supported action set.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A command parameter that the active source cannot interpret.
    #[error("invalid parameter {value:?} for {command}")]
    InvalidParameter { command: String, value: String },

    /// A range start that is not a `YYYYMMDDTHHMMSS[.fff]Z` token.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Specific kind of reply parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyMessage,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
        }
    }
}

/// Convenience alias for `Result<T, InspectError>`.
pub type Result<T> = std::result::Result<T, InspectError>;
