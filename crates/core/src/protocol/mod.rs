//! Text protocol layer: RTSP/1.0 and HTTP/1.0 messages (RFC 2326, RFC 1945).
//!
//! The client builds requests and parses replies; both protocols share
//! the same head syntax:
//!
//! ```text
//! RTSP/1.0 200 OK\r\n
//! CSeq: 2\r\n
//! Content-Base: rtsp://10.0.0.5:554/stream1/\r\n
//! Content-Length: 142\r\n
//! \r\n
//! v=0\r\n...
//! ```
//!
//! ## Methods issued
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery, first request of a session |
//! | DESCRIBE | §10.2 | Retrieve SDP; repeated once with Basic credentials on 401 |
//! | SETUP | §10.4 | Negotiate TCP interleaved transport |
//! | PLAY | §10.5 | Start delivery for a clock or NPT range |
//! | GET (HTTP) | RFC 1945 §8.1 | FLV stream, DVR control commands, Axon depth query |

pub mod range;
pub mod request;
pub mod response;
pub mod sdp;

pub use range::Range;
pub use request::Request;
pub use response::Reply;
