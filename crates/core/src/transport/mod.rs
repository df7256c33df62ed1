//! Socket layer of a [`crate::Connection`].
//!
//! Every socket of a session lives on one reactor thread ([`tcp`]):
//!
//! - **Primary**: the stream connection. Replaced on reconnect; its
//!   failure ends the session.
//! - **Control**: short-lived connections opened for playback commands.
//!   Their failures are logged and dropped.
//!
//! Sockets are non-blocking and registered with `mio` for edge-triggered
//! read and write readiness. Connects are blocking with a timeout.

pub(crate) mod tcp;
