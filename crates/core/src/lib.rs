pub mod connection;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod source;
pub mod target;
mod transport;

pub use connection::{Connection, ConnectionConfig};
pub use error::{InspectError, Result};
pub use sink::{Channel, LogSink, MemorySink, TracingSink};
pub use source::{Action, ActionOutcome, Command, Source};
pub use target::{SourceOptions, Target, Variant};
