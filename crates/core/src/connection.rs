use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::InspectError;
use crate::sink::LogSink;
use crate::source::{Action, Source};
use crate::transport::tcp::{Reactor, Shared};

/// Reactor tuning.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on one poll; the action queue and position timer are
    /// serviced at least this often.
    pub poll_interval: Duration,
    /// Size of each socket read.
    pub read_chunk: usize,
    pub connect_timeout: Duration,
    /// Period of the synthetic `getpos` action. `None` disables it.
    pub position_period: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            read_chunk: 1024,
            connect_timeout: Duration::from_secs(5),
            position_period: None,
        }
    }
}

/// Handle to one inspected stream.
///
/// [`start`](Self::start) spawns a reactor thread that owns every socket
/// and the [`Source`]. The handle only queues actions and observes the
/// outcome; it never blocks on the network.
pub struct Connection {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    host: String,
    port: u16,
}

impl Connection {
    /// Spawn the reactor for `host:port`.
    ///
    /// Connect failures surface through [`take_error`](Self::take_error)
    /// and the sink's error channel, not through this call.
    pub fn start(
        host: &str,
        port: u16,
        source: Box<dyn Source>,
        sink: Arc<dyn LogSink>,
        config: ConnectionConfig,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::SeqCst);

        tracing::info!(host, port, "starting connection");
        let reactor = Reactor::new(host, port, source, sink, config, shared.clone());
        let thread = thread::spawn(move || reactor.run());

        Self {
            shared,
            thread: Some(thread),
            host: host.to_string(),
            port,
        }
    }

    /// Queue an action for the source. Safe to call from any thread.
    pub fn request_action(&self, action: Action) {
        tracing::debug!(%action, "action queued");
        self.shared.actions.lock().push_back(action);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The error that stopped the reactor, if any. Cleared by the call.
    pub fn take_error(&self) -> Option<InspectError> {
        self.shared.last_error.lock().take()
    }

    /// Ask the reactor to stop and wait for it.
    pub fn stop(&mut self) {
        if self.thread.is_some() {
            tracing::info!(host = %self.host, port = self.port, "connection stopping");
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the reactor to finish on its own.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!(host = %self.host, port = self.port, "reactor thread panicked");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}
