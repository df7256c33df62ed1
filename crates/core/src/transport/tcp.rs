use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token};
use parking_lot::Mutex;
use slab::Slab;

use crate::connection::ConnectionConfig;
use crate::error::{InspectError, Result};
use crate::sink::{Channel, LogSink};
use crate::source::{Action, ActionOutcome, Command, ReplyProgress, Source};

const EVENT_CAPACITY: usize = 64;

/// State shared between a [`crate::Connection`] handle and its reactor.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) actions: Mutex<VecDeque<Action>>,
    pub(crate) running: AtomicBool,
    pub(crate) last_error: Mutex<Option<InspectError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The stream connection; its failure ends the session.
    Primary,
    /// Short-lived connection carrying one playback command.
    Control,
}

struct Endpoint {
    stream: TcpStream,
    role: Role,
    port: u16,
    outbound: Vec<u8>,
    inbound: Vec<u8>,
}

/// Single-threaded event loop owning every socket of one session.
///
/// Runs until the shared `running` flag is cleared, either by the handle
/// or by a fatal error on the primary connection.
pub(crate) struct Reactor {
    host: String,
    port: u16,
    source: Box<dyn Source>,
    sink: Arc<dyn LogSink>,
    config: ConnectionConfig,
    shared: Arc<Shared>,
    endpoints: Slab<Endpoint>,
    primary: Option<Token>,
    /// Framing hint returned by the last `on_stream` call.
    expected_len: usize,
}

impl Reactor {
    pub(crate) fn new(
        host: &str,
        port: u16,
        source: Box<dyn Source>,
        sink: Arc<dyn LogSink>,
        config: ConnectionConfig,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            source,
            sink,
            config,
            shared,
            endpoints: Slab::new(),
            primary: None,
            expected_len: 0,
        }
    }

    pub(crate) fn run(mut self) {
        if let Err(error) = self.serve() {
            self.fail(error);
        }
        self.endpoints.clear();
        self.shared.running.store(false, Ordering::SeqCst);
        tracing::info!(host = %self.host, port = self.port, "reactor stopped");
    }

    fn serve(&mut self) -> Result<()> {
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        self.replace_primary(poll.registry())?;
        let mut last_position = Instant::now();

        while self.shared.running.load(Ordering::SeqCst) {
            self.dispatch_actions(poll.registry())?;

            match poll.poll(&mut events, Some(self.config.poll_interval)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                let readable = event.is_readable() || event.is_read_closed() || event.is_error();
                self.service(poll.registry(), event.token(), readable, event.is_writable());
            }

            if let Some(period) = self.config.position_period
                && last_position.elapsed() >= period
            {
                last_position = Instant::now();
                self.shared
                    .actions
                    .lock()
                    .push_back(Action::new(Command::GetPos));
            }
        }
        Ok(())
    }

    /// Hand every queued action to the source, oldest first.
    fn dispatch_actions(&mut self, registry: &Registry) -> Result<()> {
        let actions = std::mem::take(&mut *self.shared.actions.lock());
        for action in actions {
            let outcome = match self.source.add_action(&self.host, self.port, &action) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(%action, %error, "action rejected");
                    self.sink.log(Channel::Error, &format!("{action}: {error}"));
                    continue;
                }
            };
            match outcome {
                ActionOutcome::Ignored => tracing::debug!(%action, "action ignored"),
                ActionOutcome::Control { port, request } => {
                    if let Err(error) = self.open(registry, port, Role::Control, request) {
                        tracing::warn!(%action, port, %error, "control connection failed");
                        self.sink.log(Channel::Error, &format!("{action}: {error}"));
                    }
                }
                ActionOutcome::Reconnect => self.replace_primary(registry)?,
            }
        }
        Ok(())
    }

    fn replace_primary(&mut self, registry: &Registry) -> Result<()> {
        if let Some(token) = self.primary.take() {
            tracing::info!(?token, "replacing primary connection");
            self.close(registry, token);
        }
        self.expected_len = 0;
        let request = self.source.stream_request(&self.host, self.port);
        let token = self.open(registry, self.port, Role::Primary, request)?;
        self.primary = Some(token);
        Ok(())
    }

    fn open(
        &mut self,
        registry: &Registry,
        port: u16,
        role: Role,
        request: Vec<u8>,
    ) -> Result<Token> {
        let addr = (self.host.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {}", self.host))
            })?;
        let stream = std::net::TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        stream.set_nonblocking(true)?;
        let mut stream = TcpStream::from_std(stream);

        let entry = self.endpoints.vacant_entry();
        let token = Token(entry.key());
        registry.register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
        entry.insert(Endpoint {
            stream,
            role,
            port,
            outbound: request,
            inbound: Vec::new(),
        });
        tracing::info!(%addr, ?role, ?token, "connected");

        if let Err(error) = self.flush(token) {
            self.close(registry, token);
            return Err(error);
        }
        Ok(token)
    }

    fn service(&mut self, registry: &Registry, token: Token, readable: bool, writable: bool) {
        let Some(role) = self.endpoints.get(token.0).map(|e| e.role) else {
            return;
        };
        match (self.service_endpoint(token, readable, writable), role) {
            (Ok(true), _) => {}
            (Ok(false), Role::Primary) => {
                self.close(registry, token);
                self.fail(
                    io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed by peer").into(),
                );
            }
            (Ok(false), Role::Control) => {
                self.finish_control(token);
                self.close(registry, token);
            }
            (Err(error), Role::Primary) => {
                self.close(registry, token);
                self.fail(error);
            }
            (Err(error), Role::Control) => {
                tracing::warn!(?token, %error, "control connection failed");
                self.sink.log(Channel::Error, &error.to_string());
                self.close(registry, token);
            }
        }
    }

    /// Returns false once the peer closed the connection.
    fn service_endpoint(&mut self, token: Token, readable: bool, writable: bool) -> Result<bool> {
        if writable {
            self.flush(token)?;
        }
        if readable {
            return self.drain(token);
        }
        Ok(true)
    }

    /// Read until the socket would block. Edge-triggered readiness is not
    /// reported again for bytes left unread.
    fn drain(&mut self, token: Token) -> Result<bool> {
        let mut chunk = vec![0u8; self.config.read_chunk.max(1)];
        loop {
            let Some(endpoint) = self.endpoints.get_mut(token.0) else {
                return Ok(false);
            };
            match endpoint.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => self.on_bytes(token, &chunk[..n])?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn on_bytes(&mut self, token: Token, data: &[u8]) -> Result<()> {
        let Some(endpoint) = self.endpoints.get_mut(token.0) else {
            return Ok(());
        };
        match endpoint.role {
            Role::Primary => {
                let feed = self.source.on_stream(data, self.expected_len)?;
                self.expected_len = feed.expected_len;
                if let Some(bytes) = feed.outbound {
                    self.send(token, bytes)?;
                }
            }
            Role::Control => {
                endpoint.inbound.extend_from_slice(data);
                if self.source.on_action_reply(&endpoint.inbound, false)?
                    == ReplyProgress::Complete
                {
                    endpoint.inbound.clear();
                }
            }
        }
        Ok(())
    }

    /// Give the source whatever a closing control connection left behind.
    fn finish_control(&mut self, token: Token) {
        let Some(endpoint) = self.endpoints.get_mut(token.0) else {
            return;
        };
        let inbound = std::mem::take(&mut endpoint.inbound);
        if inbound.is_empty() {
            return;
        }
        if let Err(error) = self.source.on_action_reply(&inbound, true) {
            tracing::warn!(?token, %error, "control reply rejected");
            self.sink.log(Channel::Error, &error.to_string());
        }
    }

    fn send(&mut self, token: Token, bytes: Vec<u8>) -> Result<()> {
        if let Some(endpoint) = self.endpoints.get_mut(token.0) {
            endpoint.outbound.extend(bytes);
        }
        self.flush(token)
    }

    fn flush(&mut self, token: Token) -> Result<()> {
        let Some(endpoint) = self.endpoints.get_mut(token.0) else {
            return Ok(());
        };
        while !endpoint.outbound.is_empty() {
            match endpoint.stream.write(&endpoint.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    endpoint.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn close(&mut self, registry: &Registry, token: Token) {
        if !self.endpoints.contains(token.0) {
            return;
        }
        let mut endpoint = self.endpoints.remove(token.0);
        if let Err(error) = registry.deregister(&mut endpoint.stream) {
            tracing::debug!(?token, %error, "deregister failed");
        }
        if self.primary == Some(token) {
            self.primary = None;
        }
        tracing::debug!(?token, role = ?endpoint.role, port = endpoint.port, "connection closed");
    }

    /// Record a fatal error and stop the loop.
    fn fail(&mut self, error: InspectError) {
        tracing::error!(host = %self.host, port = self.port, %error, "session stopped");
        self.sink.log(Channel::Error, &error.to_string());
        *self.shared.last_error.lock() = Some(error);
        self.shared.running.store(false, Ordering::SeqCst);
    }
}
