//! RTSP/1.0 client with interleaved RTP over the same TCP connection.
//!
//! ```text
//! OPTIONS  -> reply with Public            -> DESCRIBE
//! DESCRIBE -> 401 + Basic challenge        -> DESCRIBE with Authorization (once)
//! DESCRIBE -> 200 + SDP                    -> SETUP first control path
//! SETUP    -> 200 + Session + Transport    -> PLAY with Range
//! PLAY     -> 200 / first '$' frame        -> interleaved RTP
//! ```

use std::sync::Arc;

use crate::error::{InspectError, Result};
use crate::media::rtp::{self, INTERLEAVED_HEADER_LEN, INTERLEAVED_MAGIC, Interleaved};
use crate::media::{TimestampDelta, h264};
use crate::protocol::request::{self, Request, USER_AGENT};
use crate::protocol::response::{self, Reply};
use crate::protocol::{Range, sdp};
use crate::session::transport::{INTERLEAVED_TRANSPORT, TransportHeader};
use crate::session::{self, RtspState, Session};
use crate::sink::{Channel, LogSink};
use crate::source::{Action, ActionOutcome, Feed, ReplyProgress, Source};
use crate::target::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Options,
    Describe,
    Setup,
    Play,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
        }
    }
}

/// Plain RTSP source.
///
/// Negotiates the session in text mode, then reports every completed
/// H.264 access unit of the interleaved RTP channel.
pub struct RtspSource {
    sink: Arc<dyn LogSink>,
    credentials: Option<Credentials>,
    content: String,
    suffix: String,
    url: String,
    session: Session,
    /// Method of the last request sent, used to interpret its reply.
    pending: Option<Method>,
    buffer: Vec<u8>,
}

impl RtspSource {
    pub fn new(sink: Arc<dyn LogSink>, credentials: Option<Credentials>, content: &str) -> Self {
        let mut session = Session::new();
        session.authorization = credentials
            .as_ref()
            .map(|c| request::basic_authorization(&c.username, &c.password));
        Self {
            sink,
            credentials,
            content: content.to_string(),
            suffix: String::new(),
            url: String::new(),
            session,
            pending: None,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> RtspState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Request URL of the current primary connection.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn range(&self) -> Option<&Range> {
        self.session.range.as_ref()
    }

    /// Fix the playback range; SDP ranges no longer override it.
    pub fn set_range(&mut self, range: Range) {
        self.session.range = Some(range);
    }

    /// Text appended to the content path when the URL is built.
    pub fn set_suffix(&mut self, suffix: String) {
        self.suffix = suffix;
    }

    pub fn timestamps(&self) -> &TimestampDelta {
        &self.session.timestamps
    }

    /// Drop everything tied to the current server session ahead of a
    /// reconnect.
    pub fn clear(&mut self) {
        self.session.clear();
        self.pending = None;
        self.buffer.clear();
    }

    fn request(&self, method: Method, uri: &str) -> Request {
        Request::rtsp(method.as_str(), uri)
            .add_header("CSeq", &self.session.sequence.to_string())
            .add_header("User-Agent", USER_AGENT)
            .with_authorization(self.session.authorization.as_deref())
    }

    fn send(&mut self, method: Method, request: Request) -> Vec<u8> {
        tracing::debug!(
            method = method.as_str(),
            uri = %request.uri,
            cseq = self.session.sequence,
            "request"
        );
        let text = request.serialize();
        self.sink.log(Channel::Rtsp, &text);
        self.pending = Some(method);
        text.into_bytes()
    }

    fn describe(&mut self) -> Vec<u8> {
        let request = self
            .request(Method::Describe, &self.url)
            .add_header("Accept", "application/sdp");
        self.send(Method::Describe, request)
    }

    fn setup(&mut self) -> Vec<u8> {
        let base = self
            .session
            .content_base
            .clone()
            .unwrap_or_else(|| self.url.clone());
        let uri = match self.session.controls.first() {
            Some(control) => control_url(&base, control),
            None => base,
        };
        let request = self
            .request(Method::Setup, &uri)
            .add_header("Transport", INTERLEAVED_TRANSPORT);
        self.send(Method::Setup, request)
    }

    fn play(&mut self) -> Result<Vec<u8>> {
        self.session.advance(RtspState::AskPlaying)?;
        let range = self.session.range.clone().unwrap_or_default();
        let uri = self
            .session
            .content_base
            .clone()
            .unwrap_or_else(|| self.url.clone());
        let mut request = self
            .request(Method::Play, &uri)
            .add_header("Range", &range.header_value());
        if let Some(id) = &self.session.id {
            request = request.add_header("Session", id);
        }
        Ok(self.send(Method::Play, request))
    }

    /// Handle one complete reply and return the request it triggers.
    fn on_reply(&mut self, message: &str) -> Result<Option<Vec<u8>>> {
        self.sink.log(Channel::Rtsp, message);
        let reply = Reply::parse(message)?;
        tracing::debug!(
            status = reply.status_code,
            state = %self.session.state(),
            "reply"
        );

        match reply.status_code {
            200 => {}
            401 if !self.session.auth_retried => {}
            401 => {
                return Err(InspectError::Unauthorized(format!(
                    "credentials rejected by {}",
                    self.url
                )));
            }
            code => {
                return Err(InspectError::Status {
                    code,
                    url: self.url.clone(),
                });
            }
        }

        // Requests built below must carry the next sequence number.
        if let Some(cseq) = reply.get_header("CSeq")
            && let Ok(cseq) = cseq.parse::<u32>()
        {
            self.session.sequence = cseq.saturating_add(1);
        }

        let describing = self.pending == Some(Method::Describe);
        let mut outbound = None;
        for (name, value) in &reply.headers {
            let request = match name.to_ascii_lowercase().as_str() {
                "public" if self.pending == Some(Method::Options) => Some(self.describe()),
                "content-base" if reply.is_success() && describing => {
                    Some(self.on_description(value, &reply.body)?)
                }
                "session" if reply.is_success() => {
                    self.on_session(value)?;
                    None
                }
                "transport" => {
                    self.on_transport(value);
                    None
                }
                "www-authenticate" if reply.status_code == 401 && outbound.is_none() => {
                    self.on_challenge(value)
                }
                _ => None,
            };
            if request.is_some() {
                outbound = request;
            }
        }

        if reply.status_code == 401 && outbound.is_none() {
            return Err(InspectError::Unauthorized(format!(
                "no Basic challenge from {}",
                self.url
            )));
        }

        if reply.is_success() && describing && reply.get_header("Content-Base").is_none() {
            let base = format!("{}/", self.url);
            outbound = Some(self.on_description(&base, &reply.body)?);
        }

        if self.session.state() == RtspState::Setup {
            outbound = Some(self.play()?);
        }

        Ok(outbound)
    }

    fn on_description(&mut self, base: &str, body: &str) -> Result<Vec<u8>> {
        self.session.advance(RtspState::Described)?;
        let description = sdp::parse(body);
        if self.session.range.is_none() {
            self.session.range = description.range;
        }
        self.session.controls = description.controls;
        self.session.content_base = Some(base.to_string());
        Ok(self.setup())
    }

    fn on_session(&mut self, value: &str) -> Result<()> {
        if self.session.id.is_none() {
            self.session.advance(RtspState::Setup)?;
            self.session.id = Some(session::session_id(value).to_string());
        } else if self.pending == Some(Method::Play) {
            self.session.advance(RtspState::Playing)?;
        }
        Ok(())
    }

    fn on_transport(&mut self, value: &str) {
        match TransportHeader::parse(value) {
            Some(transport) => self.session.transport = transport,
            None => tracing::warn!(transport = value, "no interleaved channels in reply"),
        }
    }

    fn on_challenge(&mut self, value: &str) -> Option<Vec<u8>> {
        let scheme = value.split_whitespace().next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("Basic") {
            tracing::debug!(scheme, "unsupported authentication scheme");
            return None;
        }
        let (username, password) = self
            .credentials
            .as_ref()
            .map_or(("", ""), |c| (c.username.as_str(), c.password.as_str()));
        self.session.authorization = Some(request::basic_authorization(username, password));
        self.session.auth_retried = true;
        Some(self.describe())
    }

    /// Whether the reply head at the front of the buffer is not text.
    fn head_is_binary(&self) -> bool {
        let end = response::head_len(&self.buffer).unwrap_or(self.buffer.len());
        matches!(std::str::from_utf8(&self.buffer[..end]), Err(e) if e.error_len().is_some())
    }

    fn consume_frames(&mut self) {
        while self.resync() {
            let Some(prefix) = Interleaved::parse(&self.buffer) else {
                return;
            };
            // The next frame's prefix must be buffered too.
            if self.buffer.len() < prefix.frame_len() + INTERLEAVED_HEADER_LEN {
                return;
            }
            if prefix.channel == self.session.transport.rtp_channel {
                let packet = &self.buffer[INTERLEAVED_HEADER_LEN..prefix.frame_len()];
                if let Some(record) = access_unit(packet, &mut self.session.timestamps) {
                    self.sink.log(Channel::Rtp, &record);
                }
            } else {
                tracing::trace!(channel = prefix.channel, size = prefix.size, "skipping frame");
            }
            self.buffer.drain(..prefix.frame_len());
        }
    }

    /// Drop bytes up to the next frame marker. Returns false when none is
    /// buffered.
    fn resync(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == INTERLEAVED_MAGIC) {
            Some(0) => true,
            Some(skip) => {
                tracing::warn!(skip, "resynchronising interleaved stream");
                self.buffer.drain(..skip);
                true
            }
            None => {
                if !self.buffer.is_empty() {
                    tracing::warn!(len = self.buffer.len(), "discarding bytes without frame marker");
                    self.buffer.clear();
                }
                false
            }
        }
    }

    fn missing_bytes(&self) -> usize {
        if !self.session.is_playing() {
            return 0;
        }
        let needed = match Interleaved::parse(&self.buffer) {
            Some(prefix) => prefix.frame_len() + INTERLEAVED_HEADER_LEN,
            None => INTERLEAVED_HEADER_LEN,
        };
        needed.saturating_sub(self.buffer.len())
    }
}

impl Source for RtspSource {
    fn stream_request(&mut self, host: &str, port: u16) -> Vec<u8> {
        self.url = format!("rtsp://{host}:{port}/{}{}", self.content, self.suffix);
        tracing::info!(url = %self.url, "opening RTSP session");
        let request = self.request(Method::Options, &self.url);
        self.send(Method::Options, request)
    }

    fn on_action_reply(&mut self, _data: &[u8], _closed: bool) -> Result<ReplyProgress> {
        Ok(ReplyProgress::Complete)
    }

    fn on_stream(&mut self, data: &[u8], _expected_len: usize) -> Result<Feed> {
        self.buffer.extend_from_slice(data);

        let mut outbound: Option<Vec<u8>> = None;
        while !self.session.is_playing() {
            let blank = self
                .buffer
                .iter()
                .take_while(|&&b| b == b'\r' || b == b'\n')
                .count();
            self.buffer.drain(..blank);
            if self.buffer.is_empty() {
                break;
            }
            if self.buffer[0] == INTERLEAVED_MAGIC && self.session.id.is_some() {
                self.session.advance(RtspState::Playing)?;
                break;
            }
            if self.head_is_binary() {
                tracing::warn!(state = %self.session.state(), "undecodable reply, expecting frames");
                self.session.advance(RtspState::Playing)?;
                break;
            }
            let Some(len) = response::message_len(&self.buffer) else {
                break;
            };
            let message = String::from_utf8_lossy(&self.buffer[..len]).into_owned();
            self.buffer.drain(..len);
            if let Some(request) = self.on_reply(&message)? {
                outbound.get_or_insert_with(Vec::new).extend(request);
            }
        }

        if self.session.is_playing() {
            self.consume_frames();
        }

        Ok(Feed {
            expected_len: self.missing_bytes(),
            outbound,
        })
    }

    fn add_action(&mut self, _host: &str, _port: u16, action: &Action) -> Result<ActionOutcome> {
        tracing::debug!(%action, "action ignored by RTSP source");
        Ok(ActionOutcome::Ignored)
    }
}

/// Resolve an SDP control attribute against the content base.
fn control_url(base: &str, control: &str) -> String {
    if control.starts_with("rtsp://") || control.starts_with("rtsps://") {
        return control.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        control.trim_start_matches('/')
    )
}

/// Operator record for a packet that completes an access unit.
fn access_unit(packet: &[u8], timestamps: &mut TimestampDelta) -> Option<String> {
    let (header, payload) = rtp::split_packet(packet)?;
    let unit_type = h264::completed_unit(payload)?;
    let delta = timestamps.observe(header.timestamp);
    tracing::trace!(unit_type, ts = header.timestamp, delta, "access unit");
    Some(format!(
        "Rtp(type={unit_type}, ts={}, delta={delta})",
        header.timestamp
    ))
}
