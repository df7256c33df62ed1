//! HTTP/FLV source for DVR streams.
//!
//! The stream itself is a plain `GET` answered with an FLV file. Playback
//! commands go over short-lived HTTP connections to a separate control
//! port and are answered with a JSON body.

use std::sync::Arc;

use serde::de::IgnoredAny;

use crate::error::{InspectError, Result};
use crate::media::TimestampDelta;
use crate::media::flv::{FlvParser, NEXT_TAG_MIN};
use crate::protocol::request::{Request, USER_AGENT};
use crate::protocol::response::{self, Reply};
use crate::sink::{Channel, LogSink};
use crate::source::{Action, ActionOutcome, Feed, ReplyProgress, Source};

/// FLV-over-HTTP source with an HTTP control channel.
pub struct FlvSource {
    sink: Arc<dyn LogSink>,
    content: String,
    control_port: u16,
    /// Channel id used in control requests.
    control: String,
    buffer: Vec<u8>,
    /// Set once the HTTP reply head has been consumed.
    streaming: bool,
    parser: FlvParser,
    timestamps: TimestampDelta,
}

impl FlvSource {
    pub fn new(sink: Arc<dyn LogSink>, content: &str, control_port: u16) -> Self {
        Self {
            sink,
            content: content.to_string(),
            control_port,
            control: control_id(content).to_string(),
            buffer: Vec::new(),
            streaming: false,
            parser: FlvParser::new(),
            timestamps: TimestampDelta::new(),
        }
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    pub fn timestamps(&self) -> &TimestampDelta {
        &self.timestamps
    }

    /// Consume the HTTP reply head. Returns false while it is incomplete.
    fn consume_head(&mut self) -> Result<bool> {
        let Some(len) = response::head_len(&self.buffer) else {
            return Ok(false);
        };
        let head = String::from_utf8_lossy(&self.buffer[..len]).into_owned();
        self.sink.log(Channel::Http, &head);
        let reply = Reply::parse(&head)?;
        if !(200..300).contains(&reply.status_code) {
            return Err(InspectError::Status {
                code: reply.status_code,
                url: format!("/{}", self.content),
            });
        }
        self.buffer.drain(..len);
        self.streaming = true;
        tracing::debug!(status = reply.status_code, "FLV stream started");
        Ok(true)
    }

    fn report_tag(&mut self, with_header: bool) {
        let Some(tag) = self.parser.tag().copied() else {
            return;
        };
        let delta = self.timestamps.observe(tag.timestamp);
        let record = format!(
            "FlvTag(type={}, size={}, ts={}, delta={delta})",
            tag.tag_type, tag.size, tag.timestamp
        );
        match self.parser.header().filter(|_| with_header) {
            Some(header) => self.sink.log(Channel::Flv, &format!("{header}\n{record}")),
            None => self.sink.log(Channel::Flv, &record),
        }
    }
}

impl Source for FlvSource {
    fn stream_request(&mut self, host: &str, port: u16) -> Vec<u8> {
        tracing::info!(host, port, content = %self.content, "opening FLV stream");
        let request = Request::http_get(&format!("/{}", self.content))
            .add_header("User-Agent", USER_AGENT)
            .add_header("Accept", "*/*")
            .add_header("Range", "bytes=0-")
            .add_header("Connection", "close")
            .add_header("Host", &format!("{host}:{port}"))
            .add_header("Icy-MetaData", "1");
        self.sink.log(Channel::Http, &request.serialize());
        request.into_bytes()
    }

    fn on_action_reply(&mut self, data: &[u8], closed: bool) -> Result<ReplyProgress> {
        if !closed && !reply_complete(data) {
            return Ok(ReplyProgress::Incomplete);
        }
        if data.is_empty() {
            return Ok(ReplyProgress::Complete);
        }

        let text = String::from_utf8_lossy(data);
        self.sink.log(Channel::Http, &text);
        let reply = Reply::parse(&text)?;
        let body = reply.body.trim();
        if reply.is_success() && !body.is_empty() {
            let json: serde_json::Value = serde_json::from_str(body)?;
            if let Some(position) = json.get("position") {
                let position = match position.as_str() {
                    Some(text) => text.to_string(),
                    None => position.to_string(),
                };
                self.sink.log(Channel::Position, &position);
            }
        }
        Ok(ReplyProgress::Complete)
    }

    fn on_stream(&mut self, data: &[u8], expected_len: usize) -> Result<Feed> {
        self.buffer.extend_from_slice(data);

        if !self.streaming && !self.consume_head()? {
            return Ok(Feed::expect(0));
        }

        let mut expected = expected_len;
        if !self.parser.ready() {
            let Some(end) = self.parser.parse(&self.buffer) else {
                return Ok(Feed::expect(0));
            };
            if let Some(header) = self.parser.header()
                && header.signature != "FLV"
            {
                tracing::warn!(signature = %header.signature, "unexpected FLV signature");
            }
            expected = end;
            self.report_tag(true);
        }

        while self.buffer.len() >= expected + NEXT_TAG_MIN {
            self.buffer.drain(..expected);
            let Some(end) = self.parser.parse(&self.buffer) else {
                break;
            };
            expected = end;
            self.report_tag(false);
        }

        Ok(Feed::expect(expected))
    }

    fn add_action(&mut self, host: &str, _port: u16, action: &Action) -> Result<ActionOutcome> {
        let mut query = format!("/?control={}&action={}", self.control, action.command);
        if let Some(param) = &action.param {
            query.push_str(&format!("&pos={param}"));
        }
        query.push_str("&sec");

        let request =
            Request::http_get(&query).add_header("Host", &format!("{host}:{}", self.control_port));
        self.sink.log(Channel::Http, &request.serialize());
        Ok(ActionOutcome::Control {
            port: self.control_port,
            request: request.into_bytes(),
        })
    }
}

/// Third-from-last path segment when the path ends in `/0/0`.
fn control_id(content: &str) -> &str {
    let segments: Vec<&str> = content.split('/').collect();
    match segments.as_slice() {
        [.., id, "0", "0"] => *id,
        _ => "",
    }
}

/// Whether a control reply can be handled before the peer closes.
fn reply_complete(data: &[u8]) -> bool {
    let Some(head) = response::head_len(data) else {
        return false;
    };
    match response::content_length(&data[..head]) {
        Some(len) => data.len() >= head + len,
        None => serde_json::from_slice::<IgnoredAny>(&data[head..]).is_ok(),
    }
}
