//! Axon archive variant of RTSP.
//!
//! The archive start time is part of the request URL
//! (`/{content}/{start}?speed={speed}`) instead of a `Range` negotiation,
//! so `scale` and `seek` rebuild the URL and reopen the primary connection.
//! The initial range comes from a JSON `{start, end}` document served over
//! plain HTTP next to the RTSP port.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

use crate::error::{InspectError, Result};
use crate::protocol::Range;
use crate::protocol::request::{self, Request, USER_AGENT};
use crate::protocol::response::{self, Reply};
use crate::sink::{Channel, LogSink};
use crate::source::rtsp::RtspSource;
use crate::source::{Action, ActionOutcome, Command, Feed, ReplyProgress, Source};
use crate::target::Credentials;

/// RTP clock rate of the archived video.
const CLOCK_RATE: i64 = 90_000;

const CLOCK_FORMAT: &str = "%Y%m%dT%H%M%S";

const HOSTS_SEGMENT: &str = "/hosts/";
const DEPTH_SEGMENT: &str = "/statistics/depth/";

/// Tunables for [`AxonSource`].
#[derive(Debug, Clone)]
pub struct AxonOptions {
    /// Playback speed sent with the first request.
    pub speed: i32,
    /// Port of the HTTP service answering the depth query.
    pub range_port: u16,
    /// Connect and read timeout of the depth query.
    pub lookup_timeout: Duration,
}

impl Default for AxonOptions {
    fn default() -> Self {
        Self {
            speed: 1,
            range_port: 80,
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Depth {
    start: String,
    end: String,
}

/// RTSP source whose start time and speed live in the URL.
pub struct AxonSource {
    generic: RtspSource,
    speed: i32,
}

impl AxonSource {
    /// Query the archive depth and build a source positioned at its start.
    ///
    /// This is a blocking HTTP exchange on its own socket.
    pub fn connect(
        sink: Arc<dyn LogSink>,
        host: &str,
        credentials: Option<Credentials>,
        content: &str,
        options: &AxonOptions,
    ) -> Result<Self> {
        let range = lookup_range(sink.as_ref(), host, credentials.as_ref(), content, options)?;
        let generic = RtspSource::new(sink, credentials, content);
        Ok(Self::with_range(generic, range, options.speed))
    }

    /// Wrap an RTSP source with an already known range.
    pub fn with_range(mut generic: RtspSource, range: Range, speed: i32) -> Self {
        generic.set_suffix(format!("/{}?speed={speed}", range.start));
        generic.set_range(range);
        Self { generic, speed }
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn inner(&self) -> &RtspSource {
        &self.generic
    }

    pub fn range(&self) -> Option<&Range> {
        self.generic.range()
    }

    /// Move the start forward by the media time played so far.
    fn advance_start(&mut self) -> Result<()> {
        let mut range = self.generic.range().cloned().unwrap_or_default();
        let start = parse_clock(&range.start)?;
        let elapsed_ms = self.generic.timestamps().elapsed() * 1000 / CLOCK_RATE;
        range.start = format_clock(start + chrono::Duration::milliseconds(elapsed_ms));
        tracing::debug!(start = %range.start, elapsed_ms, "archive start advanced");
        self.generic.set_range(range);
        Ok(())
    }

    fn reconnect(&mut self) -> ActionOutcome {
        let start = self.range().map(|r| r.start.clone()).unwrap_or_default();
        self.generic
            .set_suffix(format!("/{start}?speed={}", self.speed));
        self.generic.clear();
        ActionOutcome::Reconnect
    }
}

impl Source for AxonSource {
    fn stream_request(&mut self, host: &str, port: u16) -> Vec<u8> {
        self.generic.stream_request(host, port)
    }

    fn on_action_reply(&mut self, data: &[u8], closed: bool) -> Result<ReplyProgress> {
        self.generic.on_action_reply(data, closed)
    }

    fn on_stream(&mut self, data: &[u8], expected_len: usize) -> Result<Feed> {
        self.generic.on_stream(data, expected_len)
    }

    fn add_action(&mut self, _host: &str, _port: u16, action: &Action) -> Result<ActionOutcome> {
        let invalid = || InspectError::InvalidParameter {
            command: action.command.to_string(),
            value: action.param.clone().unwrap_or_default(),
        };
        match action.command {
            Command::Scale => {
                let speed: i32 = action
                    .param
                    .as_deref()
                    .and_then(|p| p.trim().parse().ok())
                    .ok_or_else(invalid)?;
                self.advance_start()?;
                self.speed = speed;
            }
            Command::Seek => {
                let start = action
                    .param
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(invalid)?;
                let mut range = self.generic.range().cloned().unwrap_or_default();
                range.start = start.to_string();
                self.generic.set_range(range);
            }
            _ => {
                tracing::debug!(%action, "action ignored by Axon source");
                return Ok(ActionOutcome::Ignored);
            }
        }
        tracing::info!(%action, speed = self.speed, "reconnecting archive stream");
        Ok(self.reconnect())
    }
}

/// Parse a `YYYYMMDDTHHMMSS[.fff]Z` clock token.
///
/// Fractions longer than milliseconds are truncated.
pub fn parse_clock(token: &str) -> Result<NaiveDateTime> {
    clock_fields(token).ok_or_else(|| InspectError::InvalidTimestamp(token.to_string()))
}

fn clock_fields(token: &str) -> Option<NaiveDateTime> {
    let body = token.strip_suffix('Z')?;
    let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
    if whole.len() != 15 || whole.as_bytes()[8] != b'T' {
        return None;
    }
    let field = |range: std::ops::Range<usize>| -> Option<u32> {
        let digits = whole.get(range)?;
        digits.bytes().all(|b| b.is_ascii_digit()).then(|| digits.parse().ok())?
    };
    let millis = match fraction {
        "" => 0,
        f if f.bytes().all(|b| b.is_ascii_digit()) => {
            let padded: String = f.chars().chain(std::iter::repeat('0')).take(3).collect();
            padded.parse().ok()?
        }
        _ => return None,
    };
    let date = NaiveDate::from_ymd_opt(i32::try_from(field(0..4)?).ok()?, field(4..6)?, field(6..8)?)?;
    date.and_hms_milli_opt(field(9..11)?, field(11..13)?, field(13..15)?, millis)
}

/// Format a clock token, with milliseconds only when they are non-zero.
pub fn format_clock(time: NaiveDateTime) -> String {
    if time.nanosecond() / 1_000_000 == 0 {
        format!("{}Z", time.format(CLOCK_FORMAT))
    } else {
        format!("{}Z", time.format("%Y%m%dT%H%M%S%.3f"))
    }
}

/// Path of the depth document for an Axon content path.
fn depth_path(content: &str) -> String {
    let path = format!("/{content}");
    match path.split_once(HOSTS_SEGMENT) {
        Some((prefix, rest)) => format!("{prefix}{DEPTH_SEGMENT}{rest}"),
        None => format!("{path}{DEPTH_SEGMENT}"),
    }
}

fn lookup_range(
    sink: &dyn LogSink,
    host: &str,
    credentials: Option<&Credentials>,
    content: &str,
    options: &AxonOptions,
) -> Result<Range> {
    let port = options.range_port;
    let path = depth_path(content);
    tracing::info!(host, port, %path, "querying archive depth");

    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| InspectError::RangeLookup(format!("cannot resolve {host}")))?;
    let mut stream = TcpStream::connect_timeout(&addr, options.lookup_timeout)?;
    stream.set_read_timeout(Some(options.lookup_timeout))?;
    stream.set_write_timeout(Some(options.lookup_timeout))?;

    let authorization =
        credentials.map(|c| request::basic_authorization(&c.username, &c.password));
    let request = Request::http_get(&path)
        .add_header("User-Agent", USER_AGENT)
        .add_header("Accept", "*/*")
        .add_header("Host", &format!("{host}:{port}"))
        .with_authorization(authorization.as_deref());
    sink.log(Channel::Http, &request.serialize());
    stream.write_all(request.serialize().as_bytes())?;

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(head) = response::head_len(&buffer)
            && let Some(len) = response::content_length(&buffer[..head])
            && buffer.len() >= head + len
        {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buffer);
    sink.log(Channel::Http, &text);
    let reply = Reply::parse(&text)?;
    if !reply.is_success() {
        return Err(InspectError::RangeLookup(format!(
            "{path} answered with status {}",
            reply.status_code
        )));
    }
    let depth: Depth = serde_json::from_str(reply.body.trim())
        .map_err(|e| InspectError::RangeLookup(format!("{path}: {e}")))?;
    tracing::debug!(start = %depth.start, end = %depth.end, "archive depth");
    Ok(Range::new(&depth.start, &depth.end))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::sink::MemorySink;
    use crate::source::rtsp::tests::{describe_reply, frame};

    fn axon(start: &str) -> (AxonSource, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let generic = RtspSource::new(sink.clone(), None, "SourceEndpoint.video:0:0");
        (
            AxonSource::with_range(generic, Range::new(start, ""), 1),
            sink,
        )
    }

    /// Drive the wrapped source to PLAYING and feed two units 4000 ticks apart.
    fn play_units(source: &mut AxonSource) {
        play_units_at(source, 1000, 5000);
        assert_eq!(source.inner().timestamps().elapsed(), 4000);
    }

    fn play_units_at(source: &mut AxonSource, first: u32, second: u32) {
        source.stream_request("10.0.0.7", 554);
        for reply in [
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: DESCRIBE\r\n\r\n".to_string(),
            describe_reply(2),
            "RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 9\r\n\r\n".to_string(),
            "RTSP/1.0 200 OK\r\nCSeq: 4\r\nSession: 9\r\n\r\n".to_string(),
        ] {
            source.on_stream(reply.as_bytes(), 0).unwrap();
        }
        let mut bytes = frame(0, first, &[0x65]);
        bytes.extend(frame(0, second, &[0x41]));
        bytes.extend_from_slice(b"$\x00\x00\x10");
        source.on_stream(&bytes, 0).unwrap();
    }

    #[test]
    fn start_and_speed_in_url() {
        let (mut source, _sink) = axon("20240101T101500Z");
        let request = String::from_utf8(source.stream_request("10.0.0.7", 554)).unwrap();
        assert!(request.starts_with(
            "OPTIONS rtsp://10.0.0.7:554/SourceEndpoint.video:0:0/20240101T101500Z?speed=1 RTSP/1.0\r\n"
        ));
    }

    #[test]
    fn play_uses_clock_range() {
        let (mut source, _sink) = axon("20240101T101500Z");
        source.stream_request("10.0.0.7", 554);
        source
            .on_stream(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: DESCRIBE\r\n\r\n", 0)
            .unwrap();
        source.on_stream(describe_reply(2).as_bytes(), 0).unwrap();
        let play = source
            .on_stream(b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 9\r\n\r\n", 0)
            .unwrap()
            .outbound
            .unwrap();
        assert!(String::from_utf8(play).unwrap().contains("Range: clock=20240101T101500Z-\r\n"));
    }

    #[test]
    fn scale_moves_start_forward() {
        let (mut source, _sink) = axon("20240101T101500Z");
        play_units(&mut source);

        let outcome = source
            .add_action("10.0.0.7", 554, &Action::with_param(Command::Scale, "4"))
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Reconnect);
        assert_eq!(source.speed(), 4);

        let start = source.range().unwrap().start.clone();
        assert_eq!(start, "20240101T101500.044Z");
        assert!(parse_clock(&start).unwrap() > parse_clock("20240101T101500Z").unwrap());
        assert_eq!(source.inner().state(), crate::session::RtspState::Initial);

        let request = String::from_utf8(source.stream_request("10.0.0.7", 554)).unwrap();
        assert!(request.contains("/20240101T101500.044Z?speed=4 RTSP/1.0\r\n"));
    }

    #[test]
    fn scale_after_timestamp_wrap_moves_forward() {
        let (mut source, _sink) = axon("20240101T101500Z");
        play_units_at(&mut source, u32::MAX - 8999, 81_000);

        source
            .add_action("10.0.0.7", 554, &Action::with_param(Command::Scale, "2"))
            .unwrap();
        assert_eq!(source.range().unwrap().start, "20240101T101501Z");
    }

    #[test]
    fn scale_with_bad_speed() {
        let (mut source, _sink) = axon("20240101T101500Z");
        let err = source
            .add_action("h", 554, &Action::with_param(Command::Scale, "fast"))
            .unwrap_err();
        assert!(matches!(err, InspectError::InvalidParameter { .. }));
        assert_eq!(source.speed(), 1);
    }

    #[test]
    fn scale_with_npt_start() {
        let (mut source, _sink) = axon("0.000");
        let err = source
            .add_action("h", 554, &Action::with_param(Command::Scale, "2"))
            .unwrap_err();
        assert!(matches!(err, InspectError::InvalidTimestamp(_)));
    }

    #[test]
    fn seek_sets_literal_start() {
        let (mut source, _sink) = axon("20240101T101500Z");
        let outcome = source
            .add_action("h", 554, &Action::with_param(Command::Seek, "20240102T000000Z"))
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Reconnect);
        assert_eq!(source.range().unwrap().start, "20240102T000000Z");
    }

    #[test]
    fn other_actions_ignored() {
        let (mut source, _sink) = axon("20240101T101500Z");
        let outcome = source
            .add_action("h", 554, &Action::new(Command::Pause))
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Ignored);
    }

    #[test]
    fn clock_tokens() {
        let t = parse_clock("20240101T101500.250Z").unwrap();
        assert_eq!(format_clock(t), "20240101T101500.250Z");
        let t = parse_clock("20240101T101500Z").unwrap();
        assert_eq!(format_clock(t), "20240101T101500Z");
        assert!(parse_clock("2024-01-01").is_err());
        assert!(parse_clock("20240101T101500").is_err());
        assert!(parse_clock("20241301T101500Z").is_err());
        let t = parse_clock("20240101T101500.5Z").unwrap();
        assert_eq!(format_clock(t), "20240101T101500.500Z");
    }

    #[test]
    fn depth_path_replaces_hosts() {
        assert_eq!(
            depth_path("archive/hosts/SERVER1/DeviceIpint.1/SourceEndpoint.video:0:0"),
            "/archive/statistics/depth/SERVER1/DeviceIpint.1/SourceEndpoint.video:0:0"
        );
        assert_eq!(depth_path("SourceEndpoint.video:0:0"), "/SourceEndpoint.video:0:0/statistics/depth/");
    }

    #[test]
    fn lookup_reads_depth_document() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 512];
            while response::head_len(&request).is_none() {
                let n = stream.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
            }
            let body = r#"{"start": "20240101T000000Z", "end": "20240102T000000Z"}"#;
            let reply = format!(
                "HTTP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            stream.write_all(reply.as_bytes()).unwrap();
            stream.write_all(body.as_bytes()).unwrap();
            String::from_utf8(request).unwrap()
        });

        let sink = Arc::new(MemorySink::new());
        let options = AxonOptions {
            range_port: port,
            ..AxonOptions::default()
        };
        let credentials = Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        let source = AxonSource::connect(
            sink.clone(),
            "127.0.0.1",
            Some(credentials),
            "hosts/SERVER1/SourceEndpoint.video:0:0",
            &options,
        )
        .unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /statistics/depth/SERVER1/SourceEndpoint.video:0:0 HTTP/1.0\r\n"));
        assert!(request.contains("Authorization: Basic YWRtaW46c2VjcmV0\r\n"));
        assert_eq!(source.range().unwrap(), &Range::new("20240101T000000Z", "20240102T000000Z"));
        assert_eq!(sink.entries(Channel::Http).len(), 2);
    }

    #[test]
    fn lookup_rejects_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 512];
            while response::head_len(&request).is_none() {
                let n = stream.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n").unwrap();
        });
        let options = AxonOptions {
            range_port: port,
            ..AxonOptions::default()
        };
        let result = AxonSource::connect(
            Arc::new(MemorySink::new()),
            "127.0.0.1",
            None,
            "SourceEndpoint.video:0:0",
            &options,
        );
        server.join().unwrap();
        assert!(matches!(result, Err(InspectError::RangeLookup(_))));
    }
}
