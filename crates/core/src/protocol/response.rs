use crate::error::{InspectError, ParseErrorKind};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed RTSP or HTTP reply (RFC 2326 §7, RFC 1945 §6).
///
/// ```text
/// Version SP Status-Code SP Reason-Phrase CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug)]
pub struct Reply {
    /// Protocol version (`RTSP/1.0`, `HTTP/1.0`, `HTTP/1.1`).
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    /// Headers as ordered (name, value) pairs, names stored as received.
    pub headers: Vec<(String, String)>,
    /// Everything after the blank line.
    pub body: String,
}

impl Reply {
    /// Parse a reply from its text representation.
    ///
    /// The body is whatever follows the first blank line; use
    /// [`message_len`] to make sure it is complete.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 4..]),
            None => (raw, ""),
        };
        let mut lines = head.lines();

        let status_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or(InspectError::Parse {
                kind: ParseErrorKind::EmptyMessage,
            })?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default().to_string();
        let status_code = parts
            .next()
            .and_then(|code| code.trim().parse::<u16>().ok())
            .ok_or(InspectError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            })?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        if !version.starts_with("RTSP/") && !version.starts_with("HTTP/") {
            return Err(InspectError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                tracing::warn!(line, "skipping reply line without a header name");
                continue;
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Reply {
            version,
            status_code,
            reason,
            headers,
            body: body.to_string(),
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Position just past the `\r\n\r\n` that ends the head, if present.
pub fn head_len(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Length of the complete message at the start of `buf`.
///
/// A message is complete once its head and `Content-Length` body bytes are
/// buffered. Returns `None` while more bytes are needed.
///
/// ```
/// use tsinspect::protocol::response::message_len;
///
/// let reply = b"RTSP/1.0 200 OK\r\nContent-Length: 3\r\n\r\nv=0";
/// assert_eq!(message_len(reply), Some(reply.len()));
/// assert_eq!(message_len(&reply[..reply.len() - 1]), None);
/// ```
pub fn message_len(buf: &[u8]) -> Option<usize> {
    let head = head_len(buf)?;
    let total = head + content_length(&buf[..head]).unwrap_or(0);
    (buf.len() >= total).then_some(total)
}

/// Value of the `Content-Length` header found in a raw head, if any.
pub fn content_length(head: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_reply() {
        let raw = "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, SETUP, PLAY\r\n\r\n";
        let reply = Reply::parse(raw).unwrap();
        assert_eq!(reply.version, "RTSP/1.0");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.reason, "OK");
        assert_eq!(reply.get_header("cseq"), Some("1"));
        assert_eq!(reply.headers.len(), 2);
        assert!(reply.body.is_empty());
    }

    #[test]
    fn parse_http_reply_with_body() {
        let raw = "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"position\":12}";
        let reply = Reply::parse(raw).unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.body, "{\"position\":12}");
    }

    #[test]
    fn parse_unauthorized_reason_with_spaces() {
        let reply = Reply::parse("RTSP/1.0 401 Unauthorized Access\r\n\r\n").unwrap();
        assert_eq!(reply.status_code, 401);
        assert_eq!(reply.reason, "Unauthorized Access");
    }

    #[test]
    fn parse_empty_reply() {
        assert!(Reply::parse("").is_err());
    }

    #[test]
    fn parse_invalid_status_line() {
        assert!(Reply::parse("RTSP/1.0 OK\r\n\r\n").is_err());
        assert!(Reply::parse("GARBAGE 200 OK\r\n\r\n").is_err());
    }

    #[test]
    fn line_without_colon_is_skipped() {
        let reply = Reply::parse("RTSP/1.0 200 OK\r\nCSeq 1\r\nSession: 7\r\n\r\n").unwrap();
        assert_eq!(reply.headers, vec![("Session".to_string(), "7".to_string())]);
        assert!(reply.get_header("CSeq").is_none());
    }

    #[test]
    fn message_without_body() {
        let raw = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n$\x00";
        assert_eq!(message_len(raw), Some(raw.len() - 2));
    }

    #[test]
    fn incomplete_head() {
        assert_eq!(message_len(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n"), None);
    }
}
