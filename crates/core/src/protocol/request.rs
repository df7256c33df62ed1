use base64::prelude::{BASE64_STANDARD, Engine as _};

/// Client identification string sent in every request.
pub const USER_AGENT: &str = "pyCCTV_front";

pub const RTSP_VERSION: &str = "RTSP/1.0";
pub const HTTP_VERSION: &str = "HTTP/1.0";

/// An outbound RTSP or HTTP request.
///
/// Serializes to the standard text format:
///
/// ```text
/// DESCRIBE rtsp://host:554/stream RTSP/1.0\r\n
/// Accept: application/sdp\r\n
/// CSeq: 2\r\n
/// User-Agent: pyCCTV_front\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then call
/// [`serialize`](Self::serialize). Headers are written in insertion order.
#[must_use]
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub version: &'static str,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: &str, uri: &str, version: &'static str) -> Self {
        Request {
            method: method.to_string(),
            uri: uri.to_string(),
            version,
            headers: Vec::new(),
        }
    }

    /// RTSP/1.0 request (RFC 2326 §6).
    pub fn rtsp(method: &str, uri: &str) -> Self {
        Self::new(method, uri, RTSP_VERSION)
    }

    /// HTTP/1.0 `GET` for an absolute path.
    pub fn http_get(path: &str) -> Self {
        Self::new("GET", path, HTTP_VERSION)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Append an `Authorization` header when credentials are known.
    pub fn with_authorization(self, authorization: Option<&str>) -> Self {
        match authorization {
            Some(value) => self.add_header("Authorization", value),
            None => self,
        }
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the text wire format, terminated by a blank line.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} {}\r\n", self.method, self.uri, self.version);
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        request
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.serialize().into_bytes()
    }
}

/// `Authorization` header value for HTTP Basic authentication (RFC 7617).
///
/// ```
/// use tsinspect::protocol::request::basic_authorization;
///
/// assert_eq!(basic_authorization("admin", "secret"), "Basic YWRtaW46c2VjcmV0");
/// ```
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{}:{}", username, password))
    )
}
