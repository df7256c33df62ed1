/// Interleaved channel pair negotiated during SETUP (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
///
/// Server → Client:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=1A2B3C4D
/// ```
///
/// RTP arrives on the first channel, RTCP on the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    pub rtp_channel: u8,
    pub rtcp_channel: u8,
}

/// Transport requested by the client in SETUP.
pub const INTERLEAVED_TRANSPORT: &str = "RTP/AVP/TCP;unicast;interleaved=0-1";

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// Looks for `interleaved=RTP-RTCP` among semicolon-separated parameters.
    /// A single channel implies RTCP on the next one.
    ///
    /// ## Examples
    ///
    /// ```
    /// use tsinspect::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(th.rtp_channel, 2);
    /// assert_eq!(th.rtcp_channel, 3);
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(channels) = part.strip_prefix("interleaved=") {
                let (rtp, rtcp) = match channels.split_once('-') {
                    Some((rtp, rtcp)) => {
                        let rtp: u8 = rtp.parse().ok()?;
                        (rtp, rtcp.parse().ok()?)
                    }
                    None => {
                        let rtp: u8 = channels.parse().ok()?;
                        (rtp, rtp.wrapping_add(1))
                    }
                };

                return Some(TransportHeader {
                    rtp_channel: rtp,
                    rtcp_channel: rtcp,
                });
            }
        }
        None
    }
}

impl Default for TransportHeader {
    fn default() -> Self {
        Self {
            rtp_channel: 0,
            rtcp_channel: 1,
        }
    }
}
