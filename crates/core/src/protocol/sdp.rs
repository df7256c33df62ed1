//! SDP (Session Description Protocol) extraction (RFC 4566 / RFC 8866).
//!
//! Only the attributes needed to drive SETUP and PLAY are read:
//!
//! ```text
//! a=range:npt=0-                  ← session range (§6)
//! m=video 0 RTP/AVP 96
//! a=control:trackID=1             ← track control URL for SETUP
//! ```
//!
//! The aggregate control `a=control:*` is skipped; it names the session
//! itself, not a track.

use super::range::Range;

const CONTROL: &str = "a=control:";
const RANGE: &str = "a=range:";

/// The parts of a DESCRIBE body the client acts on.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionDescription {
    /// Per-media control paths in order of appearance.
    pub controls: Vec<String>,
    pub range: Option<Range>,
}

/// Extract control paths and the first range attribute from an SDP body.
pub fn parse(body: &str) -> SessionDescription {
    let mut description = SessionDescription::default();

    for line in body.lines().map(str::trim) {
        if let Some(control) = line.strip_prefix(CONTROL) {
            if !control.contains('*') {
                description.controls.push(control.to_string());
            }
        } else if let Some(range) = line.strip_prefix(RANGE)
            && description.range.is_none()
        {
            description.range = Range::parse(range);
        }
    }

    tracing::debug!(
        controls = description.controls.len(),
        range = ?description.range,
        "SDP parsed"
    );

    description
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "v=0\r\n\
                        o=- 0 0 IN IP4 10.0.0.5\r\n\
                        s=Stream\r\n\
                        a=control:*\r\n\
                        a=range:npt=0-\r\n\
                        m=video 0 RTP/AVP 96\r\n\
                        a=rtpmap:96 H264/90000\r\n\
                        a=control:trackID=1\r\n\
                        m=audio 0 RTP/AVP 8\r\n\
                        a=control:trackID=2\r\n";

    #[test]
    fn controls_skip_aggregate() {
        let sdp = parse(BODY);
        assert_eq!(sdp.controls, vec!["trackID=1", "trackID=2"]);
    }

    #[test]
    fn range_is_extracted() {
        let sdp = parse(BODY);
        assert_eq!(sdp.range, Some(Range::new("0", "")));
    }

    #[test]
    fn absolute_control_kept_whole() {
        let sdp = parse("a=control:rtsp://10.0.0.5:554/stream1/track1\r\n");
        assert_eq!(sdp.controls, vec!["rtsp://10.0.0.5:554/stream1/track1"]);
        assert!(sdp.range.is_none());
    }
}
