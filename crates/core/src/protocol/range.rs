use std::fmt;

/// Playback range used in the `Range` header of `PLAY` (RFC 2326 §12.29).
///
/// Start and end are kept as the source's own tokens: NPT seconds
/// (`0.000`, `now`) or absolute clock times (`20240101T101500Z`). An
/// empty end means "open-ended".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: String,
    pub end: String,
}

impl Range {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Parse a range value such as `npt=0-` or `clock=A-B`, dropping the unit.
    ///
    /// ```
    /// use tsinspect::protocol::range::Range;
    ///
    /// let r = Range::parse("npt=0-12.5").unwrap();
    /// assert_eq!(r.start, "0");
    /// assert_eq!(r.end, "12.5");
    /// assert!(Range::parse("npt").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let (_, bounds) = value.split_once('=')?;
        let (start, end) = bounds.split_once('-').unwrap_or((bounds, ""));
        Some(Self::new(start.trim(), end.trim()))
    }

    /// Whether the bounds are wall-clock timestamps rather than NPT.
    pub fn is_clock(&self) -> bool {
        self.start.contains('T')
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        let unit = if self.is_clock() { "clock" } else { "npt" };
        format!("{}={}-{}", unit, self.start, self.end)
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new("0.000", "")
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
