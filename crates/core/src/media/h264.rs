/// NAL unit type of an FU-A fragment (RFC 6184 §5.8).
pub const FU_A: u8 = 28;

/// Well-known H.264 NAL unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    NonIdr,
    Idr,
    Sps,
    Pps,
    FuA,
    Other(u8),
}

impl From<u8> for UnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::NonIdr,
            5 => Self::Idr,
            7 => Self::Sps,
            8 => Self::Pps,
            FU_A => Self::FuA,
            other => Self::Other(other),
        }
    }
}

/// One-byte NAL unit header.
///
/// ```text
/// +---------------+
/// |0|1|2|3|4|5|6|7|
/// +-+-+-+-+-+-+-+-+
/// |F|NRI|  Type   |
/// +---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub forbidden: bool,
    pub nri: u8,
    pub unit_type: u8,
}

impl NalHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            forbidden: byte >> 7 == 1,
            nri: (byte >> 5) & 0x03,
            unit_type: byte & 0x1f,
        }
    }

    pub fn kind(&self) -> UnitType {
        UnitType::from(self.unit_type)
    }
}

/// FU header following the FU indicator of an FU-A packet.
///
/// ```text
/// +---------------+
/// |0|1|2|3|4|5|6|7|
/// +-+-+-+-+-+-+-+-+
/// |S|E|R|  Type   |
/// +---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuHeader {
    pub start: bool,
    pub end: bool,
    pub reserved: bool,
    pub unit_type: u8,
}

impl FuHeader {
    pub fn parse(byte: u8) -> Self {
        Self {
            start: byte >> 7 == 1,
            end: (byte >> 6) & 1 == 1,
            reserved: (byte >> 5) & 1 == 1,
            unit_type: byte & 0x1f,
        }
    }
}

/// Classifies an RTP payload as a complete access unit or a fragment.
///
/// Returns the NAL type of the access unit the payload completes: the
/// payload's own type for single NAL unit packets, the original type for
/// the final FU-A fragment. Start and middle fragments, and payloads too
/// short to carry the headers they announce, yield `None`.
///
/// ```
/// use tsinspect::media::h264::completed_unit;
///
/// assert_eq!(completed_unit(&[0x65, 0x88]), Some(5));
/// assert_eq!(completed_unit(&[0x7c, 0x85]), None); // FU-A start
/// assert_eq!(completed_unit(&[0x7c, 0x45]), Some(5)); // FU-A end
/// ```
pub fn completed_unit(payload: &[u8]) -> Option<u8> {
    let nal = NalHeader::parse(*payload.first()?);
    if nal.kind() != UnitType::FuA {
        return Some(nal.unit_type);
    }
    let fu = FuHeader::parse(*payload.get(1)?);
    fu.end.then_some(fu.unit_type)
}
