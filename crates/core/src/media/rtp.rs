/// Preamble byte of an interleaved frame (RFC 2326 §10.12).
pub const INTERLEAVED_MAGIC: u8 = b'$';

/// Length of the `$ channel size` prefix.
pub const INTERLEAVED_HEADER_LEN: usize = 4;

/// Length of the RTP fixed header without CSRC entries.
pub const RTP_HEADER_LEN: usize = 12;

/// Interleaved frame prefix carried on the RTSP TCP connection.
///
/// ```text
/// +---------+---------+-------------------+
/// |   '$'   | channel |  size (16-bit BE) |
/// +---------+---------+-------------------+
/// ```
///
/// `size` counts the RTP packet that follows, not the prefix itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interleaved {
    pub channel: u8,
    pub size: u16,
}

impl Interleaved {
    /// Decode the prefix at the start of `data`.
    ///
    /// Returns `None` when fewer than four bytes are available or the
    /// preamble is not `$`.
    ///
    /// ```
    /// use tsinspect::media::rtp::Interleaved;
    ///
    /// let prefix = Interleaved::parse(&[b'$', 0, 0x01, 0x2c]).unwrap();
    /// assert_eq!(prefix.channel, 0);
    /// assert_eq!(prefix.size, 300);
    /// assert!(Interleaved::parse(&[b'$', 0]).is_none());
    /// ```
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < INTERLEAVED_HEADER_LEN || data[0] != INTERLEAVED_MAGIC {
            return None;
        }
        Some(Self {
            channel: data[1],
            size: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Bytes occupied by the prefix and its packet.
    pub fn frame_len(&self) -> usize {
        INTERLEAVED_HEADER_LEN + self.size as usize
    }
}

/// Decoded RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    pub sequence: u16,
    pub timestamp: u32,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
}

impl RtpHeader {
    /// Decode the 12-byte fixed header at the start of `data`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RTP_HEADER_LEN {
            return None;
        }
        Some(Self {
            version: data[0] >> 6,
            padding: (data[0] >> 5) & 1 == 1,
            extension: (data[0] >> 4) & 1 == 1,
            csrc_count: data[0] & 0x0f,
            marker: data[1] >> 7 == 1,
            pt: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }

    /// Offset of the payload within `packet`, past CSRC entries and any
    /// header extension (RFC 3550 §5.3.1).
    pub fn payload_offset(&self, packet: &[u8]) -> Option<usize> {
        let mut offset = RTP_HEADER_LEN + 4 * self.csrc_count as usize;
        if self.extension {
            let words = packet.get(offset + 2..offset + 4)?;
            offset += 4 + 4 * u16::from_be_bytes([words[0], words[1]]) as usize;
        }
        (offset <= packet.len()).then_some(offset)
    }
}

/// Split an RTP packet into its decoded header and payload.
pub fn split_packet(packet: &[u8]) -> Option<(RtpHeader, &[u8])> {
    let header = RtpHeader::parse(packet)?;
    let offset = header.payload_offset(packet)?;
    Some((header, &packet[offset..]))
}
