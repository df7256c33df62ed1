use std::fmt;

/// Size of the 4-byte previous-tag-size field that precedes every tag.
pub const PREVIOUS_TAG_SIZE_LEN: usize = 4;

/// Size of a tag header (type, size, timestamp, stream id).
pub const TAG_HEADER_LEN: usize = 11;

/// Bytes needed past the end of one tag before the next tag header can
/// be decoded.
pub const NEXT_TAG_MIN: usize = PREVIOUS_TAG_SIZE_LEN + TAG_HEADER_LEN;

const FILE_HEADER_LEN: usize = 9;

/// FLV file header.
///
/// ```text
/// 'F' 'L' 'V' | version | flags (.....A.V) | data offset (32-bit BE)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvHeader {
    pub signature: String,
    pub version: u8,
    pub audio: bool,
    pub video: bool,
    pub data_offset: u32,
}

impl FlvHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FILE_HEADER_LEN {
            return None;
        }
        Some(Self {
            signature: String::from_utf8_lossy(&data[..3]).into_owned(),
            version: data[3],
            audio: (data[4] >> 2) & 1 == 1,
            video: data[4] & 1 == 1,
            data_offset: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
        })
    }
}

impl fmt::Display for FlvHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlvHeader(signature={}, version={}, audio={}, video={}, offset={})",
            self.signature, self.version, self.audio, self.video, self.data_offset
        )
    }
}

/// FLV tag header.
///
/// The timestamp is stored on the wire as a 24-bit value followed by an
/// 8-bit extension holding the upper byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvTag {
    pub tag_type: u8,
    pub size: u32,
    pub timestamp: u32,
    pub stream_id: u32,
}

impl FlvTag {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < TAG_HEADER_LEN {
            return None;
        }
        let be24 = |b: &[u8]| u32::from_be_bytes([0, b[0], b[1], b[2]]);
        Some(Self {
            tag_type: data[0],
            size: be24(&data[1..4]),
            timestamp: (u32::from(data[7]) << 24) | be24(&data[4..7]),
            stream_id: be24(&data[8..11]),
        })
    }
}

/// Incremental FLV parser.
///
/// The first [`parse`](Self::parse) call consumes the file header;
/// subsequent calls expect the buffer to start at a previous-tag-size
/// field. Every call returns the offset just past the tag's payload,
/// which is where the next previous-tag-size field begins.
#[derive(Debug, Default)]
pub struct FlvParser {
    header: Option<FlvHeader>,
    previous_tag_size: u32,
    tag: Option<FlvTag>,
}

impl FlvParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the file header has been decoded.
    pub fn ready(&self) -> bool {
        self.header.is_some()
    }

    pub fn header(&self) -> Option<&FlvHeader> {
        self.header.as_ref()
    }

    pub fn tag(&self) -> Option<&FlvTag> {
        self.tag.as_ref()
    }

    pub fn previous_tag_size(&self) -> u32 {
        self.previous_tag_size
    }

    /// Decode the next tag header from `data`.
    ///
    /// Returns `None` without changing state when `data` is too short for
    /// the headers it must contain; the caller retries with more bytes.
    pub fn parse(&mut self, data: &[u8]) -> Option<usize> {
        let (header, offset) = match &self.header {
            Some(_) => (None, 0),
            None => {
                let header = FlvHeader::parse(data)?;
                let offset = header.data_offset as usize;
                (Some(header), offset)
            }
        };

        let fields = data.get(offset..offset + NEXT_TAG_MIN)?;
        let previous_tag_size = u32::from_be_bytes([fields[0], fields[1], fields[2], fields[3]]);
        let tag = FlvTag::parse(&fields[PREVIOUS_TAG_SIZE_LEN..])?;

        if let Some(header) = header {
            tracing::debug!(%header, "FLV header parsed");
            self.header = Some(header);
        }
        self.previous_tag_size = previous_tag_size;
        self.tag = Some(tag);

        tracing::trace!(
            tag_type = tag.tag_type,
            size = tag.size,
            ts = tag.timestamp,
            "FLV tag parsed"
        );

        Some(offset + NEXT_TAG_MIN + tag.size as usize)
    }
}
