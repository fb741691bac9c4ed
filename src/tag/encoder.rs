//! Synthesizes the tag prepended to every overlay file.
//!
//! Two frame layouts are supported. [`FrameLayout::Compact`] packs each frame
//! as `id | size (7-bit packed) | 0x00 | raw bytes` under a `(3,0)` header.
//! [`FrameLayout::Id3v24`] writes a conformant ID3v2.4 tag that off-the-shelf
//! players read: two flag bytes and a UTF-8 encoding byte per frame, with the
//! year stored in `TDRC`.

use crate::tag::metadata::MetadataRecord;
use crate::tag::{TagError, TagResult, syncsafe};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SIGNATURE: &[u8; 3] = b"ID3";
pub const HEADER_LEN: usize = 10;

const UTF8_ENCODING: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLayout {
    #[default]
    Compact,
    Id3v24,
}

impl FrameLayout {
    fn version(self) -> [u8; 2] {
        match self {
            FrameLayout::Compact => [3, 0],
            FrameLayout::Id3v24 => [4, 0],
        }
    }

    fn year_frame(self) -> &'static str {
        match self {
            FrameLayout::Compact => "TYER",
            FrameLayout::Id3v24 => "TDRC",
        }
    }
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameLayout::Compact => write!(f, "compact"),
            FrameLayout::Id3v24 => write!(f, "id3v24"),
        }
    }
}

impl FromStr for FrameLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(FrameLayout::Compact),
            "id3v24" | "id3v2.4" => Ok(FrameLayout::Id3v24),
            other => Err(format!("Unknown frame layout: {}", other)),
        }
    }
}

/// A tag computed from a path. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticTag {
    bytes: Vec<u8>,
}

impl SyntheticTag {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Never true: even an empty record yields a header.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encode `record` into a tag. Pure: equal inputs give byte-identical output.
pub fn encode(record: &MetadataRecord, layout: FrameLayout) -> TagResult<SyntheticTag> {
    let fields: [(&'static str, Option<&String>); 5] = [
        ("TPE1", record.artist.as_ref()),
        ("TALB", record.album.as_ref()),
        ("TIT2", record.title.as_ref()),
        ("TRCK", record.track.as_ref()),
        (layout.year_frame(), record.year.as_ref()),
    ];

    let mut frames = Vec::new();
    for (id, value) in fields {
        if let Some(value) = value {
            write_frame(&mut frames, id, value.as_bytes(), layout)?;
        }
    }

    let frames_len = checked_size("tag", frames.len())?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + frames.len());
    bytes.extend_from_slice(SIGNATURE);
    bytes.extend_from_slice(&layout.version());
    bytes.push(0);
    bytes.extend_from_slice(&syncsafe::encode(frames_len));
    bytes.extend_from_slice(&frames);

    Ok(SyntheticTag { bytes })
}

fn write_frame(
    out: &mut Vec<u8>,
    id: &'static str,
    value: &[u8],
    layout: FrameLayout,
) -> TagResult<()> {
    out.extend_from_slice(id.as_bytes());
    match layout {
        FrameLayout::Compact => {
            out.extend_from_slice(&syncsafe::encode(checked_size(id, value.len())?));
            out.push(0);
        }
        FrameLayout::Id3v24 => {
            out.extend_from_slice(&syncsafe::encode(checked_size(id, value.len() + 1)?));
            out.extend_from_slice(&[0, 0]);
            out.push(UTF8_ENCODING);
        }
    }
    out.extend_from_slice(value);
    Ok(())
}

fn checked_size(what: &'static str, len: usize) -> TagResult<u32> {
    u32::try_from(len)
        .ok()
        .filter(|size| *size <= syncsafe::MAX_SIZE)
        .ok_or(TagError::Oversized { what, len })
}

/// One frame read back out of a synthesized tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub id: [u8; 4],
    pub value: Vec<u8>,
}

/// Read the frames back out of a tag produced by [`encode`].
///
/// The layout is chosen from the major version byte. Returns `None` when the
/// buffer is not a well-formed synthesized tag.
pub fn decode_frames(bytes: &[u8]) -> Option<Vec<DecodedFrame>> {
    if bytes.len() < HEADER_LEN || &bytes[..3] != SIGNATURE {
        return None;
    }
    let layout = match bytes[3] {
        3 => FrameLayout::Compact,
        4 => FrameLayout::Id3v24,
        _ => return None,
    };
    let size = syncsafe::decode(bytes[6..10].try_into().ok()?) as usize;
    let body = bytes.get(HEADER_LEN..HEADER_LEN + size)?;

    let (flag_len, prefix_len) = match layout {
        FrameLayout::Compact => (1, 0),
        FrameLayout::Id3v24 => (2, 1),
    };

    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let id: [u8; 4] = body.get(pos..pos + 4)?.try_into().ok()?;
        let frame_size = syncsafe::decode(body.get(pos + 4..pos + 8)?.try_into().ok()?) as usize;
        let start = pos + 8 + flag_len;
        let payload = body.get(start..start + frame_size)?;
        frames.push(DecodedFrame { id, value: payload.get(prefix_len..)?.to_vec() });
        pos = start + frame_size;
    }

    Some(frames)
}
