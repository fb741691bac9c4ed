//! Measures the tag already stored at the head of a real file, so the overlay
//! can hide it.

use crate::tag::encoder::{HEADER_LEN, SIGNATURE};
use crate::tag::syncsafe;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const FOOTER_FLAG: u8 = 0x10;
const FOOTER_LEN: u64 = 10;

/// Number of bytes at the head of `reader` occupied by an existing tag:
/// header, payload and (when flagged) footer. Zero when there is no
/// well-formed header.
pub fn original_tag_len<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) => return Ok(0),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    if &header[..3] != SIGNATURE {
        return Ok(0);
    }

    let flags = header[5];
    let payload = u64::from(syncsafe::decode([header[6], header[7], header[8], header[9]]));
    let footer = if flags & FOOTER_FLAG != 0 { FOOTER_LEN } else { 0 };

    Ok(HEADER_LEN as u64 + payload + footer)
}

pub fn probe_file(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    original_tag_len(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(version: u8, flags: u8, size: u32) -> Vec<u8> {
        let mut bytes = b"ID3".to_vec();
        bytes.extend_from_slice(&[version, 0, flags]);
        bytes.extend_from_slice(&syncsafe::encode(size));
        bytes
    }

    #[test]
    fn test_no_signature() {
        let mut reader = Cursor::new(b"\xFF\xFB\x90\x64 mpeg frame data".to_vec());
        assert_eq!(original_tag_len(&mut reader).unwrap(), 0);
    }

    #[test]
    fn test_short_file() {
        assert_eq!(original_tag_len(&mut Cursor::new(b"ID3".to_vec())).unwrap(), 0);
        assert_eq!(original_tag_len(&mut Cursor::new(Vec::new())).unwrap(), 0);
    }

    #[test]
    fn test_existing_tag_extent() {
        let mut bytes = header(3, 0, 300);
        bytes.extend(std::iter::repeat_n(0u8, 300));
        assert_eq!(original_tag_len(&mut Cursor::new(bytes)).unwrap(), 310);
    }

    #[test]
    fn test_footer_flag_adds_footer() {
        let bytes = header(4, FOOTER_FLAG, 100);
        assert_eq!(original_tag_len(&mut Cursor::new(bytes)).unwrap(), 120);
    }

    #[test]
    fn test_probe_missing_file_is_error() {
        let err = probe_file(Path::new("/nonexistent/autotagfs/probe.mp3")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
