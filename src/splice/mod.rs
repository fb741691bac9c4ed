//! Read splicing between the synthetic tag and the real audio payload.
//!
//! Virtual layout of an overlay file:
//!
//! ```text
//! [0, L)            synthetic tag
//! [L, L + P)        real payload, i.e. real bytes [O, O + P)
//! ```
//!
//! where `L` is the synthetic tag length, `O` the length of the tag hidden at
//! the head of the real file and `P` the remaining real bytes.

use crate::cache::CacheEntry;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Positional access to the real file backing an overlay file.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait PayloadSource {
    /// Read up to `size` bytes at real offset `offset`. Fewer bytes are
    /// returned only at end of file.
    fn read_real(&self, offset: u64, size: usize) -> io::Result<Vec<u8>>;
}

impl PayloadSource for File {
    fn read_real(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

/// Serve `size` bytes at virtual `offset` of the overlay file for `entry`.
pub fn splice_read<S: PayloadSource + ?Sized>(
    entry: &CacheEntry,
    offset: u64,
    size: u32,
    real: &S,
) -> io::Result<Vec<u8>> {
    let tag = entry.synthetic_tag.bytes();
    let tag_len = entry.synthetic_tag.len();
    let hidden = entry.original_tag_len;
    let size = size as usize;

    if offset < tag_len {
        let start = offset as usize;
        let available = tag.len() - start;
        if size <= available {
            return Ok(tag[start..start + size].to_vec());
        }

        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&tag[start..]);
        let rest = real.read_real(hidden, size - available)?;
        tracing::trace!(
            path = %entry.path.display(),
            offset,
            real_offset = hidden,
            tag_bytes = available,
            real_bytes = rest.len(),
            "Spliced read across tag boundary"
        );
        out.extend_from_slice(&rest);
        return Ok(out);
    }

    let real_offset = offset - tag_len + hidden;
    tracing::trace!(path = %entry.path.display(), offset, real_offset, size, "Translated read");
    real.read_real(real_offset, size)
}

/// Apparent length of an overlay file whose real file is `real_size` bytes.
pub fn virtual_size(real_size: u64, entry: &CacheEntry) -> u64 {
    real_size.saturating_sub(entry.original_tag_len) + entry.synthetic_tag.len()
}
