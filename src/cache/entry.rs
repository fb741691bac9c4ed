use crate::tag::{FrameLayout, MetadataRecord, SyntheticTag, TagResult, encode, probe_file};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Everything needed to serve reads of one overlay file.
///
/// Entries are never mutated; a refresh produces a new entry that replaces
/// the old one in the cache, so a reader holding an `Arc<CacheEntry>` always
/// sees a tag and hidden length that belong together.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub metadata: MetadataRecord,
    pub synthetic_tag: SyntheticTag,
    /// Bytes at the head of the real file hidden behind the synthetic tag.
    pub original_tag_len: u64,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        path: PathBuf,
        metadata: MetadataRecord,
        synthetic_tag: SyntheticTag,
        original_tag_len: u64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { path, metadata, synthetic_tag, original_tag_len, updated_at }
    }

    /// Parse, encode and probe `path`.
    pub fn build(path: &Path, root: &Path, layout: FrameLayout) -> TagResult<Self> {
        let metadata = MetadataRecord::from_path(path, root)?;
        Self::synthesize(path.to_path_buf(), metadata, layout)
    }

    /// Re-probe the real file and re-encode the tag for the same path.
    pub fn refreshed(&self, layout: FrameLayout) -> TagResult<Self> {
        Self::synthesize(self.path.clone(), self.metadata.clone(), layout)
    }

    fn synthesize(path: PathBuf, metadata: MetadataRecord, layout: FrameLayout) -> TagResult<Self> {
        // Taken before probing: a write racing the probe leaves the entry stale.
        let updated_at = Utc::now();
        let synthetic_tag = encode(&metadata, layout)?;
        let original_tag_len = probe_file(&path)?;
        Ok(Self { path, metadata, synthetic_tag, original_tag_len, updated_at })
    }

    pub fn is_stale(&self, modified: DateTime<Utc>) -> bool {
        modified > self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::fs;

    #[test]
    fn test_build_parses_encodes_and_probes() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("Artist").join("2004 - Album");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("03 Song.mp3");

        let mut content = b"ID3\x03\x00\x00\x00\x00\x00\x05".to_vec();
        content.extend_from_slice(b"xxxxxAUDIO");
        fs::write(&file, &content).unwrap();

        let entry = CacheEntry::build(&file, root.path(), FrameLayout::Compact).unwrap();
        assert_eq!(entry.metadata.year.as_deref(), Some("2004"));
        assert_eq!(entry.metadata.track.as_deref(), Some("03"));
        assert_eq!(entry.original_tag_len, 15);
        assert_eq!(entry.path, file);
    }

    #[test]
    fn test_build_missing_file_is_io_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("A").join("B").join("C.mp3");
        let err = CacheEntry::build(&file, root.path(), FrameLayout::Compact).unwrap_err();
        assert!(matches!(err, crate::tag::TagError::Io(_)));
    }

    #[test]
    fn test_staleness_is_strict() {
        let entry = CacheEntry::new(
            PathBuf::from("/r/a/b/c.mp3"),
            MetadataRecord::default(),
            encode(&MetadataRecord::default(), FrameLayout::Compact).unwrap(),
            0,
            Utc::now(),
        );
        assert!(!entry.is_stale(entry.updated_at));
        assert!(!entry.is_stale(entry.updated_at - Duration::seconds(5)));
        assert!(entry.is_stale(entry.updated_at + Duration::milliseconds(1)));
    }
}
