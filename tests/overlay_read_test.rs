// Integration tests for the overlay backend against a real directory tree
//
// These drive OverlayBackend through FilesystemInterface exactly as the FUSE
// adapter does, without mounting anything.

use autotagfs::config::{CacheConfig, TagConfig};
use autotagfs::fuse::{FileType, FilesystemInterface, FsError, OverlayBackend};
use autotagfs::tag::{FrameLayout, MetadataRecord, decode_frames, encode};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TRACK: &str = "/Radiohead/1997 - OK Computer/02 - Paranoid Android.mp3";
const PAYLOAD: &[u8] = b"AUDIO-FRAMES-0123456789";

/// Existing v2.3 tag with a 5 byte body: 15 bytes hidden in total.
fn existing_tag() -> Vec<u8> {
    let mut tag = b"ID3\x03\x00\x00\x00\x00\x00\x05".to_vec();
    tag.extend_from_slice(b"OLDTG");
    tag
}

struct Library {
    _dir: TempDir,
    root: PathBuf,
}

impl Library {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    fn add(&self, virtual_path: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(virtual_path.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn backend(&self, layout: FrameLayout) -> OverlayBackend {
        OverlayBackend::new(&self.root, &CacheConfig::default(), TagConfig {
            layout,
            ..Default::default()
        })
    }
}

fn expected_tag(layout: FrameLayout) -> Vec<u8> {
    let record = MetadataRecord {
        artist: Some("Radiohead".to_string()),
        album: Some("OK Computer".to_string()),
        title: Some("Paranoid Android".to_string()),
        year: Some("1997".to_string()),
        track: Some("02".to_string()),
    };
    encode(&record, layout).unwrap().bytes().to_vec()
}

fn tagged_library() -> Library {
    let library = Library::new();
    let mut content = existing_tag();
    content.extend_from_slice(PAYLOAD);
    library.add(TRACK, &content);
    library
}

async fn read_all(backend: &OverlayBackend, path: &str, size: u32) -> Vec<u8> {
    let fh = backend.open(path, libc::O_RDONLY).await.unwrap();
    let data = backend.read(path, fh, 0, size).await.unwrap();
    backend.release(fh).await.unwrap();
    data
}

#[tokio::test]
async fn test_get_attr_reports_virtual_size() {
    let library = tagged_library();
    let backend = library.backend(FrameLayout::Compact);
    let tag = expected_tag(FrameLayout::Compact);

    let attr = backend.get_attr(TRACK).await.unwrap();
    assert_eq!(attr.kind, FileType::RegularFile);
    assert_eq!(attr.size, PAYLOAD.len() as u64 + tag.len() as u64);
}

#[tokio::test]
async fn test_full_read_is_tag_then_payload() {
    let library = tagged_library();
    let backend = library.backend(FrameLayout::Compact);
    let tag = expected_tag(FrameLayout::Compact);

    let data = read_all(&backend, TRACK, 4096).await;

    let mut expected = tag.clone();
    expected.extend_from_slice(PAYLOAD);
    assert_eq!(data, expected);
    assert!(!data.windows(5).any(|w| w == b"OLDTG"));
}

#[tokio::test]
async fn test_reads_at_tag_boundaries() {
    let library = tagged_library();
    let backend = library.backend(FrameLayout::Compact);
    let tag = expected_tag(FrameLayout::Compact);
    let tag_len = tag.len() as u64;
    let fh = backend.open(TRACK, libc::O_RDONLY).await.unwrap();

    // inside the tag
    let data = backend.read(TRACK, fh, 0, 10).await.unwrap();
    assert_eq!(data, &tag[..10]);

    // last tag byte plus first payload bytes
    let data = backend.read(TRACK, fh, tag_len - 1, 4).await.unwrap();
    assert_eq!(data[0], tag[tag.len() - 1]);
    assert_eq!(&data[1..], &PAYLOAD[..3]);

    // payload only
    let data = backend.read(TRACK, fh, tag_len + 6, 6).await.unwrap();
    assert_eq!(data, &PAYLOAD[6..12]);

    // past the end
    let data = backend.read(TRACK, fh, tag_len + PAYLOAD.len() as u64 + 10, 8).await.unwrap();
    assert!(data.is_empty());

    backend.release(fh).await.unwrap();
}

#[tokio::test]
async fn test_id3v24_layout_frames() {
    let library = tagged_library();
    let backend = library.backend(FrameLayout::Id3v24);
    let tag_len = expected_tag(FrameLayout::Id3v24).len();

    let data = read_all(&backend, TRACK, 4096).await;
    let frames = decode_frames(&data[..tag_len]).unwrap();
    let ids: Vec<_> = frames.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![*b"TPE1", *b"TALB", *b"TIT2", *b"TRCK", *b"TDRC"]);
    assert_eq!(frames[2].value, b"Paranoid Android");
    assert_eq!(&data[tag_len..], PAYLOAD);
}

#[tokio::test]
async fn test_untagged_extension_passes_through() {
    let library = Library::new();
    library.add("/Radiohead/1997 - OK Computer/cover.jpg", b"JPEGDATA");
    let backend = library.backend(FrameLayout::Compact);

    let path = "/Radiohead/1997 - OK Computer/cover.jpg";
    assert_eq!(backend.get_attr(path).await.unwrap().size, 8);
    assert_eq!(read_all(&backend, path, 100).await, b"JPEGDATA");
}

#[tokio::test]
async fn test_file_without_existing_tag() {
    let library = Library::new();
    library.add("/Artist/Album/Song.mp3", PAYLOAD);
    let backend = library.backend(FrameLayout::Compact);

    let data = read_all(&backend, "/Artist/Album/Song.mp3", 4096).await;
    let frames = decode_frames(&data).unwrap();
    assert_eq!(frames.len(), 3);
    assert!(data.ends_with(PAYLOAD));
}

#[tokio::test]
async fn test_wrong_depth_is_invalid() {
    let library = Library::new();
    library.add("/stray.mp3", PAYLOAD);
    library.add("/Artist/Album/Disc 1/Song.mp3", PAYLOAD);
    let backend = library.backend(FrameLayout::Compact);

    for path in ["/stray.mp3", "/Artist/Album/Disc 1/Song.mp3"] {
        let err = backend.get_attr(path).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)), "{path}: {err:?}");
        assert_eq!(err.to_errno(), libc::EINVAL);

        let fh = backend.open(path, libc::O_RDONLY).await.unwrap();
        let err = backend.read(path, fh, 0, 16).await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
        backend.release(fh).await.unwrap();
    }
}

#[tokio::test]
async fn test_directories_and_listing() {
    let library = tagged_library();
    library.add("/Radiohead/1997 - OK Computer/cover.jpg", b"JPEG");
    let backend = library.backend(FrameLayout::Compact);

    let attr = backend.get_attr("/Radiohead").await.unwrap();
    assert_eq!(attr.kind, FileType::Directory);

    let mut names: Vec<_> = backend
        .read_dir("/Radiohead/1997 - OK Computer")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["02 - Paranoid Android.mp3", "cover.jpg"]);
}

#[tokio::test]
async fn test_symlinked_track_is_followed() {
    let library = Library::new();
    let target = library.add("/Elsewhere/raw/data.bin", PAYLOAD);
    let link_dir = library.root.join("Artist").join("Album");
    fs::create_dir_all(&link_dir).unwrap();
    std::os::unix::fs::symlink(&target, link_dir.join("Linked.mp3")).unwrap();
    let backend = library.backend(FrameLayout::Compact);

    let attr = backend.get_attr("/Artist/Album/Linked.mp3").await.unwrap();
    assert_eq!(attr.kind, FileType::RegularFile);
    let data = read_all(&backend, "/Artist/Album/Linked.mp3", 4096).await;
    assert!(data.starts_with(b"ID3"));
    assert!(data.ends_with(PAYLOAD));
}

#[tokio::test]
async fn test_modified_file_is_reprobed() {
    let library = Library::new();
    let path = library.add("/Artist/Album/Song.mp3", PAYLOAD);
    let backend = library.backend(FrameLayout::Compact);
    let virtual_path = "/Artist/Album/Song.mp3";

    let before = backend.get_attr(virtual_path).await.unwrap().size;

    let mut content = existing_tag();
    content.extend_from_slice(PAYLOAD);
    fs::write(&path, &content).unwrap();
    set_future_mtime(&path);

    let after = backend.get_attr(virtual_path).await.unwrap().size;
    assert_eq!(before, after);
    assert_eq!(backend.cache_stats().unwrap().refreshes, 1);
    assert!(!read_all(&backend, virtual_path, 4096).await.windows(5).any(|w| w == b"OLDTG"));
}

#[tokio::test]
async fn test_writes_are_rejected() {
    let library = tagged_library();
    let backend = library.backend(FrameLayout::Compact);

    let err = backend.open(TRACK, libc::O_WRONLY).await.unwrap_err();
    assert_eq!(err.to_errno(), libc::EROFS);
    let err = backend.access(TRACK, libc::W_OK).await.unwrap_err();
    assert_eq!(err.to_errno(), libc::EROFS);
    backend.access(TRACK, libc::R_OK).await.unwrap();
}

#[tokio::test]
async fn test_missing_entry_is_enoent() {
    let library = Library::new();
    let backend = library.backend(FrameLayout::Compact);
    let err = backend.get_attr("/Nobody/Nothing/None.mp3").await.unwrap_err();
    assert_eq!(err.to_errno(), libc::ENOENT);
}

#[tokio::test]
async fn test_statfs_reports_source_filesystem() {
    let library = Library::new();
    let backend = library.backend(FrameLayout::Compact);
    let stats = backend.statfs().await.unwrap();
    assert!(stats.bsize > 0);
    assert!(stats.namelen > 0);
}

fn set_future_mtime(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(60)).unwrap();
}
