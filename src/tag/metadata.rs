//! Metadata derived from a file's place in the `<artist>/<album>/<title>` tree.

use crate::fs::library_segments;
use crate::tag::TagResult;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4})(?: - | |-)").expect("valid year pattern"));

static TRACK_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)(?: - | |-)").expect("valid track pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub track: Option<String>,
}

impl MetadataRecord {
    /// Parse `path` (which must live below `root`) into a record.
    pub fn from_path(path: &Path, root: &Path) -> TagResult<Self> {
        let [artist, album, file_name] = library_segments(path, root)?;

        let (year, album) = split_prefix(&YEAR_PREFIX, album);
        let (track, title) = split_prefix(&TRACK_PREFIX, strip_extension(file_name));

        Ok(Self {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            title: Some(title.to_string()),
            year: year.map(str::to_string),
            track: track.map(str::to_string),
        })
    }
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Returns the captured digits and the remainder after digits + separator.
fn split_prefix<'a>(pattern: &Regex, value: &'a str) -> (Option<&'a str>, &'a str) {
    match pattern.captures(value) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            (caps.get(1).map(|m| m.as_str()), &value[whole..])
        }
        None => (None, value),
    }
}
