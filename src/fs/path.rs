use crate::fs::error::{PathError, PathResult};
use std::path::{Component, Path, PathBuf};

const MAX_PATH_LENGTH: usize = 4096;
const MAX_FILENAME_LENGTH: usize = 255;

/// Number of segments below the root that carry metadata: artist/album/title.
pub const LIBRARY_DEPTH: usize = 3;

/// Normalize a mount-relative path as handed over by the FUSE layer.
///
/// Rejects `.`/`..` segments so a virtual path can never escape the source
/// directory once joined onto it.
pub fn normalize_path(path: &str) -> PathResult<String> {
    if path.is_empty() {
        return Err(PathError::InvalidPath("Empty path".to_string()));
    }

    if path.contains('\0') {
        return Err(PathError::InvalidPath("Path contains NULL character".to_string()));
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(PathError::PathTooLong(path.len()));
    }

    if !path.starts_with('/') {
        return Err(PathError::InvalidPath("Path must start with /".to_string()));
    }

    if path == "/" {
        return Ok("/".to_string());
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for part in &parts {
        if *part == "." || *part == ".." {
            return Err(PathError::InvalidPath(format!("Relative segment in {}", path)));
        }
        if part.len() > MAX_FILENAME_LENGTH {
            return Err(PathError::FilenameTooLong(part.len()));
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Map a normalized virtual path onto the real file below `root`.
pub fn real_path(root: &Path, virtual_path: &str) -> PathResult<PathBuf> {
    let normalized = normalize_path(virtual_path)?;
    Ok(root.join(normalized.trim_start_matches('/')))
}

/// Split `path` into the segments below `root`, requiring exactly
/// [`LIBRARY_DEPTH`] of them.
pub fn library_segments<'a>(path: &'a Path, root: &Path) -> PathResult<[&'a str; LIBRARY_DEPTH]> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideRoot(path.display().to_string()))?;

    let mut segments = Vec::with_capacity(LIBRARY_DEPTH);
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| PathError::NonUtf8(path.display().to_string()))?;
                segments.push(segment);
            }
            Component::CurDir => {}
            _ => return Err(PathError::InvalidPath(path.display().to_string())),
        }
    }

    let found = segments.len();
    <[&str; LIBRARY_DEPTH]>::try_from(segments)
        .map_err(|_| PathError::SegmentCount { path: path.display().to_string(), found })
}

/// Join a parent virtual path and a child name.
pub fn join_virtual(parent: &str, name: &str) -> String {
    if parent == "/" { format!("/{}", name) } else { format!("{}/{}", parent, name) }
}
