use thiserror::Error;

pub type PathResult<T> = Result<T, PathError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path too long: {0} bytes (max 4096)")]
    PathTooLong(usize),

    #[error("Filename too long: {0} bytes (max 255)")]
    FilenameTooLong(usize),

    #[error("Path is outside the library root: {0}")]
    OutsideRoot(String),

    #[error("Expected <artist>/<album>/<title> below the library root, found {found} segment(s): {path}")]
    SegmentCount { path: String, found: usize },

    #[error("Path segment is not valid UTF-8: {0}")]
    NonUtf8(String),
}
