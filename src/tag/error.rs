use crate::fs::PathError;
use thiserror::Error;

pub type TagResult<T> = Result<T, TagError>;

#[derive(Error, Debug)]
pub enum TagError {
    #[error(transparent)]
    PathFormat(#[from] PathError),

    #[error("{what} is {len} bytes, exceeds the 28-bit size field")]
    Oversized { what: &'static str, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
