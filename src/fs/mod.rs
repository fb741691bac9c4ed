pub mod error;
pub mod path;

pub use error::{PathError, PathResult};
pub use path::{LIBRARY_DEPTH, join_virtual, library_segments, normalize_path, real_path};
