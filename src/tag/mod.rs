//! Tag synthesis: path parsing, encoding and probing of existing tags.

mod encoder;
mod error;
mod metadata;
mod probe;
pub mod syncsafe;

pub use encoder::{DecodedFrame, FrameLayout, HEADER_LEN, SIGNATURE, SyntheticTag, decode_frames, encode};
pub use error::{TagError, TagResult};
pub use metadata::MetadataRecord;
pub use probe::{original_tag_len, probe_file};
