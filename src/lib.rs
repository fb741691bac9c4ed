//! Read-only FUSE overlay that presents a `<artist>/<album>/<title>.<ext>`
//! music library with ID3 tags synthesized from each file's path.
//!
//! Existing tags at the head of a file are hidden behind the synthetic one;
//! the audio payload after them is served untouched.

pub mod cache;
pub mod config;
pub mod fs;
pub mod fuse;
pub mod splice;
pub mod tag;
