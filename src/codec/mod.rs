//! Audio file decoding
//!
//! Resolves a decoder from the file extension and decodes the whole file
//! into an in-memory [`crate::audio::Track`].

pub mod decoder;
pub mod format;

pub use decoder::decode_file;
pub use format::FileFormat;
