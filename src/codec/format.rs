//! Supported container formats

use std::fmt;
use std::path::Path;

use crate::error::AudioError;

/// Container formats the engine can load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Wav,
    Mp3,
}

impl FileFormat {
    /// Resolve the format from the path's extension (case-insensitive).
    ///
    /// Handles both `/` and `\` separators so Windows paths sent by a
    /// front end on another machine resolve the same way.
    pub fn from_path(path: &str) -> Result<Self, AudioError> {
        let ext = extension_of(path);
        match ext.as_str() {
            ".wav" => Ok(Self::Wav),
            ".mp3" => Ok(Self::Mp3),
            _ => Err(AudioError::UnsupportedFormat(ext)),
        }
    }

    /// Extension hint handed to the probe, without the leading dot
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hint())
    }
}

const SEPARATORS: &[char] = &['/', '\\'];

/// Lower-cased extension including the dot, or an empty string
fn extension_of(path: &str) -> String {
    let base = path.rsplit(SEPARATORS).next().unwrap_or(path);
    Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Final path component, used for display
pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATORS).next().unwrap_or(path)
}
