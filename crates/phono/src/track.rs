//! Track and tag types shared by the playlist and the engine.

use std::fmt;
use std::path::{Path, PathBuf};

/// Audio container formats recognized by the player.
///
/// Only [`AudioFormat::Mp3`] is decodable; the rest exist so the format gate
/// can fail fast with a useful name before any I/O happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Unknown,
}

impl AudioFormat {
    /// Classify a path by its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("wav") => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Artist/title metadata for a track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackTag {
    pub artist: String,
    pub title: String,
}

/// One playlist entry.
///
/// Immutable once enqueued, except for `tag`, which the sequencer populates
/// lazily right before the track plays.
#[derive(Clone, Debug)]
pub struct Track {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub tag: Option<TrackTag>,
}

impl Track {
    /// Build a track from a path, classifying the format by extension.
    pub fn new(path: PathBuf) -> Self {
        let format = AudioFormat::from_path(&path);
        Self {
            path,
            format,
            tag: None,
        }
    }
}
