//! Playback error taxonomy.
//!
//! Every variant is scoped to a single `play` call; the playlist sequencer
//! logs and advances, so none of these are fatal to the process.

use thiserror::Error;

use crate::track::AudioFormat;

/// Errors produced by the playback pipeline.
#[derive(Debug, Error)]
pub enum PlayError {
    /// The track failed the format gate before any I/O was attempted.
    #[error("format not supported: {0}")]
    UnsupportedFormat(AudioFormat),

    /// The source could not be opened, probed, or decoded.
    #[error("decoding audio stream: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// The output device could not be initialized for this session.
    #[error("initialising output device: {0}")]
    OutputInit(String),

    /// A device write failed. The engine loop logs these and keeps going.
    #[error("writing to output device: {0}")]
    DeviceWrite(String),

    /// Tag metadata could not be read. Always recovered with a fallback tag.
    #[error("reading tags: {0}")]
    TagRead(String),
}
