//! phono — desktop audio player core.
//!
//! Decodes MP3 files, streams s16le PCM to an output device in real time,
//! and publishes sample snapshots for visualization.
//!
//! ## Pipeline
//! 1. **Decode**: Symphonia pulls stereo `f64` frames from the source on
//!    demand (`decode`).
//! 2. **Quantize**: frames are clamped and converted to interleaved s16le
//!    bytes in pre-sized buffers (`quantize`).
//! 3. **Output**: bytes are written to a bounded queue drained by the CPAL
//!    callback (`sink`, `device`).
//!
//! The engine (`engine::Player`) runs the loop synchronously inside `play`
//! and answers transport controls over rendezvous channels; the sequencer
//! (`playlist::Playlist`) drives it one track at a time from its own thread.

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod playlist;
pub mod quantize;
pub mod sink;
pub mod tags;
pub mod track;
