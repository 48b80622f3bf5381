//! MP3 decoder adapter.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode packets into stereo `f64` frames on demand
//!
//! Only MP3 passes the format gate; everything else fails fast with
//! [`PlayError::UnsupportedFormat`] before any I/O is attempted. The source
//! file handle is owned by the returned [`Mp3Frames`] and released on drop,
//! on every exit path.

use std::fs::File;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PlayError;
use crate::track::{AudioFormat, Track};

/// A pull-based source of stereo frames.
///
/// The sequence is lazy, finite, and non-restartable.
pub trait FrameSource {
    /// Fill `out` with up to `out.len()` frames and return the count written.
    ///
    /// Returns 0 exactly when the stream has ended.
    fn read_frames(&mut self, out: &mut [[f64; 2]]) -> usize;
}

/// Open a track for decoding, returning the frame source and its sample rate.
pub fn open(track: &Track) -> Result<(Mp3Frames, u32), PlayError> {
    if track.format != AudioFormat::Mp3 {
        return Err(PlayError::UnsupportedFormat(track.format));
    }

    let file = File::open(&track.path).map_err(SymphoniaError::IoError)?;
    let mut hint = Hint::new();
    hint.with_extension("mp3");
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let reader = probed.format;

    let (codec_params, rate) = {
        let audio_track = reader
            .default_track()
            .ok_or(SymphoniaError::DecodeError("no default audio track"))?;
        let rate = audio_track
            .codec_params
            .sample_rate
            .ok_or(SymphoniaError::DecodeError("unknown sample rate"))?;
        if audio_track.codec_params.channels.is_none() {
            return Err(SymphoniaError::DecodeError("unknown channel count").into());
        }
        (audio_track.codec_params.clone(), rate)
    };

    let decoder = symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let frames = Mp3Frames {
        reader,
        decoder,
        pending: Vec::new(),
        pos: 0,
        finished: false,
    };
    Ok((frames, rate))
}

/// Frame source backed by a Symphonia format reader + decoder pair.
pub struct Mp3Frames {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    pending: Vec<[f64; 2]>,
    pos: usize,
    finished: bool,
}

impl FrameSource for Mp3Frames {
    fn read_frames(&mut self, out: &mut [[f64; 2]]) -> usize {
        let mut filled = 0;
        while filled < out.len() {
            if self.pos >= self.pending.len() && !self.refill() {
                break;
            }
            out[filled] = self.pending[self.pos];
            self.pos += 1;
            filled += 1;
        }
        filled
    }
}

impl Mp3Frames {
    /// Decode packets until frames are available. Returns false on end of
    /// stream. Corrupt packets are skipped; a packet-reader error ends the
    /// stream (treated as EOF, matching a truncated tail).
    fn refill(&mut self) -> bool {
        if self.finished {
            return false;
        }
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(_) => {
                    self.finished = true;
                    return false;
                }
            };

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("skipping undecodable packet: {e}");
                    continue;
                }
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pos = 0;
            for frame in sample_buf.samples().chunks_exact(channels.max(1)) {
                // Mono duplicates to both channels; extra channels are dropped.
                let (l, r) = match channels {
                    1 => (frame[0], frame[0]),
                    _ => (frame[0], frame[1]),
                };
                self.pending.push([l as f64, r as f64]);
            }
            if !self.pending.is_empty() {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::path::PathBuf;

    fn open_err(track: &Track) -> PlayError {
        match open(track) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        }
    }

    #[test]
    fn non_mp3_format_is_rejected_before_io() {
        // The path does not exist; the gate must fire before any open().
        let track = Track::new(PathBuf::from("/nonexistent/song.flac"));
        let err = open_err(&track);
        assert!(matches!(
            err,
            PlayError::UnsupportedFormat(AudioFormat::Flac)
        ));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let track = Track::new(PathBuf::from("/nonexistent/song.mp3"));
        assert!(matches!(open_err(&track), PlayError::Decode(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"this is not an mpeg audio stream at all").unwrap();
        drop(file);

        let track = Track::new(path);
        assert!(matches!(open_err(&track), PlayError::Decode(_)));
    }
}
