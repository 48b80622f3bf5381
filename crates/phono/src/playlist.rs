//! Playlist sequencer.
//!
//! Owns the ordered track list and a drive thread that plays tracks
//! back-to-back through the engine: read tags (best-effort), `play`
//! synchronously, advance, repeat. A failure on any single track is logged
//! and playback advances, so one corrupt file never halts the playlist.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::Player;
use crate::tags;
use crate::track::{Track, TrackTag};

/// Breather after a failed track so a playlist of unreadable files does not
/// spin the drive thread hot.
const FAILED_TRACK_BACKOFF: Duration = Duration::from_millis(250);

struct SequencerState {
    tracks: Vec<Track>,
    current: usize,
    /// Index step applied once when the active track ends; +1 unless
    /// `next`/`back` overrode it.
    step: isize,
    tag: TrackTag,
}

/// Plays an ordered list of tracks through a [`Player`], exposing transport
/// navigation and a stable now-playing view.
pub struct Playlist {
    player: Arc<Player>,
    state: Mutex<SequencerState>,
    closed: AtomicBool,
    drive: Mutex<Option<JoinHandle<()>>>,
}

impl Playlist {
    /// Start the drive loop over `tracks` and return the shared handle.
    ///
    /// The handle is the only reference the presentation layer needs; there
    /// is no ambient global.
    pub fn spawn(tracks: Vec<Track>, player: Player) -> Arc<Playlist> {
        let playlist = Arc::new(Playlist {
            player: Arc::new(player),
            state: Mutex::new(SequencerState {
                tracks,
                current: 0,
                step: 1,
                tag: TrackTag::default(),
            }),
            closed: AtomicBool::new(false),
            drive: Mutex::new(None),
        });

        let drive = {
            let playlist = playlist.clone();
            thread::spawn(move || playlist.run())
        };
        *playlist.drive.lock().unwrap() = Some(drive);

        playlist
    }

    /// The drive loop. Runs until [`Playlist::shutdown`].
    fn run(&self) {
        if self.state.lock().unwrap().tracks.is_empty() {
            tracing::info!("empty playlist; nothing to play");
            return;
        }

        while !self.closed.load(Ordering::Relaxed) {
            let track = {
                let state = self.state.lock().unwrap();
                state.tracks[state.current].clone()
            };

            let tag = tags::read_or_fallback(&track.path);
            {
                let mut state = self.state.lock().unwrap();
                let current = state.current;
                state.tracks[current].tag = Some(tag.clone());
                state.tag = tag;
            }

            if self.closed.load(Ordering::Relaxed) {
                break;
            }

            tracing::info!(track = %track.path.display(), "playing");
            if let Err(e) = self.player.play(&track) {
                tracing::warn!(track = %track.path.display(), "playback failed: {e}");
                if !self.closed.load(Ordering::Relaxed) {
                    thread::sleep(FAILED_TRACK_BACKOFF);
                }
            }

            let mut state = self.state.lock().unwrap();
            let step = mem::replace(&mut state.step, 1);
            state.current = advance(state.current, step, state.tracks.len());
        }
        tracing::debug!("drive loop finished");
    }

    /// Skip to the successor of the current track.
    pub fn next(&self) {
        self.state.lock().unwrap().step = 1;
        self.player.stop();
    }

    /// Replay the previous track (or restart the first).
    pub fn back(&self) {
        self.state.lock().unwrap().step = -1;
        self.player.stop();
    }

    /// Pause if playing, resume otherwise.
    pub fn toggle_pause(&self) {
        if self.player.is_playing() {
            self.player.pause();
        } else {
            self.player.resume();
        }
    }

    /// Cached metadata for the currently loaded track.
    ///
    /// Eventually consistent with the drive loop mid-transition.
    pub fn tags(&self) -> TrackTag {
        self.state.lock().unwrap().tag.clone()
    }

    /// Whether the engine is actively writing frames.
    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Snapshot of the engine's working sample buffer.
    pub fn samples(&self) -> Vec<[f64; 2]> {
        self.player.samples()
    }

    /// Request termination of the current engine session only; the drive
    /// loop then advances by the pending step.
    pub fn stop(&self) {
        self.player.stop();
    }

    /// Stop playback and end the drive loop. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let handle = self.drive.lock().unwrap().take();
        let Some(handle) = handle else {
            self.player.stop();
            return;
        };
        // Keep poking the engine: a single stop can land in the gap between
        // the drive loop's closed check and session start, where it is a
        // no-op.
        while !handle.is_finished() {
            self.player.stop();
            thread::sleep(Duration::from_millis(10));
        }
        let _ = handle.join();
    }

    /// Block until the drive loop exits (after [`Playlist::shutdown`] from
    /// another thread).
    pub fn wait(&self) {
        if let Some(handle) = self.drive.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Apply one index step: wraps to 0 past the end, clamps below the start so
/// stepping back from the first track replays it.
fn advance(current: usize, step: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + step;
    if next < 0 {
        0
    } else {
        (next as usize) % len
    }
}
