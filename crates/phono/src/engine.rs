//! Playback engine.
//!
//! `Player::play` decodes one track and writes quantized PCM to the output
//! device from a real-time loop on the calling thread. Transport controls
//! arrive over zero-capacity (rendezvous) channels: a returning `pause()`
//! or `stop()` means the loop has *accepted* the request, not merely queued
//! it. The loop polls controls in priority order on every iteration and
//! otherwise blocks only on a single device write.
//!
//! Control handles exist per session. With no session active the handle slot
//! is empty and every control call is a no-op, so a stray `stop()` can never
//! hang the caller.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::config::PlaybackConfig;
use crate::decode::{self, FrameSource};
use crate::device::CpalOutput;
use crate::error::PlayError;
use crate::quantize;
use crate::sink::{AudioOutput, PcmSink, SinkSpec};
use crate::track::Track;

/// A frame of silence, used to size and pre-fill session buffers.
const SILENCE: [f64; 2] = [0.0, 0.0];

/// Transport state of the active session. One authoritative instance,
/// mutated only by the engine loop. Not exposed directly: `is_playing`
/// collapses `Stopped` and `Paused`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    fn as_u8(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Paused => 2,
        }
    }
}

/// Control senders for the active session.
///
/// All channels except the snapshot reply are zero-capacity: a send completes
/// only when the engine loop receives it.
struct SessionControls {
    stop: Sender<()>,
    pause: Sender<()>,
    resume: Sender<()>,
    snapshot: Sender<Sender<Vec<[f64; 2]>>>,
}

/// Receiver half of the session controls, owned by the engine loop.
struct SessionInbox {
    stop: Receiver<()>,
    pause: Receiver<()>,
    resume: Receiver<()>,
    snapshot: Receiver<Sender<Vec<[f64; 2]>>>,
}

fn session_channels() -> (SessionControls, SessionInbox) {
    let (stop_tx, stop_rx) = bounded(0);
    let (pause_tx, pause_rx) = bounded(0);
    let (resume_tx, resume_rx) = bounded(0);
    let (snapshot_tx, snapshot_rx) = bounded(0);
    (
        SessionControls {
            stop: stop_tx,
            pause: pause_tx,
            resume: resume_tx,
            snapshot: snapshot_tx,
        },
        SessionInbox {
            stop: stop_rx,
            pause: pause_rx,
            resume: resume_rx,
            snapshot: snapshot_rx,
        },
    )
}

/// Plays audio tracks, one synchronous session at a time.
pub struct Player {
    output: Box<dyn AudioOutput>,
    buffer_ms: u64,
    controls: Mutex<Option<SessionControls>>,
    state: AtomicU8,
    // Serializes concurrent `play` calls; the sequencer is the only intended
    // driver, but the public API must not corrupt the control slot.
    session_gate: Mutex<()>,
}

impl Player {
    /// Player writing to a CPAL device selected per `config`.
    pub fn new(config: PlaybackConfig) -> Self {
        let output = Box::new(CpalOutput::new(config.device.clone()));
        Self::with_output(config, output)
    }

    /// Player writing to the supplied output factory.
    pub fn with_output(config: PlaybackConfig, output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            buffer_ms: config.buffer_ms,
            controls: Mutex::new(None),
            state: AtomicU8::new(TransportState::Stopped.as_u8()),
            session_gate: Mutex::new(()),
        }
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Play `track` until it ends naturally or `stop` is called.
    ///
    /// Synchronous: returns when the session is fully torn down. Format
    /// validation and decoder/device initialization happen up front, so an
    /// unsupported format, a corrupt stream, or an unavailable device fail
    /// before the loop starts.
    pub fn play(&self, track: &Track) -> Result<(), PlayError> {
        let _session = self.session_gate.lock().unwrap();

        let (mut frames, sample_rate) = decode::open(track)?;
        let sink = self.output.open(SinkSpec::stereo_s16(sample_rate))?;

        // Sized from the configured duration at the source rate, fixed for
        // the session.
        let buffer_frames = ((sample_rate as u64 * self.buffer_ms) / 1000).max(1) as usize;

        let (controls, inbox) = session_channels();
        *self.controls.lock().unwrap() = Some(controls);

        self.run_session(&mut frames, sink, buffer_frames, &inbox);

        *self.controls.lock().unwrap() = None;
        // `inbox` drops here: any control send that raced with teardown
        // observes a disconnect instead of blocking forever.
        Ok(())
    }

    /// The real-time loop. Per iteration, in priority order: stop request,
    /// pause request (then block until resume-or-stop), stray resume drain,
    /// snapshot request, default decode → quantize → write.
    fn run_session(
        &self,
        frames: &mut dyn FrameSource,
        mut sink: Box<dyn PcmSink>,
        buffer_frames: usize,
        inbox: &SessionInbox,
    ) {
        let mut working = vec![SILENCE; buffer_frames];
        let mut bytes = vec![0u8; buffer_frames * 4];

        self.set_state(TransportState::Playing);

        loop {
            if inbox.stop.try_recv().is_ok() {
                tracing::debug!("stop accepted");
                break;
            }

            if inbox.pause.try_recv().is_ok() {
                self.set_state(TransportState::Paused);
                tracing::debug!("playback paused");
                // Silence is not generated while paused; the device simply
                // receives no further writes until resume. Stop must remain
                // deliverable here.
                select! {
                    recv(inbox.resume) -> _ => {
                        self.set_state(TransportState::Playing);
                        tracing::debug!("playback resumed");
                        continue;
                    }
                    recv(inbox.stop) -> _ => {
                        tracing::debug!("stop accepted while paused");
                        break;
                    }
                }
            }

            if inbox.resume.try_recv().is_ok() {
                tracing::debug!("resume with no pause pending; ignored");
            }

            if let Ok(reply) = inbox.snapshot.try_recv() {
                // Ownership of the copy transfers to the requester; the
                // reply channel has capacity 1 so this never blocks.
                let _ = reply.send(working.clone());
            }

            let filled = frames.read_frames(&mut working);
            if filled == 0 {
                tracing::debug!("end of stream");
                sink.drain();
                break;
            }

            quantize::frames_into(&working[..filled], &mut bytes[..filled * 4]);
            if let Err(e) = sink.write(&bytes[..filled * 4]) {
                tracing::warn!("writing to output device: {e}");
            }
        }

        self.set_state(TransportState::Stopped);
    }

    /// Request termination of the current session.
    ///
    /// Accepted on the next loop iteration, whether playing or paused. With
    /// no active session this is a no-op.
    pub fn stop(&self) {
        let Some(tx) = self.control(|c| c.stop.clone()) else {
            tracing::debug!("stop with no active session");
            return;
        };
        if tx.send(()).is_err() {
            tracing::debug!("stop raced with session teardown");
        }
    }

    /// Pause the playback from a playing state.
    ///
    /// Blocks until the loop accepts the request; a second `pause` while
    /// already paused blocks until a `resume` is consumed.
    pub fn pause(&self) {
        let Some(tx) = self.control(|c| c.pause.clone()) else {
            tracing::debug!("pause with no active session");
            return;
        };
        if tx.send(()).is_err() {
            tracing::debug!("pause raced with session teardown");
        }
    }

    /// Resume the playback from a paused state.
    pub fn resume(&self) {
        let Some(tx) = self.control(|c| c.resume.clone()) else {
            tracing::debug!("resume with no active session");
            return;
        };
        if tx.send(()).is_err() {
            tracing::debug!("resume raced with session teardown");
        }
    }

    /// Whether the loop is actively writing frames.
    ///
    /// `false` may mean either paused or finished/idle; callers distinguish
    /// via their own sequencing.
    pub fn is_playing(&self) -> bool {
        self.state.load(Ordering::Relaxed) == TransportState::Playing.as_u8()
    }

    /// Snapshot of the most recent working buffer.
    ///
    /// The returned buffer is an independent copy owned by the caller.
    /// Returns an empty buffer when no session is active. Serviced between
    /// device writes, so it never contends with the audio path.
    pub fn samples(&self) -> Vec<[f64; 2]> {
        let Some(tx) = self.control(|c| c.snapshot.clone()) else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = bounded(1);
        if tx.send(reply_tx).is_err() {
            return Vec::new();
        }
        reply_rx.recv().unwrap_or_default()
    }

    /// Clone one control sender out of the slot without holding the lock
    /// across a rendezvous.
    fn control<T>(&self, pick: impl FnOnce(&SessionControls) -> T) -> Option<T> {
        let guard = self.controls.lock().unwrap();
        guard.as_ref().map(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Yields `frames_left` frames of a constant value, then EOS. A negative
    /// count never runs out.
    struct TestSource {
        frames_left: i64,
        value: f64,
    }

    impl TestSource {
        fn endless() -> Self {
            Self {
                frames_left: -1,
                value: 0.5,
            }
        }

        fn finite(frames: i64) -> Self {
            Self {
                frames_left: frames,
                value: 0.5,
            }
        }
    }

    impl FrameSource for TestSource {
        fn read_frames(&mut self, out: &mut [[f64; 2]]) -> usize {
            if self.frames_left == 0 {
                return 0;
            }
            let n = if self.frames_left < 0 {
                out.len()
            } else {
                out.len().min(self.frames_left as usize)
            };
            for frame in out.iter_mut().take(n) {
                *frame = [self.value, self.value];
            }
            if self.frames_left > 0 {
                self.frames_left -= n as i64;
            }
            n
        }
    }

    /// Counts bytes written and simulates device buffering latency.
    struct TestSink {
        written: Arc<AtomicUsize>,
        write_delay: Duration,
    }

    impl PcmSink for TestSink {
        fn write(&mut self, bytes: &[u8]) -> Result<usize, PlayError> {
            thread::sleep(self.write_delay);
            self.written.fetch_add(bytes.len(), Ordering::SeqCst);
            Ok(bytes.len())
        }

        fn drain(&mut self) {}
    }

    struct NullOutput;

    impl AudioOutput for NullOutput {
        fn open(&self, _spec: SinkSpec) -> Result<Box<dyn PcmSink>, PlayError> {
            Ok(Box::new(TestSink {
                written: Arc::new(AtomicUsize::new(0)),
                write_delay: Duration::ZERO,
            }))
        }
    }

    fn test_player() -> Arc<Player> {
        Arc::new(Player::with_output(
            PlaybackConfig::default(),
            Box::new(NullOutput),
        ))
    }

    fn start_session(
        player: &Arc<Player>,
        source: TestSource,
        write_delay: Duration,
    ) -> (Arc<AtomicUsize>, thread::JoinHandle<()>) {
        let written = Arc::new(AtomicUsize::new(0));
        let sink = Box::new(TestSink {
            written: written.clone(),
            write_delay,
        });
        let player = player.clone();
        let handle = thread::spawn(move || {
            let _gate = player.session_gate.lock().unwrap();
            let (controls, inbox) = session_channels();
            *player.controls.lock().unwrap() = Some(controls);
            let mut source = source;
            player.run_session(&mut source, sink, 64, &inbox);
            *player.controls.lock().unwrap() = None;
        });
        (written, handle)
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn natural_end_writes_everything_and_clears_state() {
        let player = test_player();
        let (written, handle) = start_session(&player, TestSource::finite(200), Duration::ZERO);
        handle.join().unwrap();

        assert_eq!(written.load(Ordering::SeqCst), 200 * 4);
        assert!(!player.is_playing());
        assert!(player.controls.lock().unwrap().is_none());
    }

    #[test]
    fn stop_interrupts_endless_playback() {
        let player = test_player();
        let (_written, handle) =
            start_session(&player, TestSource::endless(), Duration::from_millis(1));

        assert!(wait_until(Duration::from_secs(2), || player.is_playing()));
        player.stop();
        handle.join().unwrap();
        assert!(!player.is_playing());
    }

    #[test]
    fn stop_without_session_is_a_noop() {
        let player = test_player();
        player.stop();
        player.pause();
        player.resume();
        assert!(player.samples().is_empty());
        assert!(!player.is_playing());
    }

    #[test]
    fn pause_halts_writes_and_resume_continues() {
        let player = test_player();
        let (written, handle) =
            start_session(&player, TestSource::endless(), Duration::from_millis(1));

        assert!(wait_until(Duration::from_secs(2), || player.is_playing()));
        player.pause();
        assert!(!player.is_playing());

        // One in-flight write may still complete after the pause lands.
        thread::sleep(Duration::from_millis(20));
        let settled = written.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(written.load(Ordering::SeqCst), settled);

        player.resume();
        assert!(wait_until(Duration::from_secs(2), || {
            written.load(Ordering::SeqCst) > settled
        }));
        assert!(player.is_playing());

        player.stop();
        handle.join().unwrap();
    }

    #[test]
    fn stop_while_paused_terminates_without_resume() {
        let player = test_player();
        let (_written, handle) =
            start_session(&player, TestSource::endless(), Duration::from_millis(1));

        assert!(wait_until(Duration::from_secs(2), || player.is_playing()));
        player.pause();
        player.stop();
        handle.join().unwrap();
        assert!(!player.is_playing());
    }

    #[test]
    fn second_pause_blocks_until_resume_is_consumed() {
        let player = test_player();
        let (_written, handle) =
            start_session(&player, TestSource::endless(), Duration::from_millis(1));

        assert!(wait_until(Duration::from_secs(2), || player.is_playing()));
        player.pause();

        let (done_tx, done_rx) = mpsc::channel();
        let player_for_pause = player.clone();
        let second = thread::spawn(move || {
            player_for_pause.pause();
            let _ = done_tx.send(());
        });

        // The second pause must not be accepted while still paused.
        assert!(
            done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "second pause was accepted while already paused"
        );

        player.resume();
        // Now the loop runs again and consumes the queued pause.
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("second pause never accepted after resume");
        second.join().unwrap();

        player.resume();
        player.stop();
        handle.join().unwrap();
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let player = test_player();
        let (_written, handle) =
            start_session(&player, TestSource::endless(), Duration::from_millis(1));

        assert!(wait_until(Duration::from_secs(2), || player.is_playing()));
        let mut first = player.samples();
        let second = player.samples();
        assert_eq!(first.len(), 64);
        assert_eq!(second.len(), 64);

        let reference = second.clone();
        for frame in first.iter_mut() {
            *frame = [9.0, 9.0];
        }
        assert_eq!(second, reference);

        player.stop();
        handle.join().unwrap();
    }
}
