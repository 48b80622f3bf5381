//! CPAL-backed output device.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - building an output stream that drains a [`SharedPcm`] queue
//!
//! The stream callback never blocks on the queue; underruns are filled with
//! silence. Stream errors are logged, not fatal.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::PlayError;
use crate::sink::{AudioOutput, PcmSink, SharedPcm, SinkSpec};

/// Maximum bytes pulled from the queue per callback refill.
const REFILL_MAX_BYTES: usize = 16 * 1024;

/// Queue capacity target, in milliseconds of audio at the session rate.
const QUEUE_MS: u32 = 200;

/// Upper bound on waiting for the device to drain the tail of a track.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pick the first output device matching `needle` (case-insensitive), or the
/// default device.
///
/// Returns an error if no suitable device is found.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, PlayError> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| PlayError::OutputInit(format!("no output devices: {e}")))?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(PlayError::OutputInit(format!(
            "no output device matched: {needle}"
        )));
    }

    host.default_output_device()
        .ok_or_else(|| PlayError::OutputInit("no default output device".to_string()))
}

/// Print available output devices to stdout.
///
/// Intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices() -> Result<(), PlayError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| PlayError::OutputInit(format!("no output devices: {e}")))?;
    for (i, d) in devices.enumerate() {
        match d.description() {
            Ok(desc) => println!("#{i}: {desc}"),
            Err(e) => println!("#{i}: <unavailable: {e}>"),
        }
    }
    Ok(())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Choose a supported output config matching the session's channel count and
/// sample rate exactly. There is no resample stage, so a device that cannot
/// run at the source rate fails the session.
fn pick_output_config(
    device: &cpal::Device,
    spec: SinkSpec,
) -> Result<cpal::SupportedStreamConfig, PlayError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlayError::OutputInit(format!("no supported output configs: {e}")))?;

    let mut best: Option<(u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        if range.channels() != spec.channels {
            continue;
        }
        if spec.sample_rate < range.min_sample_rate() || spec.sample_rate > range.max_sample_rate()
        {
            continue;
        }
        let rank = sample_format_rank(range.sample_format());
        if best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true) {
            best = Some((rank, range.with_sample_rate(spec.sample_rate)));
        }
    }

    best.map(|(_, cfg)| cfg).ok_or_else(|| {
        PlayError::OutputInit(format!(
            "no {}-channel output config at {} Hz",
            spec.channels, spec.sample_rate
        ))
    })
}

/// Prefer formats closest to the s16 wire format to minimize conversion.
fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Output factory selecting a CPAL device per session.
pub struct CpalOutput {
    device_filter: Option<String>,
}

impl CpalOutput {
    /// `device_filter` is a case-insensitive substring; `None` selects the
    /// host default device.
    pub fn new(device_filter: Option<String>) -> Self {
        Self { device_filter }
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, spec: SinkSpec) -> Result<Box<dyn PcmSink>, PlayError> {
        let host = cpal::default_host();
        let device = pick_device(&host, self.device_filter.as_deref())?;
        let config = pick_output_config(&device, spec)?;
        let stream_config: cpal::StreamConfig = config.clone().into();

        let capacity_bytes = 4 * spec.sample_rate as usize * QUEUE_MS as usize / 1000;
        let queue = Arc::new(SharedPcm::new(capacity_bytes));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &queue),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &queue),
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, &queue),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &queue),
            other => Err(PlayError::OutputInit(format!(
                "unsupported sample format: {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| PlayError::OutputInit(e.to_string()))?;

        if let Ok(desc) = device.description() {
            tracing::info!(device = %desc, rate_hz = spec.sample_rate, "output device");
        }

        Ok(Box::new(CpalSink {
            queue,
            _stream: stream,
        }))
    }
}

/// Per-session sink handing bytes to the CPAL callback through [`SharedPcm`].
struct CpalSink {
    queue: Arc<SharedPcm>,
    _stream: cpal::Stream,
}

impl PcmSink for CpalSink {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, PlayError> {
        let accepted = self.queue.push_blocking(bytes);
        if accepted < bytes.len() {
            return Err(PlayError::DeviceWrite("output stream closed".to_string()));
        }
        Ok(accepted)
    }

    fn drain(&mut self) {
        if !self.queue.wait_empty(DRAIN_TIMEOUT) {
            tracing::warn!("output queue did not drain before timeout");
        }
        // Let the device ring flush the last buffer.
        thread::sleep(Duration::from_millis(100));
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Leftover callback bytes between device callbacks.
struct CallbackState {
    pending: Vec<u8>,
    pos: usize,
}

/// Type-specialized stream builder for CPAL sample formats.
///
/// The callback drains `queue` in bursts, decodes s16le pairs, and converts
/// to the device sample format with simple channel mapping (stereo source:
/// mono output averages L/R, wider outputs get silence past channel 1).
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedPcm>,
) -> Result<cpal::Stream, PlayError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = (config.channels as usize).max(1);
    let state = Arc::new(Mutex::new(CallbackState {
        pending: Vec::new(),
        pos: 0,
    }));

    let queue_cb = queue.clone();
    let state_cb = state.clone();
    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let mut st = state_cb.lock().unwrap();
                let frames = data.len() / channels_out;

                for frame in 0..frames {
                    if st.pos >= st.pending.len() {
                        st.pos = 0;
                        st.pending.clear();
                        match queue_cb.pop_nonblocking(REFILL_MAX_BYTES) {
                            Some(bytes) => st.pending = bytes,
                            None => {
                                // No audio ready; fill the rest with silence.
                                for idx in (frame * channels_out)..data.len() {
                                    data[idx] = T::from_sample(0i16);
                                }
                                return;
                            }
                        }
                    }

                    let l = i16::from_le_bytes([st.pending[st.pos], st.pending[st.pos + 1]]);
                    let r = i16::from_le_bytes([st.pending[st.pos + 2], st.pending[st.pos + 3]]);
                    st.pos += 4;

                    if channels_out == 1 {
                        data[frame] = T::from_sample(((l as i32 + r as i32) / 2) as i16);
                    } else {
                        data[frame * channels_out] = T::from_sample(l);
                        data[frame * channels_out + 1] = T::from_sample(r);
                        for ch in 2..channels_out {
                            data[frame * channels_out + ch] = T::from_sample(0i16);
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlayError::OutputInit(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn sample_format_rank_prefers_native_i16() {
        assert!(sample_format_rank(cpal::SampleFormat::I16) < sample_format_rank(cpal::SampleFormat::F32));
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::U16));
    }
}
