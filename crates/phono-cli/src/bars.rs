//! Terminal spectrum meter.
//!
//! A reference client of the player's snapshot contract: polls `samples()`
//! and `tags()` on a fixed cadence, runs a 1024-point FFT, and renders ten
//! log-scaled frequency buckets. Touches nothing but the public surface.

use std::io::Write as _;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use phono::playlist::Playlist;
use phono::track::TrackTag;

const FFT_SAMPLES: usize = 1024;
const BAR_COUNT: usize = 10;
/// Fast enough for the eye; a little choppy is the trade-off.
const REFRESH: Duration = Duration::from_millis(16);

const GLYPHS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Poll the playlist and render on a fixed cadence.
///
/// Runs until the process exits; the ctrl-c handler owns shutdown.
pub fn run(playlist: Arc<Playlist>) {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SAMPLES);
    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FFT_SAMPLES];

    loop {
        thread::sleep(REFRESH);

        if !playlist.is_playing() {
            render(&[0.0; BAR_COUNT], &playlist.tags());
            continue;
        }

        let samples = playlist.samples();
        if samples.is_empty() {
            continue;
        }

        // Mono mix; snapshots shorter than the FFT window are zero-padded.
        for (i, slot) in buffer.iter_mut().enumerate() {
            let frame = samples.get(i).copied().unwrap_or([0.0, 0.0]);
            *slot = Complex::new((frame[0] + frame[1]) as f32, 0.0);
        }
        fft.process(&mut buffer);

        render(&bucketize(&buffer), &playlist.tags());
    }
}

/// Average magnitude per bucket over the first half of the spectrum,
/// log-scaled.
fn bucketize(spectrum: &[Complex<f32>]) -> [f32; BAR_COUNT] {
    let half = spectrum.len() / 2;
    let per_bucket = (half / BAR_COUNT).max(1);

    let mut bars = [0f32; BAR_COUNT];
    for (j, bar) in bars.iter_mut().enumerate() {
        let start = (j * per_bucket).min(half);
        let end = ((j + 1) * per_bucket).min(half);
        if start >= end {
            continue;
        }
        let avg = spectrum[start..end].iter().map(|c| c.norm()).sum::<f32>()
            / (end - start) as f32;
        *bar = 20.0 * (1.0 + avg).ln();
    }
    bars
}

fn render(bars: &[f32; BAR_COUNT], tag: &TrackTag) {
    let mut line = String::with_capacity(64);
    for &bar in bars {
        let level = ((bar / 100.0) * (GLYPHS.len() - 1) as f32)
            .clamp(0.0, (GLYPHS.len() - 1) as f32) as usize;
        line.push(GLYPHS[level]);
    }
    print!("\r[{line}] {} - {}    ", tag.artist, tag.title);
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketize_of_silence_is_zero() {
        let spectrum = vec![Complex::new(0.0, 0.0); FFT_SAMPLES];
        let bars = bucketize(&spectrum);
        assert!(bars.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn bucketize_is_finite_and_non_negative() {
        let spectrum: Vec<Complex<f32>> = (0..FFT_SAMPLES)
            .map(|i| Complex::new((i as f32 * 0.01).sin(), 0.0))
            .collect();
        let bars = bucketize(&spectrum);
        assert!(bars.iter().all(|&b| b.is_finite() && b >= 0.0));
    }

    #[test]
    fn louder_spectrum_raises_the_bars() {
        let quiet: Vec<Complex<f32>> = vec![Complex::new(0.1, 0.0); FFT_SAMPLES];
        let loud: Vec<Complex<f32>> = vec![Complex::new(10.0, 0.0); FFT_SAMPLES];
        let q = bucketize(&quiet);
        let l = bucketize(&loud);
        assert!(l[0] > q[0]);
    }
}
