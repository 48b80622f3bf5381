//! phono CLI — the thin argument/signal layer around the player core.
//!
//! Expands the command line into an ordered track list, starts the playlist
//! drive loop, and (optionally) runs the terminal spectrum meter. All
//! playback logic lives in the `phono` crate.

mod bars;
mod cli;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use phono::config::PlaybackConfig;
use phono::device;
use phono::engine::Player;
use phono::playlist::Playlist;
use phono::track::Track;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_devices {
        device::list_devices()?;
        return Ok(());
    }

    let tracks = expand_paths(&args.paths)?;
    if tracks.is_empty() {
        bail!("no input files");
    }
    tracing::info!(count = tracks.len(), "playlist assembled");

    let player = Player::new(PlaybackConfig {
        buffer_ms: args.buffer_ms,
        device: args.device.clone(),
    });
    let playlist = Playlist::spawn(tracks, player);

    let playlist_for_signal = playlist.clone();
    ctrlc::set_handler(move || {
        playlist_for_signal.shutdown();
        std::process::exit(130);
    })
    .context("installing ctrl-c handler")?;

    if args.bars {
        bars::run(playlist);
    } else {
        playlist.wait();
    }
    Ok(())
}

/// Expand arguments into tracks: files pass through, directories contribute
/// their immediate file entries in name order. Non-recursive.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();
    for path in paths {
        let meta =
            fs::metadata(path).with_context(|| format!("reading {}", path.display()))?;
        if meta.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|entry| entry.path())
                .collect();
            entries.sort();
            tracks.extend(entries.into_iter().map(Track::new));
        } else {
            tracks.push(Track::new(path.clone()));
        }
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn expand_keeps_explicit_file_arguments_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("b.mp3");
        let b = dir.path().join("a.mp3");
        File::create(&a).unwrap();
        File::create(&b).unwrap();

        let tracks = expand_paths(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].path, a);
        assert_eq!(tracks[1].path, b);
    }

    #[test]
    fn expand_directory_is_sorted_and_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("z.mp3")).unwrap();
        File::create(dir.path().join("a.mp3")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested/inner.mp3")).unwrap();

        let tracks = expand_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = tracks
            .iter()
            .map(|t| t.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp3", "z.mp3"]);
    }

    #[test]
    fn expand_missing_path_is_an_error() {
        let err = expand_paths(&[PathBuf::from("/nonexistent/thing")]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/thing"));
    }
}
