//! Best-effort tag metadata reading.
//!
//! Tag failures are never fatal: the sequencer logs them and falls back to a
//! tag derived from the file name, so playback is never blocked on metadata.

use std::path::Path;

use lofty::prelude::{Accessor, TaggedFileExt};
use lofty::probe::Probe;

use crate::error::PlayError;
use crate::track::TrackTag;

/// Read artist/title from the file's primary tag.
pub fn read(path: &Path) -> Result<TrackTag, PlayError> {
    let tagged = Probe::open(path)
        .map_err(|e| PlayError::TagRead(e.to_string()))?
        .guess_file_type()
        .map_err(|e| PlayError::TagRead(e.to_string()))?
        .read()
        .map_err(|e| PlayError::TagRead(e.to_string()))?;

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let artist = tag
        .and_then(|t| t.artist().map(|s| s.to_string()))
        .unwrap_or_default();
    let title = tag
        .and_then(|t| t.title().map(|s| s.to_string()))
        .unwrap_or_else(|| stem_title(path));

    Ok(TrackTag { artist, title })
}

/// Read tags, downgrading any failure to a warning plus a fallback tag.
pub fn read_or_fallback(path: &Path) -> TrackTag {
    match read(path) {
        Ok(tag) => tag,
        Err(e) => {
            tracing::warn!(file = %path.display(), "setting tag: {e}");
            TrackTag {
                artist: String::new(),
                title: stem_title(path),
            }
        }
    }
}

fn stem_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    #[test]
    fn unreadable_file_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My Song.mp3");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"no tags here").unwrap();
        drop(file);

        let tag = read_or_fallback(&path);
        assert_eq!(tag.title, "My Song");
        assert_eq!(tag.artist, "");
    }

    #[test]
    fn missing_file_is_a_tag_read_error() {
        let err = read(Path::new("/nonexistent/file.mp3")).unwrap_err();
        assert!(matches!(err, PlayError::TagRead(_)));
    }

    #[test]
    fn stem_title_handles_odd_paths() {
        assert_eq!(stem_title(Path::new("dir/track.mp3")), "track");
        assert_eq!(stem_title(Path::new("noext")), "noext");
    }
}
