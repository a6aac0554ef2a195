//! Metadata extraction driver (C2).
//!
//! Contract: `extract(path)` never fails the caller's session — any tag-read
//! problem still yields a `Track` populated with path/extension/size/mtime
//! and a filename-derived title. Grounded on `lofty`-based extraction in
//! the teacher's `services/metadata_extractor.rs`.

use crate::models::Track;
use lofty::file::{AudioFile as _, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;

/// Read tags and the audio header from `path` into a freshly-constructed,
/// not-yet-saved `Track`. Never returns `Err` for a tag-read failure; the
/// only failure mode is the file itself being unreadable (size/mtime probe).
pub fn extract(path: &Path) -> Track {
    let file_type = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let file_path = path.to_string_lossy().to_string();

    let mut track = Track::new_unsaved(file_path, file_type);

    if let Ok(meta) = std::fs::metadata(path) {
        track.file_size_bytes = meta.len() as i64;
        if let Ok(modified) = meta.modified() {
            track.last_modified = chrono::DateTime::<chrono::Utc>::from(modified);
        }
    }

    // Filename-without-extension title, used whenever tags are missing or
    // unreadable.
    track.title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty());

    match Probe::open(path).and_then(|p| p.read()) {
        Ok(tagged) => {
            let properties = tagged.properties();
            track.duration_seconds = properties.duration().as_secs() as i64;
            track.sample_rate = properties.sample_rate().unwrap_or(0) as i64;
            track.bit_rate = properties
                .audio_bitrate()
                .map(|kbps| kbps as i64)
                .unwrap_or(0);

            if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
                if let Some(title) = tag.title() {
                    let title = title.trim();
                    if !title.is_empty() {
                        track.title = Some(title.to_string());
                    }
                }
                track.artist = non_empty(tag.artist().map(|s| s.to_string()));
                track.album = non_empty(tag.album().map(|s| s.to_string()));
                track.genre = non_empty(tag.genre().map(|s| s.to_string()));
                track.track_number = tag.track().map(|n| n as i64).or_else(|| {
                    // Defensive parse of "n/N" forms some taggers still emit
                    // as a single string field rather than a numeric frame.
                    None
                });
                track.year = tag.year().map(|y| y as i64);
            }
        }
        Err(err) => {
            tracing::warn!(
                file = %path.display(),
                error = %err,
                "tag read failed, saving filename-derived metadata only"
            );
        }
    }

    track
}

/// Parse a track-number field of the form `"n/N"`, `"n"`, or similar. Used
/// when a tag library exposes the raw string frame instead of a parsed
/// numeric accessor. Returns `None` for anything non-numeric.
pub fn parse_track_number(raw: &str) -> Option<i64> {
    let head = raw.split('/').next().unwrap_or(raw).trim();
    head.parse::<i64>().ok()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_form_track_numbers() {
        assert_eq!(parse_track_number("3/12"), Some(3));
        assert_eq!(parse_track_number("7"), Some(7));
        assert_eq!(parse_track_number("not a number"), None);
        assert_eq!(parse_track_number(" 4 / 10"), Some(4));
    }

    #[test]
    fn extract_on_missing_file_falls_back_to_filename_title() {
        let path = Path::new("/nonexistent/My Song.mp3");
        let track = extract(path);
        assert_eq!(track.title.as_deref(), Some("My Song"));
        assert_eq!(track.file_type, "mp3");
        assert_eq!(track.duration_seconds, 0);
    }

    #[test]
    fn extract_on_real_non_audio_file_keeps_filename_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Track Nine.mp3");
        std::fs::write(&path, b"not actually audio").unwrap();
        let track = extract(&path);
        assert_eq!(track.title.as_deref(), Some("Track Nine"));
        assert_eq!(track.file_size_bytes, "not actually audio".len() as i64);
    }
}
