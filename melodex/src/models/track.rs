//! The `Track` entity — one audio file in the catalog.
//!
//! Invariants: `file_path` is unique and canonical (no duplicate separators,
//! absolute); `id` never mutates once assigned by the store.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;

/// One audio file tracked by the catalog.
///
/// `Deserialize` renders camelCase per §6's wire shape; `FromRow` maps
/// columns by Rust field name regardless of the serde rename, so the two
/// derives don't interfere with each other. `Serialize` is hand-written
/// below instead of derived, because the wire shape also carries
/// `formattedDuration`/`formattedFileSize`, which aren't struct fields.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: i64,
    pub file_path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<i64>,
    pub year: Option<i64>,
    pub duration_seconds: i64,
    pub file_size_bytes: i64,
    pub bit_rate: i64,
    pub sample_rate: i64,
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
    pub date_added: DateTime<Utc>,
    pub fingerprint: Option<String>,
    pub fingerprint_duration: Option<i64>,
}

impl Track {
    /// A freshly extracted track, not yet assigned a catalog id (`id == 0`
    /// is the sentinel used before `CatalogStore::insert` allocates one).
    pub fn new_unsaved(file_path: String, file_type: String) -> Self {
        let now = melodex_common::time::now_truncated();
        Self {
            id: 0,
            file_path,
            title: None,
            artist: None,
            album: None,
            genre: None,
            track_number: None,
            year: None,
            duration_seconds: 0,
            file_size_bytes: 0,
            bit_rate: 0,
            sample_rate: 0,
            file_type,
            last_modified: now,
            date_added: now,
            fingerprint: None,
            fingerprint_duration: None,
        }
    }

    /// Parse `fingerprint` into its raw Chromaprint integers (see
    /// `services::fingerprint_matcher::parse_fingerprint`). Returns `None`
    /// when no fingerprint has been generated yet.
    pub fn fingerprint_ints(&self) -> Option<Vec<i32>> {
        self.fingerprint
            .as_deref()
            .map(crate::services::fingerprint_matcher::parse_fingerprint)
    }

    /// Number of non-null/non-empty fields among
    /// {title, artist, album, year, track_number} — used by the auto-resolver's
    /// "richer metadata wins" tie-breaker.
    pub fn metadata_richness(&self) -> usize {
        let has_text = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        [
            has_text(&self.title),
            has_text(&self.artist),
            has_text(&self.album),
            self.year.is_some(),
            self.track_number.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    /// `HH:MM:SS` (or `MM:SS`) rendering used by the wire format's
    /// `formattedDuration` field.
    pub fn formatted_duration(&self) -> String {
        let total = self.duration_seconds.max(0);
        let h = total / 3600;
        let m = (total % 3600) / 60;
        let s = total % 60;
        if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else {
            format!("{m}:{s:02}")
        }
    }

    /// Human-readable file size rendering used by `formattedFileSize`.
    pub fn formatted_file_size(&self) -> String {
        const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
        let mut size = self.file_size_bytes.max(0) as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", size as i64, UNITS[unit])
        } else {
            format!("{:.1} {}", size, UNITS[unit])
        }
    }
}

impl Serialize for Track {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Track", 19)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("filePath", &self.file_path)?;
        s.serialize_field("title", &self.title)?;
        s.serialize_field("artist", &self.artist)?;
        s.serialize_field("album", &self.album)?;
        s.serialize_field("genre", &self.genre)?;
        s.serialize_field("trackNumber", &self.track_number)?;
        s.serialize_field("year", &self.year)?;
        s.serialize_field("durationSeconds", &self.duration_seconds)?;
        s.serialize_field("fileSizeBytes", &self.file_size_bytes)?;
        s.serialize_field("bitRate", &self.bit_rate)?;
        s.serialize_field("sampleRate", &self.sample_rate)?;
        s.serialize_field("fileType", &self.file_type)?;
        s.serialize_field("lastModified", &self.last_modified)?;
        s.serialize_field("dateAdded", &self.date_added)?;
        s.serialize_field("fingerprint", &self.fingerprint)?;
        s.serialize_field("fingerprintDuration", &self.fingerprint_duration)?;
        s.serialize_field("formattedDuration", &self.formatted_duration())?;
        s.serialize_field("formattedFileSize", &self.formatted_file_size())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn richness_counts_non_empty_fields() {
        let mut t = Track::new_unsaved("/a.mp3".into(), "mp3".into());
        assert_eq!(t.metadata_richness(), 0);
        t.title = Some("Song".into());
        t.year = Some(1999);
        assert_eq!(t.metadata_richness(), 2);
        t.artist = Some("  ".into()); // blank, doesn't count
        assert_eq!(t.metadata_richness(), 2);
    }

    #[test]
    fn formats_duration_and_size() {
        let mut t = Track::new_unsaved("/a.mp3".into(), "mp3".into());
        t.duration_seconds = 65;
        assert_eq!(t.formatted_duration(), "1:05");
        t.duration_seconds = 3725;
        assert_eq!(t.formatted_duration(), "1:02:05");

        t.file_size_bytes = 512;
        assert_eq!(t.formatted_file_size(), "512 B");
        t.file_size_bytes = 5 * 1024 * 1024;
        assert_eq!(t.formatted_file_size(), "5.0 MB");
    }
}
