//! Fuzzy metadata matcher (C4).
//!
//! Normalizes text fields, scores per-field similarity with Jaro-Winkler,
//! and decides pairwise duplicate status under a `FuzzyConfig`. Grounded on
//! the normalization/threshold style of `services/contextual_matcher.rs`.

use crate::config::FuzzyConfig;
use crate::models::Track;
use std::fmt;

/// Per-field trace for a single pair comparison, used by the `/compare`
/// endpoint (supplemented feature, SPEC_FULL §11).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBreakdown {
    pub title_similarity: f64,
    pub artist_similarity: f64,
    pub album_similarity: f64,
    pub duration_match: bool,
    pub track_number_gate_passed: bool,
    pub matching_fields: u8,
    pub min_fields_required: u8,
    pub duplicate: bool,
    pub similarity_score: f64,
}

impl fmt::Display for FieldBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "title:    {:.1}%", self.title_similarity)?;
        writeln!(f, "artist:   {:.1}%", self.artist_similarity)?;
        writeln!(f, "album:    {:.1}%", self.album_similarity)?;
        writeln!(f, "duration: {}", if self.duration_match { "match" } else { "no match" })?;
        writeln!(
            f,
            "track#:   {}",
            if self.track_number_gate_passed { "gate passed" } else { "gate failed" }
        )?;
        writeln!(
            f,
            "fields matching: {}/{} (need {})",
            self.matching_fields,
            4,
            self.min_fields_required
        )?;
        write!(
            f,
            "verdict: {} (score {:.1})",
            if self.duplicate { "DUPLICATE" } else { "not duplicate" },
            self.similarity_score
        )
    }
}

/// Normalize a single text field per `FuzzyConfig`'s pipeline: trim →
/// optional lowercase → field-specific strip → optional punctuation strip →
/// whitespace collapse → trim. Idempotent: `normalize(normalize(x)) ==
/// normalize(x)`.
pub fn normalize_field(value: &str, cfg: &FuzzyConfig, kind: FieldKind) -> String {
    let mut s = value.trim().to_string();
    if cfg.ignore_case {
        s = s.to_lowercase();
    }
    if kind == FieldKind::Artist {
        if cfg.ignore_artist_prefixes {
            s = strip_artist_prefix(&s);
        }
        if cfg.ignore_featuring {
            s = strip_featuring(&s);
        }
    }
    if kind == FieldKind::Album && cfg.ignore_album_editions {
        s = strip_album_edition(&s);
    }
    if cfg.ignore_punct {
        s = strip_punctuation(&s);
    }
    s = collapse_whitespace(&s);
    s.trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    Artist,
    Album,
}

fn strip_artist_prefix(s: &str) -> String {
    let lower = s.to_lowercase();
    for prefix in ["the ", "a ", "an "] {
        if lower.starts_with(prefix) {
            return s[prefix.len()..].to_string();
        }
    }
    s.to_string()
}

fn strip_featuring(s: &str) -> String {
    let lower = s.to_lowercase();
    for marker in ["feat.", "featuring", "ft."] {
        if let Some(idx) = lower.find(marker) {
            return s[..idx].to_string();
        }
    }
    s.to_string()
}

fn strip_album_edition(s: &str) -> String {
    let lower = s.to_lowercase();
    const QUALIFIERS: &[&str] = &[
        "deluxe",
        "remastered",
        "special",
        "limited",
        "extended",
        "expanded",
        "anniversary",
        "collector's",
    ];
    for q in QUALIFIERS {
        if let Some(idx) = lower.find(q) {
            // Only strip when the qualifier trails the core title, i.e. is
            // preceded by an opening delimiter or whitespace.
            let prefix = s[..idx].trim_end();
            let prefix = prefix.trim_end_matches(['(', '[', '-']);
            if !prefix.is_empty() {
                return prefix.trim().to_string();
            }
        }
    }
    s.to_string()
}

fn strip_punctuation(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Percentage similarity (0-100) between two optional text fields after
/// normalization. Both null/empty yields 100; exactly one null/empty
/// yields 0; otherwise equal normalized strings yield 100, else
/// Jaro-Winkler * 100.
pub fn field_similarity(a: Option<&str>, b: Option<&str>, cfg: &FuzzyConfig, kind: FieldKind) -> f64 {
    let na = a.map(|v| normalize_field(v, cfg, kind)).filter(|s| !s.is_empty());
    let nb = b.map(|v| normalize_field(v, cfg, kind)).filter(|s| !s.is_empty());

    match (na, nb) {
        (None, None) => 100.0,
        (None, Some(_)) | (Some(_), None) => 0.0,
        (Some(x), Some(y)) => {
            if x == y {
                100.0
            } else {
                jaro_winkler_similarity(&x, &y) * 100.0
            }
        }
    }
}

/// Jaro-Winkler similarity in [0,1], delegating to `strsim`. `strsim`'s
/// implementation already matches the window/prefix/scaling rules from
/// §4.4 (window `max(len)/2 - 1`, scaling 0.1, prefix capped at 4, applied
/// only when Jaro >= 0.7).
pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// Normalized Levenshtein similarity in [0,1], exposed as a utility per
/// §4.4 for callers that want an edit-distance-based metric instead of
/// Jaro-Winkler.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let dist = strsim::levenshtein(a, b) as f64;
    let max_len = a.chars().count().max(b.chars().count()) as f64;
    1.0 - (dist / max_len)
}

/// `true` when two (possibly-null) durations in seconds match under the
/// configured absolute/percentage tolerance. A null duration on either side
/// is treated as a match.
pub fn duration_matches(a: Option<i64>, b: Option<i64>, cfg: &FuzzyConfig) -> bool {
    match (a, b) {
        (None, _) | (_, None) => true,
        (Some(x), Some(y)) => {
            let diff = (x - y).unsigned_abs() as f64;
            if diff <= cfg.duration_tol_sec {
                return true;
            }
            let avg = (x as f64 + y as f64) / 2.0;
            if avg <= 0.0 {
                return diff == 0.0;
            }
            100.0 * diff / avg <= cfg.duration_tol_pct
        }
    }
}

/// Track-number hard gate: `true` means the pair may still be a duplicate
/// (gate passed); `false` is an immediate non-duplicate.
fn track_number_gate(a: Option<i64>, b: Option<i64>, cfg: &FuzzyConfig) -> bool {
    if !cfg.track_number_must_match {
        return true;
    }
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => cfg.ignore_missing_track_number,
    }
}

/// Full pairwise comparison producing the `FieldBreakdown` used for
/// reporting and the duplicate decision itself.
pub fn compare(a: &Track, b: &Track, cfg: &FuzzyConfig) -> FieldBreakdown {
    let title_similarity = field_similarity(a.title.as_deref(), b.title.as_deref(), cfg, FieldKind::Title);
    let artist_similarity = field_similarity(a.artist.as_deref(), b.artist.as_deref(), cfg, FieldKind::Artist);
    let album_similarity = field_similarity(a.album.as_deref(), b.album.as_deref(), cfg, FieldKind::Album);
    let duration_match = duration_matches(
        Some(a.duration_seconds).filter(|d| *d > 0),
        Some(b.duration_seconds).filter(|d| *d > 0),
        cfg,
    );
    let gate_passed = track_number_gate(a.track_number, b.track_number, cfg);

    let matching_fields = [
        title_similarity >= cfg.title_threshold,
        artist_similarity >= cfg.artist_threshold,
        album_similarity >= cfg.album_threshold,
        duration_match,
    ]
    .iter()
    .filter(|b| **b)
    .count() as u8;

    let duplicate = gate_passed && matching_fields >= cfg.min_fields_to_match;
    let similarity_score = if duplicate {
        (title_similarity + artist_similarity + album_similarity) / 3.0
    } else {
        0.0
    };

    FieldBreakdown {
        title_similarity,
        artist_similarity,
        album_similarity,
        duration_match,
        track_number_gate_passed: gate_passed,
        matching_fields,
        min_fields_required: cfg.min_fields_to_match,
        duplicate,
        similarity_score,
    }
}

/// Convenience wrapper returning just the boolean verdict.
pub fn is_duplicate(a: &Track, b: &Track, cfg: &FuzzyConfig) -> bool {
    compare(a, b, cfg).duplicate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuzzyConfig;

    fn track(title: &str, artist: &str, album: &str, duration: i64) -> Track {
        let mut t = Track::new_unsaved("/x.mp3".into(), "mp3".into());
        t.title = Some(title.into());
        t.artist = Some(artist.into());
        t.album = Some(album.into());
        t.duration_seconds = duration;
        t
    }

    #[test]
    fn scenario_1_featuring_stripped_is_duplicate() {
        let cfg = FuzzyConfig::balanced();
        let a = track("Song", "The Band feat. Guest", "Hits", 180);
        let b = track("Song", "Band", "Hits", 182);
        let result = compare(&a, &b, &cfg);
        assert_eq!(result.title_similarity, 100.0);
        assert_eq!(result.artist_similarity, 100.0);
        assert_eq!(result.album_similarity, 100.0);
        assert!(result.duration_match);
        assert_eq!(result.matching_fields, 4);
        assert!(result.duplicate);
        assert_eq!(result.similarity_score, 100.0);
    }

    #[test]
    fn scenario_2_non_match_by_min_fields() {
        let cfg = FuzzyConfig::balanced();
        let a = track("Song", "X", "A", 180);
        let b = track("Song!", "Y", "B", 400);
        let result = compare(&a, &b, &cfg);
        assert_eq!(result.matching_fields, 1);
        assert!(!result.duplicate);
    }

    #[test]
    fn similarity_is_symmetric() {
        let cfg = FuzzyConfig::balanced();
        let a = track("Whispers in the Dark", "Skillet", "Rise", 200);
        let b = track("Whisper in the Dark", "Skillet", "Rise", 201);
        let forward = compare(&a, &b, &cfg);
        let backward = compare(&b, &a, &cfg);
        assert_eq!(forward.title_similarity, backward.title_similarity);
        assert_eq!(forward.duplicate, backward.duplicate);
    }

    #[test]
    fn identity_similarity_is_100() {
        let cfg = FuzzyConfig::balanced();
        let a = track("Song", "Artist", "Album", 180);
        let result = compare(&a, &a, &cfg);
        assert_eq!(result.title_similarity, 100.0);
        assert_eq!(result.artist_similarity, 100.0);
        assert_eq!(result.album_similarity, 100.0);
    }

    #[test]
    fn normalization_is_idempotent() {
        let cfg = FuzzyConfig::balanced();
        let once = normalize_field("The Band feat. Guest!!", &cfg, FieldKind::Artist);
        let twice = normalize_field(&once, &cfg, FieldKind::Artist);
        assert_eq!(once, twice);
    }

    #[test]
    fn both_null_fields_match_fully() {
        let cfg = FuzzyConfig::balanced();
        assert_eq!(field_similarity(None, None, &cfg, FieldKind::Title), 100.0);
        assert_eq!(field_similarity(Some("x"), None, &cfg, FieldKind::Title), 0.0);
    }

    #[test]
    fn track_number_gate_blocks_mismatch_when_required() {
        let mut cfg = FuzzyConfig::balanced();
        cfg.track_number_must_match = true;
        let mut a = track("Song", "Artist", "Album", 180);
        let mut b = track("Song", "Artist", "Album", 180);
        a.track_number = Some(1);
        b.track_number = Some(2);
        let result = compare(&a, &b, &cfg);
        assert!(!result.track_number_gate_passed);
        assert!(!result.duplicate);
    }

    #[test]
    fn duration_tolerance_respects_absolute_and_percent() {
        let cfg = FuzzyConfig::balanced();
        assert!(duration_matches(Some(180), Some(188), &cfg));
        assert!(!duration_matches(Some(100), Some(300), &cfg));
    }
}
