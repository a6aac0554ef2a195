//! Tunable fuzzy-match configuration (C4) and preset application (C9).
//!
//! All fields are independently tunable; the preset constructors below give
//! the three named starting points. Config exposes only path and filter
//! knobs and never queries the catalog directly — see `ProfileStore` in
//! `models::profile` for the surrounding profile plumbing.

use serde::{Deserialize, Serialize};

/// Tunable parameters for the fuzzy metadata matcher (C4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyConfig {
    pub title_threshold: f64,
    pub artist_threshold: f64,
    pub album_threshold: f64,
    pub duration_tol_sec: f64,
    pub duration_tol_pct: f64,
    pub bitrate_tol_kbps: f64,
    pub min_fields_to_match: u8,
    pub ignore_case: bool,
    pub ignore_punct: bool,
    pub word_order_sensitive: bool,
    pub ignore_artist_prefixes: bool,
    pub ignore_featuring: bool,
    pub ignore_album_editions: bool,
    pub track_number_must_match: bool,
    pub ignore_missing_track_number: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Named fuzzy-matching presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyPreset {
    Strict,
    Balanced,
    Lenient,
}

impl FuzzyConfig {
    /// Every field forced to an exact match.
    pub fn strict() -> Self {
        Self {
            title_threshold: 100.0,
            artist_threshold: 100.0,
            album_threshold: 100.0,
            duration_tol_sec: 0.0,
            duration_tol_pct: 0.0,
            bitrate_tol_kbps: 0.0,
            min_fields_to_match: 4,
            ignore_case: true,
            ignore_punct: true,
            word_order_sensitive: false,
            ignore_artist_prefixes: true,
            ignore_featuring: false,
            ignore_album_editions: true,
            track_number_must_match: true,
            ignore_missing_track_number: true,
        }
    }

    /// The documented default: moderate thresholds suitable for most libraries.
    pub fn balanced() -> Self {
        Self {
            title_threshold: 85.0,
            artist_threshold: 90.0,
            album_threshold: 85.0,
            duration_tol_sec: 10.0,
            duration_tol_pct: 5.0,
            bitrate_tol_kbps: 64.0,
            min_fields_to_match: 2,
            ignore_case: true,
            ignore_punct: true,
            word_order_sensitive: false,
            ignore_artist_prefixes: true,
            ignore_featuring: false,
            ignore_album_editions: true,
            track_number_must_match: false,
            ignore_missing_track_number: true,
        }
    }

    /// Loose thresholds; `ignore_featuring` is true.
    pub fn lenient() -> Self {
        Self {
            title_threshold: 70.0,
            artist_threshold: 75.0,
            album_threshold: 70.0,
            duration_tol_sec: 30.0,
            duration_tol_pct: 10.0,
            bitrate_tol_kbps: 64.0,
            min_fields_to_match: 2,
            ignore_case: true,
            ignore_punct: true,
            word_order_sensitive: false,
            ignore_artist_prefixes: true,
            ignore_featuring: true,
            ignore_album_editions: true,
            track_number_must_match: false,
            ignore_missing_track_number: true,
        }
    }

    pub fn from_preset(preset: FuzzyPreset) -> Self {
        match preset {
            FuzzyPreset::Strict => Self::strict(),
            FuzzyPreset::Balanced => Self::balanced(),
            FuzzyPreset::Lenient => Self::lenient(),
        }
    }

    /// A content hash identifying this exact configuration, used as half of
    /// the duplicate-scan cache key (profile id + config fingerprint) per
    /// §4.7. `f64` fields aren't `Hash`, so this hashes the canonical JSON
    /// rendering instead of the struct directly.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        json.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Applying the strict preset then reading it back must return the
    /// strict values bit-exactly.
    #[test]
    fn strict_preset_round_trips_exactly() {
        let applied = FuzzyConfig::from_preset(FuzzyPreset::Strict);
        assert_eq!(applied, FuzzyConfig::strict());
        assert_eq!(applied.min_fields_to_match, 4);
        assert!(applied.track_number_must_match);
    }

    #[test]
    fn default_is_balanced() {
        assert_eq!(FuzzyConfig::default(), FuzzyConfig::balanced());
    }
}
