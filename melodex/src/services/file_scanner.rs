//! Directory scanner (C3).
//!
//! Two-phase scan grounded on `services/file_scanner.rs`: a sequential
//! walk with symlink-loop detection, followed by parallel magic-byte
//! verification. Extension filtering, catalog-skip, and progress/cancel
//! plumbing are specific to this engine's session protocol (§4.3).

use crate::cancel::CancelFlag;
use crate::services::metadata_extractor;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Scan stage reported in progress events, mirroring `ScanState`'s
/// in-progress variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Scanning,
    ReadingTags,
    Saving,
}

/// One progress tick emitted during `scan()`.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub current_directory: Option<String>,
    pub current_file: Option<String>,
    pub files_found: usize,
    pub files_processed: usize,
    pub total_directories: usize,
    pub directories_processed: usize,
    pub stage: ScanStage,
}

/// Summary returned once a scan completes or is cancelled.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub files_found: usize,
    pub files_processed: usize,
    pub cancelled: bool,
    pub root_errors: Vec<String>,
}

const DEFAULT_IGNORE: &[&str] = &[".DS_Store", "Thumbs.db", ".git", ".svn", "node_modules"];

pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            ignore_patterns: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn should_ignore(&self, entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.ignore_patterns.iter().any(|p| p == name))
    }

    /// Recursively enumerate candidate files under `root`, skipping symlinks
    /// (never followed, so no loop detection is needed beyond `follow_links
    /// (false)`) and ignored names.
    fn candidate_files(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.should_ignore(e));

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.path().to_path_buf()),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "error accessing directory entry"),
            }
        }
        files
    }
}

/// `true` when the extension (lowercased, no leading dot) is in
/// `enabled_exts`.
fn has_enabled_extension(path: &Path, enabled_exts: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|ext| enabled_exts.contains(&ext))
}

/// Magic-byte check so an extension-matching but corrupt/renamed file
/// doesn't get silently ingested with garbage metadata. Grounded on
/// `wkmp-ai/src/services/file_scanner.rs`'s `verify_magic_bytes`: same
/// 12-byte header read and container-signature match, same `false` on an
/// unrecognized or too-short header rather than a pass-through.
fn looks_like_audio(path: &Path) -> bool {
    let mut header = [0u8; 12];
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let Ok(n) = file.read(&mut header) else {
        return false;
    };
    if n < 4 {
        return false;
    }
    match &header[..n] {
        [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => true, // MPEG frame sync
        [b'I', b'D', b'3', ..] => true,                                 // MP3 w/ ID3 tag
        [b'f', b'L', b'a', b'C', ..] => true,                           // FLAC
        [b'O', b'g', b'g', b'S', ..] => true,                           // Ogg (Vorbis/Opus)
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,               // M4A/MP4 box
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E'] => true, // WAV
        _ => false,
    }
}

/// Scan `roots` for audio files with extensions in `enabled_exts`, skipping
/// any path already present in `known_paths` (the catalog snapshot taken at
/// session start). For each newly discovered file, extraction runs via
/// `metadata_extractor::extract` and the resulting `Track` is handed to
/// `on_new_track` for persistence. `progress_sink` receives one event per
/// processed file; cancellation is checked between files.
pub fn scan(
    scanner: &FileScanner,
    roots: &[PathBuf],
    enabled_exts: &HashSet<String>,
    known_paths: &HashSet<String>,
    cancel: &CancelFlag,
    mut progress_sink: impl FnMut(ScanProgress),
    mut on_new_track: impl FnMut(crate::models::Track) -> melodex_common::Result<()>,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let total_directories = roots.len();
    let mut directories_processed = 0;

    // Pre-count candidates across all roots for percent-complete math.
    let mut all_candidates: Vec<PathBuf> = Vec::new();
    for root in roots {
        if !root.exists() || !root.is_dir() {
            outcome.root_errors.push(format!("root not found or not a directory: {}", root.display()));
            continue;
        }
        let candidates: Vec<PathBuf> = scanner
            .candidate_files(root)
            .into_par_iter()
            .filter(|p| has_enabled_extension(p, enabled_exts))
            .filter(|p| looks_like_audio(p))
            .collect();
        all_candidates.extend(candidates);
    }

    let new_files: Vec<PathBuf> = all_candidates
        .into_iter()
        .filter(|p| !known_paths.contains(&p.to_string_lossy().to_string()))
        .collect();

    outcome.files_found = new_files.len();

    for path in new_files {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        progress_sink(ScanProgress {
            current_directory: path.parent().map(|p| p.to_string_lossy().to_string()),
            current_file: Some(path.to_string_lossy().to_string()),
            files_found: outcome.files_found,
            files_processed: outcome.files_processed,
            total_directories,
            directories_processed,
            stage: ScanStage::ReadingTags,
        });

        let track = metadata_extractor::extract(&path);

        progress_sink(ScanProgress {
            current_directory: path.parent().map(|p| p.to_string_lossy().to_string()),
            current_file: Some(path.to_string_lossy().to_string()),
            files_found: outcome.files_found,
            files_processed: outcome.files_processed,
            total_directories,
            directories_processed,
            stage: ScanStage::Saving,
        });

        if let Err(err) = on_new_track(track) {
            tracing::warn!(file = %path.display(), error = %err, "failed to save scanned track, skipping");
        }

        outcome.files_processed += 1;
        directories_processed = total_directories.min(directories_processed + 1);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn exts(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn skips_files_already_known_to_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, [0x49, 0x44, 0x33, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let known: HashSet<String> = [path.to_string_lossy().to_string()].into_iter().collect();
        let scanner = FileScanner::new();
        let mut saved = Vec::new();
        let outcome = scan(
            &scanner,
            &[dir.path().to_path_buf()],
            &exts(&["mp3"]),
            &known,
            &CancelFlag::new(),
            |_| {},
            |t| {
                saved.push(t);
                Ok(())
            },
        );

        assert_eq!(outcome.files_found, 0);
        assert!(saved.is_empty());
    }

    #[test]
    fn discovers_and_extracts_new_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), [0x49, 0x44, 0x33, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let scanner = FileScanner::new();
        let mut saved = Vec::new();
        let outcome = scan(
            &scanner,
            &[dir.path().to_path_buf()],
            &exts(&["mp3"]),
            &HashSet::new(),
            &CancelFlag::new(),
            |_| {},
            |t| {
                saved.push(t);
                Ok(())
            },
        );

        assert_eq!(outcome.files_found, 1);
        assert_eq!(outcome.files_processed, 1);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_type, "mp3");
    }

    #[test]
    fn cancellation_stops_before_processing_remaining_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            std::fs::write(dir.path().join(name), [0x49, 0x44, 0x33, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        }

        let scanner = FileScanner::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut saved = Vec::new();
        let outcome = scan(
            &scanner,
            &[dir.path().to_path_buf()],
            &exts(&["mp3"]),
            &HashSet::new(),
            &cancel,
            |_| {},
            |t| {
                saved.push(t);
                Ok(())
            },
        );

        assert!(outcome.cancelled);
        assert!(saved.is_empty());
    }

    #[test]
    fn nonexistent_root_is_logged_and_skipped() {
        let scanner = FileScanner::new();
        let outcome = scan(
            &scanner,
            &[PathBuf::from("/this/does/not/exist")],
            &exts(&["mp3"]),
            &HashSet::new(),
            &CancelFlag::new(),
            |_| {},
            |_| Ok(()),
        );
        assert_eq!(outcome.files_found, 0);
        assert_eq!(outcome.root_errors.len(), 1);
    }
}
