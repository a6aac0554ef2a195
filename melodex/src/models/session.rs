//! In-memory session state for the duplicate-scan (C7) and
//! fingerprint-generation (C6) background controllers.
//!
//! Sessions live entirely in-memory for the process; state is
//! reconstructable from the catalog on restart (nothing here is persisted).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Starting,
    Scanning,
    ReadingTags,
    Saving,
    Completed,
    Cancelled,
    Error,
}

/// Controller state for a duplicate-detection run (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub id: u64,
    pub state: ScanState,
    pub files_found: usize,
    pub files_processed: usize,
    pub groups_found: usize,
    pub percent_complete: f64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ScanSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: ScanState::Starting,
            files_found: 0,
            files_processed: 0,
            groups_found: 0,
            percent_complete: 0.0,
            error: None,
            started_at: melodex_common::time::now_truncated(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ScanState::Completed | ScanState::Cancelled | ScanState::Error
        )
    }

    pub fn update_progress(&mut self, processed: usize, found: usize) {
        self.files_processed = processed;
        self.files_found = found;
        self.percent_complete = if found == 0 {
            0.0
        } else {
            100.0 * processed as f64 / found as f64
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintState {
    Running,
    Completed,
    Error,
}

/// Controller state for a fingerprint-generation run (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintSession {
    pub id: u64,
    pub state: FingerprintState,
    pub total: usize,
    pub completed: usize,
    pub error: Option<String>,
}

impl FingerprintSession {
    pub fn new(id: u64, total: usize) -> Self {
        Self {
            id,
            state: FingerprintState::Running,
            total,
            completed: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_tracks_progress() {
        let mut s = ScanSession::new(1);
        s.update_progress(0, 0);
        assert_eq!(s.percent_complete, 0.0);
        s.update_progress(5, 20);
        assert_eq!(s.percent_complete, 25.0);
        assert!(!s.is_terminal());
        s.state = ScanState::Cancelled;
        assert!(s.is_terminal());
    }
}
