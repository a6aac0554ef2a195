//! Directory-scan session controller (C3).
//!
//! Wraps the synchronous, rayon-parallel `services::file_scanner::scan` in a
//! `spawn_blocking` task so it shares the same session/progress/cancel shape
//! as the C6 and C7 controllers, bridging back into async `CatalogStore`
//! calls via `Handle::block_on` from inside the blocking closure.

use crate::cancel::CancelFlag;
use crate::db::CatalogStore;
use crate::models::{ScanSession, ScanState};
use crate::services::file_scanner::{self, FileScanner, ScanProgress, ScanStage};
use crate::workflow::ScanCoordinator;
use melodex_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct LibraryScanCoordinator {
    db: Arc<tokio::sync::RwLock<CatalogStore>>,
    sessions: Arc<Mutex<HashMap<u64, ScanSession>>>,
    cancels: Arc<Mutex<HashMap<u64, CancelFlag>>>,
    next_id: AtomicU64,
    /// Cleared once a run finishes, since newly-catalogued tracks invalidate
    /// any duplicate-scan cache entry per §4.7's cache-invalidation rule.
    duplicate_cache: Arc<ScanCoordinator>,
}

impl LibraryScanCoordinator {
    pub fn new(db: Arc<tokio::sync::RwLock<CatalogStore>>, duplicate_cache: Arc<ScanCoordinator>) -> Self {
        Self {
            db,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            duplicate_cache,
        }
    }

    pub fn status(&self, session_id: u64) -> Result<ScanSession> {
        self.sessions
            .lock()
            .expect("sessions mutex poisoned")
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("library scan session {session_id}")))
    }

    pub fn cancel(&self, session_id: u64) -> Result<()> {
        let cancels = self.cancels.lock().expect("cancels mutex poisoned");
        match cancels.get(&session_id) {
            Some(flag) => {
                flag.cancel();
                Ok(())
            }
            None => Err(Error::NotFound(format!("library scan session {session_id}"))),
        }
    }

    pub async fn start(self: &Arc<Self>, roots: Vec<PathBuf>, enabled_exts: HashSet<String>) -> u64 {
        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().expect("sessions mutex poisoned").insert(session_id, ScanSession::new(session_id));

        let cancel = CancelFlag::new();
        self.cancels.lock().expect("cancels mutex poisoned").insert(session_id, cancel.clone());

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(session_id, roots, enabled_exts, cancel).await;
        });

        session_id
    }

    fn set_state(&self, session_id: u64, mutate: impl FnOnce(&mut ScanSession)) {
        if let Some(session) = self.sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
            mutate(session);
        }
    }

    async fn run(self: Arc<Self>, session_id: u64, roots: Vec<PathBuf>, enabled_exts: HashSet<String>, cancel: CancelFlag) {
        self.set_state(session_id, |s| s.state = ScanState::Scanning);

        let known_paths = match self.db.read().await.known_paths().await {
            Ok(p) => p,
            Err(e) => {
                self.fail(session_id, e.to_string());
                return;
            }
        };

        let db = Arc::clone(&self.db);
        let sessions = Arc::clone(&self.sessions);
        let handle = tokio::runtime::Handle::current();

        let outcome = tokio::task::spawn_blocking(move || {
            let scanner = FileScanner::new();
            file_scanner::scan(
                &scanner,
                &roots,
                &enabled_exts,
                &known_paths,
                &cancel,
                |progress: ScanProgress| {
                    if let Some(session) = sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
                        session.state = match progress.stage {
                            ScanStage::Scanning => ScanState::Scanning,
                            ScanStage::ReadingTags => ScanState::ReadingTags,
                            ScanStage::Saving => ScanState::Saving,
                        };
                        session.update_progress(progress.files_processed, progress.files_found);
                    }
                },
                |track| {
                    let db = db.clone();
                    handle.block_on(async move { db.read().await.insert(&track).await.map(|_| ()) })
                },
            )
        })
        .await;

        match outcome {
            Ok(outcome) if outcome.cancelled => self.finish_cancelled(session_id),
            Ok(outcome) => {
                self.set_state(session_id, |s| {
                    s.state = ScanState::Completed;
                    s.update_progress(outcome.files_processed, outcome.files_found);
                });
                if outcome.files_processed > 0 {
                    self.duplicate_cache.invalidate_cache();
                }
                if !outcome.root_errors.is_empty() {
                    tracing::warn!(errors = ?outcome.root_errors, "library scan completed with root errors");
                }
            }
            Err(join_err) => self.fail(session_id, join_err.to_string()),
        }
    }

    fn finish_cancelled(&self, session_id: u64) {
        self.set_state(session_id, |s| s.state = ScanState::Cancelled);
    }

    fn fail(&self, session_id: u64, message: String) {
        self.set_state(session_id, |s| {
            s.state = ScanState::Error;
            s.error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn scans_a_directory_and_reaches_completed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), [0x49, 0x44, 0x33, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let db = Arc::new(tokio::sync::RwLock::new(open_in_memory().await.unwrap()));
        let duplicate_cache = Arc::new(ScanCoordinator::new(Arc::clone(&db)));
        let coordinator = Arc::new(LibraryScanCoordinator::new(db, duplicate_cache));
        let exts: HashSet<String> = ["mp3".to_string()].into_iter().collect();
        let session_id = coordinator.start(vec![dir.path().to_path_buf()], exts).await;

        for _ in 0..200 {
            let status = coordinator.status(session_id).unwrap();
            if status.is_terminal() {
                assert_eq!(status.state, ScanState::Completed);
                assert_eq!(status.files_processed, 1);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("session never reached a terminal state");
    }

    #[tokio::test]
    async fn unknown_session_status_is_not_found() {
        let db = Arc::new(tokio::sync::RwLock::new(open_in_memory().await.unwrap()));
        let duplicate_cache = Arc::new(ScanCoordinator::new(Arc::clone(&db)));
        let coordinator = Arc::new(LibraryScanCoordinator::new(db, duplicate_cache));
        assert!(coordinator.status(999).is_err());
    }
}
