//! Fingerprint-generation session controller (C6).
//!
//! Wraps `services::fingerprint_generator` with session bookkeeping:
//! locates `fpcalc` once per run, processes every track missing a
//! fingerprint with bounded concurrency, and persists results through
//! `CatalogStore::set_fingerprint` as they complete.

use crate::db::CatalogStore;
use crate::models::{FingerprintSession, FingerprintState};
use crate::services::fingerprint_generator::{self, FingerprintError};
use crate::workflow::ScanCoordinator;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct FingerprintCoordinator {
    db: Arc<tokio::sync::RwLock<CatalogStore>>,
    sessions: Arc<Mutex<HashMap<u64, FingerprintSession>>>,
    next_id: AtomicU64,
    /// Newly fingerprinted tracks change how C5 clusters the catalog, so a
    /// completed run invalidates any duplicate-scan cache entry per §4.7.
    duplicate_cache: Arc<ScanCoordinator>,
}

impl FingerprintCoordinator {
    pub fn new(db: Arc<tokio::sync::RwLock<CatalogStore>>, duplicate_cache: Arc<ScanCoordinator>) -> Self {
        Self {
            db,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            duplicate_cache,
        }
    }

    pub fn status(&self, session_id: u64) -> Option<FingerprintSession> {
        self.sessions.lock().expect("sessions mutex poisoned").get(&session_id).cloned()
    }

    /// Start generating fingerprints for every track currently missing
    /// one. Returns the session id immediately; `None` is never returned —
    /// a session with `total == 0` still completes trivially so status
    /// polling has something to observe.
    pub async fn start(self: &Arc<Self>) -> u64 {
        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let pending = match self.db.read().await.iterate_missing_fingerprints().await {
            Ok(tracks) => tracks,
            Err(e) => {
                let mut session = FingerprintSession::new(session_id, 0);
                session.state = FingerprintState::Error;
                session.error = Some(e.to_string());
                self.sessions.lock().expect("sessions mutex poisoned").insert(session_id, session);
                return session_id;
            }
        };

        let session = FingerprintSession::new(session_id, pending.len());
        self.sessions.lock().expect("sessions mutex poisoned").insert(session_id, session);

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(session_id, pending).await;
        });

        session_id
    }

    async fn run(self: Arc<Self>, session_id: u64, pending: Vec<crate::models::Track>) {
        let Some(fpcalc) = fingerprint_generator::find_fpcalc().await else {
            self.fail(session_id, "fpcalc not found on PATH or in any known install location".to_string());
            return;
        };

        let paths: Vec<PathBuf> = pending.iter().map(|t| PathBuf::from(&t.file_path)).collect();
        let ids: HashMap<PathBuf, i64> = pending.iter().map(|t| (PathBuf::from(&t.file_path), t.id)).collect();

        let db = Arc::clone(&self.db);
        let sessions = Arc::clone(&self.sessions);
        let ids_for_result = ids.clone();

        let outcome = fingerprint_generator::generate_batch(
            &fpcalc,
            paths,
            fingerprint_generator::default_concurrency(),
            move |path, result| {
                if let (Ok(fp), Some(&id)) = (result, ids_for_result.get(path)) {
                    let db = Arc::clone(&db);
                    let fingerprint = fp.fingerprint.clone();
                    let duration = fp.duration_seconds;
                    tokio::spawn(async move {
                        if let Err(e) = db.read().await.set_fingerprint(id, &fingerprint, duration).await {
                            tracing::warn!(track_id = id, error = %e, "failed to persist generated fingerprint");
                        }
                    });
                } else if let Err(err) = result {
                    tracing::warn!(file = %path.display(), error = %err, "fingerprint generation failed, skipping");
                }
            },
            move |completed, total| {
                if let Some(session) = sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
                    session.completed = completed;
                    session.total = total;
                }
            },
        )
        .await;

        if let Some(session) = self.sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
            session.state = FingerprintState::Completed;
            session.completed = outcome.completed;
        }

        if outcome.completed > outcome.skipped.len() {
            self.duplicate_cache.invalidate_cache();
        }

        if !outcome.skipped.is_empty() {
            tracing::info!(skipped = outcome.skipped.len(), total = outcome.total, "fingerprint run completed with some files skipped");
        }
    }

    fn fail(&self, session_id: u64, message: String) {
        if let Some(session) = self.sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
            session.state = FingerprintState::Error;
            session.error = Some(message);
        }
    }
}

/// Quick availability/version probe for the fingerprint-status endpoint
/// (§6) without running a full session.
pub async fn availability() -> (bool, Option<String>) {
    (fingerprint_generator::is_fpcalc_available().await, fingerprint_generator::fpcalc_version().await)
}

#[allow(dead_code)]
fn _ensure_error_type_is_used(_e: FingerprintError) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn start_with_no_pending_tracks_completes_trivially() {
        let db = Arc::new(tokio::sync::RwLock::new(open_in_memory().await.unwrap()));
        let duplicate_cache = Arc::new(ScanCoordinator::new(Arc::clone(&db)));
        let coordinator = Arc::new(FingerprintCoordinator::new(db, duplicate_cache));
        let session_id = coordinator.start().await;

        for _ in 0..200 {
            if let Some(s) = coordinator.status(session_id) {
                if s.state != FingerprintState::Running {
                    assert_eq!(s.total, 0);
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("session never reached a terminal state");
    }
}
