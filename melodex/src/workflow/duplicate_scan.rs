//! Duplicate-scan session controller (C7).
//!
//! Orchestrates the fuzzy matcher (C4) and fingerprint matcher (C5) into a
//! session with streaming groups, a profile-scoped result cache, and
//! cooperative cancellation. Grounded on the atomic-counter/batch-progress
//! style of `workflow_orchestrator/phase_scanning.rs`, adapted from a single
//! filesystem pass into two independent pairwise-comparison passes merged
//! by union-find.

use crate::cancel::CancelFlag;
use crate::config::FuzzyConfig;
use crate::db::CatalogStore;
use crate::models::{DuplicateGroup, ScanSession, ScanState};
use crate::services::{fingerprint_matcher, fuzzy_matcher};
use crate::workflow::events::{ScanEvent, ScanEventBus};
use melodex_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Cache key: the owning profile plus a fingerprint of the config in
/// effect when the scan ran, so a config change invalidates only the
/// entries computed under the old config.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    profile_id: String,
    config_fingerprint: u64,
}

/// Copy-on-write cache contents: readers clone the `Arc` (cheap), writers
/// build a new map and swap the pointer under the mutex, so readers never
/// block on a writer in progress.
type Cache = Arc<HashMap<CacheKey, Arc<Vec<DuplicateGroup>>>>;

/// Background controller for duplicate-scan sessions against one profile's
/// catalog. One instance lives for the process; `switch_profile` rebinds
/// it to a new database atomically.
pub struct ScanCoordinator {
    db: Arc<tokio::sync::RwLock<CatalogStore>>,
    cache: Mutex<Cache>,
    sessions: Arc<Mutex<HashMap<u64, ScanSession>>>,
    cancels: Arc<Mutex<HashMap<u64, CancelFlag>>>,
    next_id: AtomicU64,
    events: Arc<Mutex<HashMap<u64, ScanEventBus>>>,
}

impl ScanCoordinator {
    /// `db` is the process-wide catalog handle, shared with the other
    /// session controllers so a profile switch on any one of them is
    /// observed by all.
    pub fn new(db: Arc<tokio::sync::RwLock<CatalogStore>>) -> Self {
        Self {
            db,
            cache: Mutex::new(Arc::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            events: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Swap the underlying catalog connection atomically and drop the
    /// entire cache (every entry was computed against the old database).
    pub async fn switch_profile(&self, new_db: CatalogStore) {
        let mut guard = self.db.write().await;
        *guard = new_db;
        drop(guard);
        self.invalidate_cache();
    }

    /// Purge the result cache. Called on profile switch, config change,
    /// catalog mutation, and the explicit `/refresh` endpoint.
    pub fn invalidate_cache(&self) {
        let mut cache = self.cache.lock().expect("cache mutex poisoned");
        *cache = Arc::new(HashMap::new());
    }

    /// Subscribe to a session's event stream. Returns `None` if the session
    /// id is unknown (never started, or already garbage-collected).
    pub fn subscribe(&self, session_id: u64) -> Option<tokio::sync::broadcast::Receiver<ScanEvent>> {
        self.events.lock().expect("events mutex poisoned").get(&session_id).map(|bus| bus.subscribe())
    }

    pub fn status(&self, session_id: u64) -> Result<ScanSession> {
        self.sessions
            .lock()
            .expect("sessions mutex poisoned")
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("scan session {session_id}")))
    }

    /// Request cancellation. The session reaches terminal `cancelled`
    /// within bounded time; no new pair work is scheduled, in-flight work
    /// finishes.
    pub fn cancel(&self, session_id: u64) -> Result<()> {
        let cancels = self.cancels.lock().expect("cancels mutex poisoned");
        match cancels.get(&session_id) {
            Some(flag) => {
                flag.cancel();
                Ok(())
            }
            None => Err(Error::NotFound(format!("scan session {session_id}"))),
        }
    }

    /// Paged read of a completed scan's cached groups for `profile_id`
    /// under `fuzzy_config`. Returns `None` if no completed scan exists for
    /// that (profile, config) pair yet.
    pub fn cached_page(&self, profile_id: &str, fuzzy_config: &FuzzyConfig, page: usize, size: usize) -> Option<(Vec<DuplicateGroup>, usize)> {
        let key = CacheKey { profile_id: profile_id.to_string(), config_fingerprint: fuzzy_config.fingerprint() };
        let cache = self.cache.lock().expect("cache mutex poisoned").clone();
        let groups = cache.get(&key)?;
        let start = page.saturating_mul(size);
        let page_items = groups.iter().skip(start).take(size).cloned().collect();
        Some((page_items, groups.len()))
    }

    pub fn cached_count(&self, profile_id: &str, fuzzy_config: &FuzzyConfig) -> usize {
        let key = CacheKey { profile_id: profile_id.to_string(), config_fingerprint: fuzzy_config.fingerprint() };
        self.cache.lock().expect("cache mutex poisoned").get(&key).map(|g| g.len()).unwrap_or(0)
    }

    /// Single cached group by id, for the `GET /:groupId` endpoint.
    pub fn cached_group(&self, profile_id: &str, fuzzy_config: &FuzzyConfig, group_id: u64) -> Option<DuplicateGroup> {
        let key = CacheKey { profile_id: profile_id.to_string(), config_fingerprint: fuzzy_config.fingerprint() };
        let cache = self.cache.lock().expect("cache mutex poisoned").clone();
        cache.get(&key)?.iter().find(|g| g.group_id == group_id).cloned()
    }

    /// All cached groups for `profile_id` under `fuzzy_config`, used by the
    /// auto-resolve preview/execute endpoints. Empty if no completed scan
    /// exists yet.
    pub fn cached_groups(&self, profile_id: &str, fuzzy_config: &FuzzyConfig) -> Vec<DuplicateGroup> {
        let key = CacheKey { profile_id: profile_id.to_string(), config_fingerprint: fuzzy_config.fingerprint() };
        let cache = self.cache.lock().expect("cache mutex poisoned").clone();
        cache.get(&key).map(|g| (**g).clone()).unwrap_or_default()
    }

    /// Start a new duplicate-scan session for `profile_id` under
    /// `fuzzy_config`, clearing any prior cache entry for that pair and
    /// spawning the background worker. Returns the new session id
    /// immediately.
    pub async fn start(self: &Arc<Self>, profile_id: String, fuzzy_config: FuzzyConfig) -> u64 {
        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = ScanSession::new(session_id);
        self.sessions.lock().expect("sessions mutex poisoned").insert(session_id, session);

        let cancel = CancelFlag::new();
        self.cancels.lock().expect("cancels mutex poisoned").insert(session_id, cancel.clone());

        let bus = ScanEventBus::default();
        self.events.lock().expect("events mutex poisoned").insert(session_id, bus.clone());

        {
            let key = CacheKey { profile_id: profile_id.clone(), config_fingerprint: fuzzy_config.fingerprint() };
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            let mut next = (*cache).clone();
            next.remove(&key);
            *cache = Arc::new(next);
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run(session_id, profile_id, fuzzy_config, cancel).await;
        });

        session_id
    }

    fn set_state(&self, session_id: u64, mutate: impl FnOnce(&mut ScanSession)) {
        if let Some(session) = self.sessions.lock().expect("sessions mutex poisoned").get_mut(&session_id) {
            mutate(session);
        }
    }

    fn emit_progress(&self, session_id: u64) {
        let session = self.sessions.lock().expect("sessions mutex poisoned").get(&session_id).cloned();
        if let Some(session) = session {
            if let Some(bus) = self.events.lock().expect("events mutex poisoned").get(&session_id) {
                bus.send(ScanEvent::Progress(session));
            }
        }
    }

    async fn run(self: Arc<Self>, session_id: u64, profile_id: String, fuzzy_config: FuzzyConfig, cancel: CancelFlag) {
        self.set_state(session_id, |s| s.state = ScanState::Scanning);
        self.emit_progress(session_id);

        let tracks = {
            let db = self.db.read().await;
            match db.list_all().await {
                Ok(t) => t,
                Err(e) => {
                    self.fail(session_id, e.to_string());
                    return;
                }
            }
        };

        if cancel.is_cancelled() {
            self.finish_cancelled(session_id);
            return;
        }

        let n = tracks.len();
        self.set_state(session_id, |s| s.update_progress(0, n));
        self.emit_progress(session_id);

        // C5: fingerprint clustering over the fingerprinted subset.
        let fingerprints: Vec<Option<Vec<i32>>> = tracks.iter().map(|t| t.fingerprint_ints()).collect();
        let fingerprinted_entries: Vec<fingerprint_matcher::FingerprintedEntry<'_>> = fingerprints
            .iter()
            .enumerate()
            .filter_map(|(i, fp)| fp.as_ref().map(|fp| fingerprint_matcher::FingerprintedEntry { index: i, fingerprint: fp }))
            .collect();

        let fingerprint_groups = fingerprint_matcher::group_fingerprints(&fingerprinted_entries, fingerprint_matcher::DEFAULT_THRESHOLD);

        if cancel.is_cancelled() {
            self.finish_cancelled(session_id);
            return;
        }

        // C4: fuzzy pairwise comparison over all pairs, parallel over the
        // outer index.
        use rayon::prelude::*;
        let fuzzy_pairs: Vec<(usize, usize)> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let tracks = &tracks;
                let cfg = &fuzzy_config;
                ((i + 1)..n).filter_map(move |j| {
                    if fuzzy_matcher::is_duplicate(&tracks[i], &tracks[j], cfg) {
                        Some((i, j))
                    } else {
                        None
                    }
                })
            })
            .collect();

        if cancel.is_cancelled() {
            self.finish_cancelled(session_id);
            return;
        }

        // Merge: union-find over all track indices, seeded from fingerprint
        // groups, then unioned further with fuzzy-matched pairs. Two groups
        // sharing any member end up unioned transitively.
        let mut merge = UnionFind::new(n);
        for group in &fingerprint_groups {
            for window in group.indices.windows(2) {
                merge.union(window[0], window[1]);
            }
        }
        for (i, j) in &fuzzy_pairs {
            merge.union(*i, *j);
        }

        let mut buckets: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..n {
            buckets.entry(merge.find(i)).or_default().push(i);
        }

        let fingerprint_sim: HashMap<(usize, usize), f64> = fingerprint_groups
            .iter()
            .flat_map(|g| {
                let rep = g.indices[0];
                g.indices.iter().zip(g.similarities.iter()).map(move |(&idx, &sim)| ((rep.min(idx), rep.max(idx)), sim))
            })
            .collect();

        self.set_state(session_id, |s| s.state = ScanState::Saving);

        // Per §4.7 step 3, each group is emitted to subscribers as soon as
        // it's finalized rather than batched until the whole bucket pass
        // completes; `groups` still accumulates the full set for the
        // session's final count and the result cache.
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut next_group_id = 0u64;
        for (_, mut members) in buckets {
            if members.len() < 2 {
                continue;
            }
            members.sort_unstable();
            let member_tracks: Vec<_> = members.iter().map(|&i| tracks[i].clone()).collect();
            if let Some(mut group) = DuplicateGroup::new(member_tracks, next_group_id) {
                let rep_original_index = members[0];
                for &idx in &members {
                    if idx == rep_original_index {
                        continue;
                    }
                    let key = (rep_original_index.min(idx), rep_original_index.max(idx));
                    if let Some(&sim) = fingerprint_sim.get(&key) {
                        group.set_similarity(tracks[idx].id, sim);
                    } else {
                        let breakdown = fuzzy_matcher::compare(&tracks[rep_original_index], &tracks[idx], &fuzzy_config);
                        group.set_similarity(tracks[idx].id, breakdown.similarity_score / 100.0);
                    }
                }
                next_group_id += 1;
                groups.push(group.clone());

                self.set_state(session_id, |s| s.groups_found = groups.len());
                if let Some(bus) = self.events.lock().expect("events mutex poisoned").get(&session_id) {
                    bus.send(ScanEvent::Groups { groups: vec![group], total_found: groups.len() });
                }
            }
        }

        let total_found = groups.len();
        self.set_state(session_id, |s| {
            s.groups_found = total_found;
            s.update_progress(n, n);
        });

        {
            let key = CacheKey { profile_id, config_fingerprint: fuzzy_config.fingerprint() };
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            let mut next = (*cache).clone();
            next.insert(key, Arc::new(groups));
            *cache = Arc::new(next);
        }

        self.set_state(session_id, |s| s.state = ScanState::Completed);
        self.emit_progress(session_id);
        if let Some(bus) = self.events.lock().expect("events mutex poisoned").get(&session_id) {
            bus.send(ScanEvent::Done);
        }
    }

    fn finish_cancelled(&self, session_id: u64) {
        self.set_state(session_id, |s| s.state = ScanState::Cancelled);
        self.emit_progress(session_id);
        if let Some(bus) = self.events.lock().expect("events mutex poisoned").get(&session_id) {
            bus.send(ScanEvent::Done);
        }
    }

    fn fail(&self, session_id: u64, message: String) {
        self.set_state(session_id, |s| {
            s.state = ScanState::Error;
            s.error = Some(message.clone());
        });
        if let Some(bus) = self.events.lock().expect("events mutex poisoned").get(&session_id) {
            bus.send(ScanEvent::Error(message));
        }
    }
}

/// Minimal disjoint-set used to merge fingerprint clusters with fuzzy pairs
/// (distinct from `fingerprint_matcher`'s internal union-find, which only
/// ever sees the fingerprinted subset).
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect(), rank: vec![0; n] }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::models::Track;

    fn track(path: &str, title: &str) -> Track {
        let mut t = Track::new_unsaved(path.into(), "mp3".into());
        t.title = Some(title.into());
        t.artist = Some("Artist".into());
        t.album = Some("Album".into());
        t.duration_seconds = 180;
        t
    }

    #[tokio::test]
    async fn scan_finds_fuzzy_duplicate_group_and_caches_it() {
        let db = open_in_memory().await.unwrap();
        db.insert(&track("/a.mp3", "Song")).await.unwrap();
        db.insert(&track("/b.mp3", "Song")).await.unwrap();

        let db = Arc::new(tokio::sync::RwLock::new(db));
        let coordinator = Arc::new(ScanCoordinator::new(db));
        let session_id = coordinator.start("default".to_string(), FuzzyConfig::balanced()).await;

        // Poll for completion; the worker runs on a spawned task.
        for _ in 0..200 {
            let status = coordinator.status(session_id).unwrap();
            if status.state == ScanState::Completed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let status = coordinator.status(session_id).unwrap();
        assert_eq!(status.state, ScanState::Completed);
        assert_eq!(status.groups_found, 1);

        let (page, total) = coordinator.cached_page("default", &FuzzyConfig::balanced(), 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].members.len(), 2);
    }

    #[tokio::test]
    async fn unknown_session_status_is_not_found() {
        let db = open_in_memory().await.unwrap();
        let db = Arc::new(tokio::sync::RwLock::new(db));
        let coordinator = Arc::new(ScanCoordinator::new(db));
        assert!(coordinator.status(999).is_err());
    }

    #[tokio::test]
    async fn invalidate_cache_clears_all_entries() {
        let db = open_in_memory().await.unwrap();
        let db = Arc::new(tokio::sync::RwLock::new(db));
        let coordinator = Arc::new(ScanCoordinator::new(db));
        coordinator.start("default".to_string(), FuzzyConfig::balanced()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        coordinator.invalidate_cache();
        assert!(coordinator.cached_page("default", &FuzzyConfig::balanced(), 0, 10).is_none());
    }
}
