//! Broadcast events for a running duplicate-scan session, fed to the
//! WebSocket adapter. Grounded on `wkmp-common::events::EventBus`'s
//! `broadcast::Sender` wrapper, narrowed to this engine's own event set.

use crate::models::{DuplicateGroup, ScanSession};
use tokio::sync::broadcast;

/// Default channel capacity per §5's "buffered channel of modest capacity
/// (e.g. 64)".
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress(ScanSession),
    Groups { groups: Vec<DuplicateGroup>, total_found: usize },
    Error(String),
    Done,
}

/// Per-session broadcast bus. Slow subscribers are dropped, never block
/// workers, per §5's subscriber policy: a lagging receiver simply misses
/// older events on its next `recv`.
#[derive(Clone)]
pub struct ScanEventBus {
    tx: broadcast::Sender<ScanEvent>,
}

impl ScanEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Best-effort send; no receivers is not an error (nobody is watching
    /// yet, which is fine).
    pub fn send(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ScanEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
