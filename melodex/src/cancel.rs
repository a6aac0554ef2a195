//! Cooperative cancellation flag shared by long-running sessions (C3, C6, C7).
//!
//! Modeled as an atomic boolean observed at loop boundaries, never as thread
//! interruption — see SPEC_FULL §9.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observed_across_clones() {
        let flag = CancelFlag::new();
        let cloned = flag.clone();
        assert!(!cloned.is_cancelled());
        flag.cancel();
        assert!(cloned.is_cancelled());
    }
}
