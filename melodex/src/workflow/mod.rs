//! Session controllers that orchestrate the stateless services in
//! `crate::services` into long-running, cancellable, progress-reporting
//! operations (C6, C7).

pub mod duplicate_scan;
pub mod events;
pub mod fingerprint_session;
pub mod library_scan;

pub use duplicate_scan::ScanCoordinator;
pub use events::{ScanEvent, ScanEventBus};
pub use fingerprint_session::FingerprintCoordinator;
pub use library_scan::LibraryScanCoordinator;
