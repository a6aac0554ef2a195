//! melodex - personal music-library deduplication engine.
//!
//! Library crate: the catalog, scanning, matching, and session-controller
//! logic. The binary (`src/main.rs`) is a thin bootstrap that wires this
//! into an HTTP server.

pub mod api;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

use db::CatalogStore;
use models::ProfileStore;
use std::sync::Arc;
use workflow::{FingerprintCoordinator, LibraryScanCoordinator, ScanCoordinator};

/// Shared application state handed to every HTTP handler.
///
/// The catalog handle is wrapped once here and shared across all three
/// session controllers, so a profile switch performed through any one of
/// them is observed by the others.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<tokio::sync::RwLock<CatalogStore>>,
    pub profiles: Arc<tokio::sync::Mutex<ProfileStore>>,
    pub scans: Arc<ScanCoordinator>,
    pub fingerprints: Arc<FingerprintCoordinator>,
    pub library_scans: Arc<LibraryScanCoordinator>,
}

impl AppState {
    pub fn new(db: CatalogStore, profiles: ProfileStore) -> Self {
        let db = Arc::new(tokio::sync::RwLock::new(db));
        let scans = Arc::new(ScanCoordinator::new(Arc::clone(&db)));
        Self {
            fingerprints: Arc::new(FingerprintCoordinator::new(Arc::clone(&db), Arc::clone(&scans))),
            library_scans: Arc::new(LibraryScanCoordinator::new(Arc::clone(&db), Arc::clone(&scans))),
            scans,
            db,
            profiles: Arc::new(tokio::sync::Mutex::new(profiles)),
        }
    }
}

/// Assemble the full router: music catalog, duplicates, scanning, config,
/// and health, CORS-permissive for the paired front-end per §6.
pub fn build_router(state: AppState) -> axum::Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .merge(api::music::routes())
        .merge(api::duplicates::routes())
        .merge(api::scanning::routes())
        .merge(api::config::routes())
        .merge(api::health::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
