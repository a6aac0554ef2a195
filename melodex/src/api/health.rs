//! Health/readiness endpoint (supplemented feature, SPEC_FULL §11).
//!
//! Grounded on `wkmp-ai/src/api/health.rs`'s plain status responder,
//! extended with the two facts a dedup engine's operator actually wants to
//! know at a glance: whether `fpcalc` is reachable and how large the
//! catalog is.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::services::fingerprint_generator;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub track_count: i64,
    pub fpcalc_available: bool,
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let track_count = state.db.read().await.count().await.unwrap_or(-1);
    let fpcalc_available = fingerprint_generator::is_fpcalc_available().await;

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        track_count,
        fpcalc_available,
    })
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
