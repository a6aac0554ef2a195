//! Duplicate-group endpoints (§6): cached-scan reads, scan session
//! lifecycle, pairwise comparison, manual resolution, and auto-resolve.
//!
//! The scan-progress WebSocket mirrors `wkmp-ai/src/api/sse.rs`'s
//! heartbeat-plus-broadcast `tokio::select!` loop shape (periodic
//! keepalive alongside `rx.recv()`), written here as a plain `loop` over
//! a `WebSocket` sink instead of that file's `async_stream::stream!`
//! macro, since a WebSocket needs two-way `send`/close control the
//! one-way SSE stream doesn't.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::api::dto::{DuplicateGroupView, PageQuery, PagedResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::Track;
use crate::services::{fingerprint_matcher, fuzzy_matcher};
use crate::workflow::events::ScanEvent;
use crate::AppState;

async fn active_profile(state: &AppState) -> ApiResult<(String, crate::config::FuzzyConfig)> {
    let profiles = state.profiles.lock().await;
    let active = profiles.active().map_err(ApiError)?;
    Ok((active.id.clone(), active.fuzzy_config.clone()))
}

/// `GET /api/v1/duplicates?page&size` — an empty page (not an error) when
/// no completed scan exists yet for the active profile/config pair.
pub async fn list_groups(State(state): State<AppState>, Query(page): Query<PageQuery>) -> ApiResult<Json<PagedResponse<DuplicateGroupView>>> {
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let (groups, total) = state.scans.cached_page(&profile_id, &fuzzy_config, page.page(), page.size()).unwrap_or_default();
    let items = groups.iter().map(DuplicateGroupView::from).collect();
    Ok(Json(PagedResponse { items, total: total as i64, page: page.page(), size: page.size() }))
}

/// `GET /api/v1/duplicates/count`
pub async fn count_groups(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    Ok(Json(serde_json::json!({ "count": state.scans.cached_count(&profile_id, &fuzzy_config) })))
}

/// `GET /api/v1/duplicates/:groupId`
pub async fn get_group(State(state): State<AppState>, Path(group_id): Path<u64>) -> ApiResult<Json<DuplicateGroupView>> {
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let group = state
        .scans
        .cached_group(&profile_id, &fuzzy_config, group_id)
        .ok_or_else(|| ApiError(melodex_common::Error::NotFound(format!("duplicate group {group_id}"))))?;
    Ok(Json(DuplicateGroupView::from(&group)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub file_id1: i64,
    pub file_id2: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub file1: Track,
    pub file2: Track,
    pub similarity: f64,
    pub breakdown: fuzzy_matcher::FieldBreakdown,
    pub fingerprint_breakdown: Option<fingerprint_matcher::ComparisonBreakdown>,
}

/// `POST /api/v1/duplicates/compare` — ad-hoc pairwise comparison, outside
/// any scan session, for exploring why two specific files did or didn't
/// match (supplemented feature, SPEC_FULL §11).
pub async fn compare_files(State(state): State<AppState>, Json(req): Json<CompareRequest>) -> ApiResult<Json<CompareResponse>> {
    let (_, fuzzy_config) = active_profile(&state).await?;
    let db = state.db.read().await;
    let file1 = db.get_by_id(req.file_id1).await.map_err(ApiError)?;
    let file2 = db.get_by_id(req.file_id2).await.map_err(ApiError)?;
    drop(db);

    let breakdown = fuzzy_matcher::compare(&file1, &file2, &fuzzy_config);
    let fingerprint_breakdown = match (file1.fingerprint_ints(), file2.fingerprint_ints()) {
        (Some(a), Some(b)) => Some(fingerprint_matcher::compare(&a, &b, fingerprint_matcher::DEFAULT_THRESHOLD)),
        _ => None,
    };
    let similarity = fingerprint_breakdown.as_ref().and_then(|b| b.similarity).unwrap_or(breakdown.similarity_score / 100.0);

    Ok(Json(CompareResponse { file1, file2, similarity, breakdown, fingerprint_breakdown }))
}

/// `POST /api/v1/duplicates/scan` → `{sessionId}`
pub async fn start_scan(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let session_id = state.scans.start(profile_id, fuzzy_config).await;
    Ok(Json(serde_json::json!({ "sessionId": session_id })))
}

/// `GET /api/v1/duplicates/scan/:id`
pub async fn scan_status(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.scans.status(id).map_err(ApiError)?))
}

/// `POST /api/v1/duplicates/scan/:id/cancel`
pub async fn cancel_scan(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<serde_json::Value>> {
    state.scans.cancel(id).map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// `GET /api/v1/duplicates/scan/:id/stream` — WebSocket progress feed.
/// Forwards `progress`, `groups`, `error`, and terminal `done` messages per
/// §6; closes the socket once `done` is sent.
pub async fn scan_stream(ws: WebSocketUpgrade, State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_scan_events(socket, state, id))
}

async fn stream_scan_events(mut socket: WebSocket, state: AppState, session_id: u64) {
    let Some(mut rx) = state.scans.subscribe(session_id) else {
        let _ = socket
            .send(Message::Text(serde_json::json!({ "kind": "error", "error": "unknown scan session" }).to_string()))
            .await;
        return;
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(15)) => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                };

                let payload = match &event {
                    ScanEvent::Progress(session) => serde_json::json!({ "kind": "progress", "session": session }),
                    ScanEvent::Groups { groups, total_found } => {
                        let views: Vec<DuplicateGroupView> = groups.iter().map(DuplicateGroupView::from).collect();
                        serde_json::json!({ "kind": "groups", "groups": views, "totalFound": total_found })
                    }
                    ScanEvent::Error(message) => serde_json::json!({ "kind": "error", "error": message }),
                    ScanEvent::Done => serde_json::json!({ "kind": "done" }),
                };

                if socket.send(Message::Text(payload.to_string())).await.is_err() {
                    return;
                }
                if matches!(event, ScanEvent::Done) {
                    return;
                }
            }
        }
    }
}

/// `POST /api/v1/duplicates/refresh`
pub async fn refresh_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.scans.invalidate_cache();
    Json(serde_json::json!({ "refreshed": true }))
}

/// `DELETE /api/v1/duplicates/:groupId/keep/:keepFileId` — deletes every
/// other member of the group.
pub async fn keep_file(State(state): State<AppState>, Path((group_id, keep_file_id)): Path<(u64, i64)>) -> ApiResult<Json<serde_json::Value>> {
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let group = state
        .scans
        .cached_group(&profile_id, &fuzzy_config, group_id)
        .ok_or_else(|| ApiError(melodex_common::Error::NotFound(format!("duplicate group {group_id}"))))?;

    let mut deleted = Vec::new();
    for id in group.member_ids().filter(|id| *id != keep_file_id) {
        super::delete_and_unlink(&state, id).await.map_err(ApiError)?;
        deleted.push(id);
    }
    Ok(Json(serde_json::json!({ "kept": keep_file_id, "deleted": deleted })))
}

/// `DELETE /api/v1/duplicates/file/:id`
pub async fn delete_file(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    super::delete_and_unlink(&state, id).await.map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoResolveRequest {
    pub preferred_directory: Option<String>,
    pub exclude_file_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoResolveResponse {
    pub resolutions: Vec<crate::services::auto_resolver::Resolution>,
    pub manual_review_count: usize,
}

/// `POST /api/v1/duplicates/auto-resolve/preview` — plan only, no deletes.
pub async fn auto_resolve_preview(
    State(state): State<AppState>,
    body: Option<Json<AutoResolveRequest>>,
) -> ApiResult<Json<AutoResolveResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let groups = state.scans.cached_groups(&profile_id, &fuzzy_config);
    let exclude: HashSet<i64> = req.exclude_file_ids.unwrap_or_default().into_iter().collect();
    let preferred_dir = req.preferred_directory.as_deref().map(PathBuf::from);

    let plan = crate::services::auto_resolver::resolve(&groups, fuzzy_config.bitrate_tol_kbps, preferred_dir.as_deref(), &exclude);
    Ok(Json(AutoResolveResponse { resolutions: plan.resolutions, manual_review_count: plan.manual_review.len() }))
}

/// `POST /api/v1/duplicates/auto-resolve/execute {excludeFileIds?}` —
/// computes the same plan as `preview` and applies every resolution's
/// delete through `delete_and_unlink`.
pub async fn auto_resolve_execute(
    State(state): State<AppState>,
    body: Option<Json<AutoResolveRequest>>,
) -> ApiResult<Json<AutoResolveResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (profile_id, fuzzy_config) = active_profile(&state).await?;
    let groups = state.scans.cached_groups(&profile_id, &fuzzy_config);
    let exclude: HashSet<i64> = req.exclude_file_ids.unwrap_or_default().into_iter().collect();
    let preferred_dir = req.preferred_directory.as_deref().map(PathBuf::from);

    let plan = crate::services::auto_resolver::resolve(&groups, fuzzy_config.bitrate_tol_kbps, preferred_dir.as_deref(), &exclude);
    for resolution in &plan.resolutions {
        super::delete_and_unlink(&state, resolution.file_to_delete).await.map_err(ApiError)?;
    }
    Ok(Json(AutoResolveResponse { resolutions: plan.resolutions, manual_review_count: plan.manual_review.len() }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/duplicates", get(list_groups))
        .route("/api/v1/duplicates/count", get(count_groups))
        .route("/api/v1/duplicates/compare", post(compare_files))
        .route("/api/v1/duplicates/scan", post(start_scan))
        .route("/api/v1/duplicates/scan/:id", get(scan_status))
        .route("/api/v1/duplicates/scan/:id/cancel", post(cancel_scan))
        .route("/api/v1/duplicates/scan/:id/stream", get(scan_stream))
        .route("/api/v1/duplicates/refresh", post(refresh_cache))
        .route("/api/v1/duplicates/file/:id", delete(delete_file))
        .route("/api/v1/duplicates/auto-resolve/preview", post(auto_resolve_preview))
        .route("/api/v1/duplicates/auto-resolve/execute", post(auto_resolve_execute))
        .route("/api/v1/duplicates/:group_id/keep/:keep_file_id", delete(keep_file))
        .route("/api/v1/duplicates/:group_id", get(get_group))
}
