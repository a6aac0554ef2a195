//! Directory-scan endpoints (§6): start/status/cancel for C3 sessions,
//! plus the filesystem-browsing helpers a front-end directory picker needs.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub directories: Vec<String>,
}

/// `POST /api/v1/scanning/start {directories}` → `{sessionId}`
pub async fn start_scan(State(state): State<AppState>, Json(req): Json<StartScanRequest>) -> ApiResult<Json<serde_json::Value>> {
    let enabled_exts: HashSet<String> = {
        let profiles = state.profiles.lock().await;
        let active = profiles.active().map_err(ApiError)?;
        active.enabled_file_types.iter().map(|e| e.to_lowercase()).collect()
    };

    let roots: Vec<PathBuf> = req.directories.into_iter().map(PathBuf::from).collect();
    let session_id = state.library_scans.start(roots, enabled_exts).await;
    Ok(Json(serde_json::json!({ "sessionId": session_id })))
}

/// `GET /api/v1/scanning/status/:id`
pub async fn scan_status(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<crate::models::ScanSession>> {
    Ok(Json(state.library_scans.status(id).map_err(ApiError)?))
}

/// `POST /api/v1/scanning/cancel/:id`
pub async fn cancel_scan(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<serde_json::Value>> {
    state.library_scans.cancel(id).map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub path: String,
    pub parent: Option<String>,
    pub entries: Vec<BrowseEntry>,
}

/// `GET /api/v1/scanning/browse?path` — lists one directory level for a
/// front-end directory picker; defaults to the user's home directory.
pub async fn browse(Query(query): Query<BrowseQuery>) -> ApiResult<Json<BrowseResponse>> {
    let dir = query
        .path
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")));

    let read_dir = std::fs::read_dir(&dir).map_err(|e| ApiError(melodex_common::Error::Io(e)))?;

    let mut entries = Vec::new();
    for entry in read_dir.flatten() {
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if !file_type.is_dir() {
            continue;
        }
        entries.push(BrowseEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_string_lossy().to_string(),
            is_directory: true,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(BrowseResponse {
        path: dir.to_string_lossy().to_string(),
        parent: dir.parent().map(|p| p.to_string_lossy().to_string()),
        entries,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDirectoryRequest {
    pub path: String,
}

/// `POST /api/v1/scanning/create-directory`
pub async fn create_directory(Json(req): Json<CreateDirectoryRequest>) -> ApiResult<Json<serde_json::Value>> {
    std::fs::create_dir_all(&req.path).map_err(|e| ApiError(melodex_common::Error::Io(e)))?;
    Ok(Json(serde_json::json!({ "created": req.path })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/scanning/start", post(start_scan))
        .route("/api/v1/scanning/status/:id", get(scan_status))
        .route("/api/v1/scanning/cancel/:id", post(cancel_scan))
        .route("/api/v1/scanning/browse", get(browse))
        .route("/api/v1/scanning/create-directory", post(create_directory))
}
