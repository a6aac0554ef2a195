//! Configuration and profile endpoints (§6, §4.9): the fuzzy-match
//! knobs, enabled file types, profile CRUD/activate/duplicate, a database
//! summary, and the fingerprint-generation trigger/status pair.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::{FuzzyConfig, FuzzyPreset};
use crate::error::{ApiError, ApiResult};
use crate::models::Profile;
use crate::workflow::fingerprint_session;
use crate::AppState;

/// `GET /api/v1/config/fuzzy-search`
pub async fn get_fuzzy_config(State(state): State<AppState>) -> ApiResult<Json<FuzzyConfig>> {
    let profiles = state.profiles.lock().await;
    Ok(Json(profiles.active().map_err(ApiError)?.fuzzy_config.clone()))
}

/// `PUT /api/v1/config/fuzzy-search`
pub async fn put_fuzzy_config(State(state): State<AppState>, Json(cfg): Json<FuzzyConfig>) -> ApiResult<Json<FuzzyConfig>> {
    let mut profiles = state.profiles.lock().await;
    let mut active = profiles.active().map_err(ApiError)?.clone();
    active.fuzzy_config = cfg.clone();
    profiles.update(active).map_err(ApiError)?;
    drop(profiles);
    state.scans.invalidate_cache();
    Ok(Json(cfg))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRequest {
    pub preset: FuzzyPreset,
}

/// `POST /api/v1/config/fuzzy-search/preset {preset}`
pub async fn apply_preset(State(state): State<AppState>, Json(req): Json<PresetRequest>) -> ApiResult<Json<FuzzyConfig>> {
    let cfg = FuzzyConfig::from_preset(req.preset);
    let mut profiles = state.profiles.lock().await;
    let mut active = profiles.active().map_err(ApiError)?.clone();
    active.fuzzy_config = cfg.clone();
    profiles.update(active).map_err(ApiError)?;
    drop(profiles);
    state.scans.invalidate_cache();
    Ok(Json(cfg))
}

/// `GET /api/v1/config/file-types`
pub async fn get_file_types(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let profiles = state.profiles.lock().await;
    Ok(Json(profiles.active().map_err(ApiError)?.enabled_file_types.clone()))
}

/// `PUT /api/v1/config/file-types`
pub async fn put_file_types(State(state): State<AppState>, Json(types): Json<Vec<String>>) -> ApiResult<Json<Vec<String>>> {
    let mut profiles = state.profiles.lock().await;
    let mut active = profiles.active().map_err(ApiError)?.clone();
    active.enabled_file_types = types.clone();
    profiles.update(active).map_err(ApiError)?;
    Ok(Json(types))
}

/// `GET /api/v1/config/profiles`
pub async fn list_profiles(State(state): State<AppState>) -> Json<Vec<Profile>> {
    let profiles = state.profiles.lock().await;
    Json(profiles.list().into_iter().cloned().collect())
}

/// `GET /api/v1/config/profiles/:id`
pub async fn get_profile(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Profile>> {
    let profiles = state.profiles.lock().await;
    profiles
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError(melodex_common::Error::NotFound(format!("profile '{id}' not found"))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub id: String,
    pub name: String,
    pub database_path: String,
}

/// `POST /api/v1/config/profiles`
pub async fn create_profile(State(state): State<AppState>, Json(req): Json<CreateProfileRequest>) -> ApiResult<Json<Profile>> {
    let profile = Profile::new(req.id, req.name, req.database_path.into());
    let mut profiles = state.profiles.lock().await;
    profiles.create(profile.clone()).map_err(ApiError)?;
    Ok(Json(profile))
}

/// `PUT /api/v1/config/profiles/:id`
pub async fn update_profile(State(state): State<AppState>, Path(id): Path<String>, Json(mut profile): Json<Profile>) -> ApiResult<Json<Profile>> {
    profile.id = id;
    let mut profiles = state.profiles.lock().await;
    profiles.update(profile.clone()).map_err(ApiError)?;
    Ok(Json(profile))
}

/// `DELETE /api/v1/config/profiles/:id`
pub async fn delete_profile(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let mut profiles = state.profiles.lock().await;
    profiles.delete(&id).map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateProfileRequest {
    pub new_id: String,
    pub new_name: String,
}

/// `POST /api/v1/config/profiles/:id/duplicate`
pub async fn duplicate_profile(State(state): State<AppState>, Path(id): Path<String>, Json(req): Json<DuplicateProfileRequest>) -> ApiResult<Json<Profile>> {
    let mut profiles = state.profiles.lock().await;
    let source = profiles
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError(melodex_common::Error::NotFound(format!("profile '{id}' not found"))))?;
    let copy = source.duplicate_as(req.new_id, req.new_name);
    profiles.create(copy.clone()).map_err(ApiError)?;
    Ok(Json(copy))
}

/// `POST /api/v1/config/profiles/:id/activate` — swaps the shared catalog
/// connection to the newly active profile's database, per §4.9's atomic
/// profile switch.
pub async fn activate_profile(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Profile>> {
    let mut profiles = state.profiles.lock().await;
    let activated = profiles.activate(&id).map_err(ApiError)?.clone();
    drop(profiles);

    let new_db = crate::db::open(&activated.database_path).await.map_err(ApiError)?;
    state.scans.switch_profile(new_db).await;

    Ok(Json(activated))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub path: String,
    pub track_count: i64,
}

/// `GET /api/v1/config/database`
pub async fn database_summary(State(state): State<AppState>) -> ApiResult<Json<DatabaseSummary>> {
    let path = {
        let profiles = state.profiles.lock().await;
        profiles.active().map_err(ApiError)?.database_path.to_string_lossy().to_string()
    };
    let track_count = state.db.read().await.count().await.map_err(ApiError)?;
    Ok(Json(DatabaseSummary { path, track_count }))
}

/// `POST /api/v1/config/fingerprints/generate` → `{sessionId}`
pub async fn generate_fingerprints(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session_id = state.fingerprints.start().await;
    Json(serde_json::json!({ "sessionId": session_id }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintStatusResponse {
    pub fpcalc_available: bool,
    pub fpcalc_version: Option<String>,
}

/// `GET /api/v1/config/fingerprints/status`
pub async fn fingerprint_status() -> Json<FingerprintStatusResponse> {
    let (fpcalc_available, fpcalc_version) = fingerprint_session::availability().await;
    Json(FingerprintStatusResponse { fpcalc_available, fpcalc_version })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/config/fuzzy-search", get(get_fuzzy_config).put(put_fuzzy_config))
        .route("/api/v1/config/fuzzy-search/preset", post(apply_preset))
        .route("/api/v1/config/file-types", get(get_file_types).put(put_file_types))
        .route("/api/v1/config/profiles", get(list_profiles).post(create_profile))
        .route("/api/v1/config/profiles/:id", get(get_profile).put(update_profile).delete(delete_profile))
        .route("/api/v1/config/profiles/:id/duplicate", post(duplicate_profile))
        .route("/api/v1/config/profiles/:id/activate", post(activate_profile))
        .route("/api/v1/config/database", get(database_summary))
        .route("/api/v1/config/fingerprints/generate", post(generate_fingerprints))
        .route("/api/v1/config/fingerprints/status", get(fingerprint_status))
}
