//! Track catalog endpoints (§6): paged listing, search, single/bulk
//! update, delete, and a ranged byte-stream for playback in the paired
//! front-end.

use axum::extract::{Path, Query, Request, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::api::dto::{PageQuery, PagedResponse};
use crate::db::tracks::TrackFilters;
use crate::error::{ApiError, ApiResult};
use crate::models::Track;
use crate::AppState;

/// `GET /api/v1/music?page&size`
pub async fn list_tracks(State(state): State<AppState>, Query(page): Query<PageQuery>) -> ApiResult<Json<PagedResponse<Track>>> {
    let db = state.db.read().await;
    let result = db.list_page(page.offset(), page.limit(), &TrackFilters::default()).await.map_err(ApiError)?;
    Ok(Json(PagedResponse { items: result.items, total: result.total, page: page.page(), size: page.size() }))
}

/// `?q|title|artist|album` query parameters for `GET /api/v1/music/search`.
#[derive(Debug, serde::Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    #[serde(flatten)]
    pub page: PageQuery,
}

/// `GET /api/v1/music/search?q|title|artist|album&page&size`
pub async fn search_tracks(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<Json<PagedResponse<Track>>> {
    let filters = TrackFilters { text: query.q, title: query.title, artist: query.artist, album: query.album };
    let db = state.db.read().await;
    let result = db.list_page(query.page.offset(), query.page.limit(), &filters).await.map_err(ApiError)?;
    Ok(Json(PagedResponse { items: result.items, total: result.total, page: query.page.page(), size: query.page.size() }))
}

/// `PUT /api/v1/music/:id` — replace one track's mutable fields with the
/// submitted representation. The path id wins over any `id` in the body.
pub async fn update_track(State(state): State<AppState>, Path(id): Path<i64>, Json(mut track): Json<Track>) -> ApiResult<Json<Track>> {
    track.id = id;
    let db = state.db.read().await;
    db.update(&track).await.map_err(ApiError)?;
    let saved = db.get_by_id(id).await.map_err(ApiError)?;
    state.scans.invalidate_cache();
    Ok(Json(saved))
}

/// `PUT /api/v1/music/bulk` — apply the same replace-by-id semantics as
/// `update_track` to every submitted track, in order; the first failure
/// stops the batch (callers resubmit the remainder).
pub async fn bulk_update_tracks(State(state): State<AppState>, Json(tracks): Json<Vec<Track>>) -> ApiResult<Json<Vec<Track>>> {
    let db = state.db.read().await;
    let mut saved = Vec::with_capacity(tracks.len());
    for track in tracks {
        db.update(&track).await.map_err(ApiError)?;
        saved.push(db.get_by_id(track.id).await.map_err(ApiError)?);
    }
    drop(db);
    state.scans.invalidate_cache();
    Ok(Json(saved))
}

/// `DELETE /api/v1/music/:id` — removes the catalog row and best-effort
/// unlinks the underlying file, per §3's delete invariant.
pub async fn delete_track(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    super::delete_and_unlink(&state, id).await.map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// `GET /api/v1/music/:id/stream` — serves the underlying file with HTTP
/// range support via `tower_http::services::ServeFile`, so a front-end
/// `<audio>` element can seek without the handler reimplementing byte
/// ranges itself.
pub async fn stream_track(State(state): State<AppState>, Path(id): Path<i64>, request: Request) -> ApiResult<impl IntoResponse> {
    let track = state.db.read().await.get_by_id(id).await.map_err(ApiError)?;
    let service = ServeFile::new(&track.file_path);
    match service.oneshot(request).await {
        Ok(response) => Ok(response.map(axum::body::Body::new).into_response()),
        Err(infallible) => match infallible {},
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/music", get(list_tracks))
        .route("/api/v1/music/search", get(search_tracks))
        .route("/api/v1/music/bulk", put(bulk_update_tracks))
        .route("/api/v1/music/:id", put(update_track).delete(delete_track))
        .route("/api/v1/music/:id/stream", get(stream_track))
}
