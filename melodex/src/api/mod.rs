//! HTTP adapter: one module per resource, each exposing a `routes()`
//! building a `Router<AppState>` merged by `build_router` in `lib.rs`.

pub mod config;
pub mod dto;
pub mod duplicates;
pub mod health;
pub mod music;
pub mod scanning;

use crate::models::Track;
use crate::AppState;

/// Delete a track row and best-effort unlink its underlying file, per §3's
/// delete invariant. Shared by the plain delete endpoint, the per-group
/// "keep" endpoint, and auto-resolve execution, so the unlink policy lives
/// in exactly one place.
pub(crate) async fn delete_and_unlink(state: &AppState, id: i64) -> melodex_common::Result<Track> {
    let db = state.db.read().await;
    let track = db.get_by_id(id).await?;
    db.delete(id).await?;
    drop(db);

    if let Err(err) = std::fs::remove_file(&track.file_path) {
        tracing::warn!(file = %track.file_path, error = %err, "failed to unlink deleted track's file");
    }

    state.scans.invalidate_cache();
    Ok(track)
}
