//! Catalog CRUD (C1): transactional mutations, indexed reads.
//!
//! Every mutating call runs in a single transaction with explicit commit;
//! failure rolls back. Lock contention is retried with backoff via
//! `db::retry::retry_on_lock`, grounded on `hash_deduplicator.rs`'s
//! retry-wrapped transaction pattern.

use super::retry::retry_on_lock;
use crate::models::Track;
use melodex_common::{Error, Result};
use sqlx::SqlitePool;

/// A page of tracks plus the total row count, for `list_page`.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Optional filters for `list_page`, used by the search endpoint. `text`
/// is a free-text query matched with OR semantics against title/artist/
/// album; the per-field filters are ANDed against each other and against
/// `text` when both are present.
#[derive(Debug, Clone, Default)]
pub struct TrackFilters {
    pub text: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Owns all database connections for the active profile: a bounded writer
/// pool and a dedicated read-only connection. No other component opens a
/// connection against this database file.
#[derive(Clone)]
pub struct CatalogStore {
    writer: SqlitePool,
    reader: SqlitePool,
}

const LOCK_RETRY_MAX_WAIT_MS: u64 = 5_000;

impl CatalogStore {
    pub fn new(writer: SqlitePool, reader: SqlitePool) -> Self {
        Self { writer, reader }
    }

    /// Insert a new track. Fails with `Error::Conflict` if `file_path`
    /// already exists.
    pub async fn insert(&self, track: &Track) -> Result<Track> {
        retry_on_lock("insert_track", LOCK_RETRY_MAX_WAIT_MS, || async {
            let mut tx = self.writer.begin().await.map_err(Error::Database)?;

            let result = sqlx::query(
                r#"
                INSERT INTO tracks (
                    file_path, title, artist, album, genre, track_number, year,
                    duration_seconds, file_size_bytes, bit_rate, sample_rate,
                    file_type, last_modified, date_added, fingerprint, fingerprint_duration
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&track.file_path)
            .bind(&track.title)
            .bind(&track.artist)
            .bind(&track.album)
            .bind(&track.genre)
            .bind(track.track_number)
            .bind(track.year)
            .bind(track.duration_seconds)
            .bind(track.file_size_bytes)
            .bind(track.bit_rate)
            .bind(track.sample_rate)
            .bind(&track.file_type)
            .bind(track.last_modified)
            .bind(track.date_added)
            .bind(&track.fingerprint)
            .bind(track.fingerprint_duration)
            .execute(&mut *tx)
            .await;

            let result = match result {
                Ok(r) => r,
                Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE constraint failed") => {
                    return Err(Error::Conflict(format!("track already exists: {}", track.file_path)));
                }
                Err(e) => return Err(Error::Database(e)),
            };

            let id = result.last_insert_rowid();
            tx.commit().await.map_err(Error::Database)?;

            let mut saved = track.clone();
            saved.id = id;
            Ok(saved)
        })
        .await
    }

    /// Update every mutable field of an existing track by id.
    pub async fn update(&self, track: &Track) -> Result<()> {
        retry_on_lock("update_track", LOCK_RETRY_MAX_WAIT_MS, || async {
            let mut tx = self.writer.begin().await.map_err(Error::Database)?;

            let rows = sqlx::query(
                r#"
                UPDATE tracks SET
                    file_path = ?, title = ?, artist = ?, album = ?, genre = ?,
                    track_number = ?, year = ?, duration_seconds = ?, file_size_bytes = ?,
                    bit_rate = ?, sample_rate = ?, file_type = ?, last_modified = ?,
                    fingerprint = ?, fingerprint_duration = ?
                WHERE id = ?
                "#,
            )
            .bind(&track.file_path)
            .bind(&track.title)
            .bind(&track.artist)
            .bind(&track.album)
            .bind(&track.genre)
            .bind(track.track_number)
            .bind(track.year)
            .bind(track.duration_seconds)
            .bind(track.file_size_bytes)
            .bind(track.bit_rate)
            .bind(track.sample_rate)
            .bind(&track.file_type)
            .bind(track.last_modified)
            .bind(&track.fingerprint)
            .bind(track.fingerprint_duration)
            .bind(track.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

            if rows == 0 {
                return Err(Error::NotFound(format!("track {}", track.id)));
            }

            tx.commit().await.map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    /// Persist a freshly generated fingerprint (C6's write path), without
    /// requiring the caller to round-trip the whole `Track`.
    pub async fn set_fingerprint(&self, id: i64, fingerprint: &str, fingerprint_duration: i64) -> Result<()> {
        retry_on_lock("set_fingerprint", LOCK_RETRY_MAX_WAIT_MS, || async {
            let mut tx = self.writer.begin().await.map_err(Error::Database)?;
            let rows = sqlx::query("UPDATE tracks SET fingerprint = ?, fingerprint_duration = ? WHERE id = ?")
                .bind(fingerprint)
                .bind(fingerprint_duration)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected();
            if rows == 0 {
                return Err(Error::NotFound(format!("track {id}")));
            }
            tx.commit().await.map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    /// Delete a track row. Does not touch the filesystem; best-effort
    /// unlink is the caller's responsibility (auto-resolver / delete
    /// endpoint), per §3's "deleting a Track deletes the underlying file
    /// (best-effort)" invariant living at the call site, not here.
    pub async fn delete(&self, id: i64) -> Result<()> {
        retry_on_lock("delete_track", LOCK_RETRY_MAX_WAIT_MS, || async {
            let mut tx = self.writer.begin().await.map_err(Error::Database)?;
            let rows = sqlx::query("DELETE FROM tracks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected();
            if rows == 0 {
                return Err(Error::NotFound(format!("track {id}")));
            }
            tx.commit().await.map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Track> {
        sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.reader)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("track {id}")))
    }

    pub async fn get_by_path(&self, file_path: &str) -> Result<Option<Track>> {
        sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.reader)
            .await
            .map_err(Error::Database)
    }

    /// All known file paths, used by the scanner to skip already-catalogued
    /// files (the catalog snapshot taken at session start, per §4.3).
    pub async fn known_paths(&self) -> Result<std::collections::HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM tracks")
            .fetch_all(&self.reader)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    pub async fn list_page(&self, offset: i64, limit: i64, filters: &TrackFilters) -> Result<Page<Track>> {
        let mut where_clauses = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(text) = &filters.text {
            where_clauses.push("(title LIKE ? OR artist LIKE ? OR album LIKE ?)");
            let pattern = format!("%{text}%");
            binds.push(pattern.clone());
            binds.push(pattern.clone());
            binds.push(pattern);
        }
        if let Some(title) = &filters.title {
            where_clauses.push("title LIKE ?");
            binds.push(format!("%{title}%"));
        }
        if let Some(artist) = &filters.artist {
            where_clauses.push("artist LIKE ?");
            binds.push(format!("%{artist}%"));
        }
        if let Some(album) = &filters.album {
            where_clauses.push("album LIKE ?");
            binds.push(format!("%{album}%"));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let items_sql = format!("SELECT * FROM tracks {where_sql} ORDER BY id LIMIT ? OFFSET ?");
        let mut items_query = sqlx::query_as::<_, Track>(&items_sql);
        for b in &binds {
            items_query = items_query.bind(b);
        }
        let items = items_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.reader)
            .await
            .map_err(Error::Database)?;

        let count_sql = format!("SELECT COUNT(*) FROM tracks {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b);
        }
        let total = count_query.fetch_one(&self.reader).await.map_err(Error::Database)?;

        Ok(Page { items, total })
    }

    pub async fn list_all(&self) -> Result<Vec<Track>> {
        sqlx::query_as::<_, Track>("SELECT * FROM tracks ORDER BY id")
            .fetch_all(&self.reader)
            .await
            .map_err(Error::Database)
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.reader)
            .await
            .map_err(Error::Database)
    }

    /// Tracks with no fingerprint yet, for C6 to process. Uses the partial
    /// index `idx_tracks_missing_fingerprint`.
    pub async fn iterate_missing_fingerprints(&self) -> Result<Vec<Track>> {
        sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE fingerprint IS NULL ORDER BY id")
            .fetch_all(&self.reader)
            .await
            .map_err(Error::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn track(path: &str) -> Track {
        Track::new_unsaved(path.into(), "mp3".into())
    }

    #[tokio::test]
    async fn insert_then_get_by_id_round_trips() {
        let store = open_in_memory().await.unwrap();
        let inserted = store.insert(&track("/a.mp3")).await.unwrap();
        assert!(inserted.id > 0);
        let fetched = store.get_by_id(inserted.id).await.unwrap();
        assert_eq!(fetched.file_path, "/a.mp3");
    }

    #[tokio::test]
    async fn duplicate_path_is_a_conflict() {
        let store = open_in_memory().await.unwrap();
        store.insert(&track("/a.mp3")).await.unwrap();
        let err = store.insert(&track("/a.mp3")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn update_changes_fields() {
        let store = open_in_memory().await.unwrap();
        let mut inserted = store.insert(&track("/a.mp3")).await.unwrap();
        inserted.title = Some("New Title".into());
        store.update(&inserted).await.unwrap();
        let fetched = store.get_by_id(inserted.id).await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("New Title"));
    }

    #[tokio::test]
    async fn delete_removes_row_and_is_not_reapplicable() {
        let store = open_in_memory().await.unwrap();
        let inserted = store.insert(&track("/a.mp3")).await.unwrap();
        store.delete(inserted.id).await.unwrap();
        assert!(store.get_by_id(inserted.id).await.is_err());
        assert!(matches!(store.delete(inserted.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_page_respects_filters_and_count() {
        let store = open_in_memory().await.unwrap();
        let mut a = track("/a.mp3");
        a.title = Some("Alpha".into());
        let mut b = track("/b.mp3");
        b.title = Some("Beta".into());
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let filters = TrackFilters { title: Some("Alpha".into()), ..Default::default() };
        let page = store.list_page(0, 10, &filters).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title.as_deref(), Some("Alpha"));
    }

    #[tokio::test]
    async fn missing_fingerprints_lists_only_unfingerprinted_tracks() {
        let store = open_in_memory().await.unwrap();
        let inserted = store.insert(&track("/a.mp3")).await.unwrap();
        store.insert(&track("/b.mp3")).await.unwrap();
        store.set_fingerprint(inserted.id, "1,2,3", 10).await.unwrap();

        let missing = store.iterate_missing_fingerprints().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].file_path, "/b.mp3");
    }

    #[tokio::test]
    async fn known_paths_reflects_current_catalog_snapshot() {
        let store = open_in_memory().await.unwrap();
        store.insert(&track("/a.mp3")).await.unwrap();
        let paths = store.known_paths().await.unwrap();
        assert!(paths.contains("/a.mp3"));
        assert!(!paths.contains("/b.mp3"));
    }
}
