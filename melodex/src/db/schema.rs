//! Schema creation and idempotent migrations for the catalog database.
//!
//! Version is tracked in a `schema_version` table; each migration step is
//! `CREATE TABLE IF NOT EXISTS` / `ALTER TABLE ... ADD COLUMN` guarded so
//! re-running against an already-migrated database is a no-op.

use melodex_common::Result;
use sqlx::{Row, SqlitePool};

const CURRENT_SCHEMA_VERSION: i64 = 1;

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    let version = current_version(pool).await?;

    if version < 1 {
        create_tracks_table(pool).await?;
        record_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("v"))
}

async fn record_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            title TEXT,
            artist TEXT,
            album TEXT,
            genre TEXT,
            track_number INTEGER,
            year INTEGER,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            file_size_bytes INTEGER NOT NULL DEFAULT 0,
            bit_rate INTEGER NOT NULL DEFAULT 0,
            sample_rate INTEGER NOT NULL DEFAULT 0,
            file_type TEXT NOT NULL,
            last_modified TIMESTAMP NOT NULL,
            date_added TIMESTAMP NOT NULL,
            fingerprint TEXT,
            fingerprint_duration INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tracks_missing_fingerprint ON tracks(id) WHERE fingerprint IS NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub fn schema_version() -> i64 {
    CURRENT_SCHEMA_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn creates_tracks_table() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
