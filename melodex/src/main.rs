//! melodex - personal music-library deduplication engine.
//!
//! Thin HTTP bootstrap: parse CLI/env config, load the active profile,
//! open its catalog, and serve the router built by the library crate.
//! Grounded on `wkmp-ai/src/main.rs`'s `#[tokio::main]` bootstrap shape,
//! adapted to `clap` for CLI parsing and profile-driven database location
//! instead of a fixed path.

use anyhow::Result;
use clap::Parser;
use melodex::{build_router, db, models::ProfileStore, AppState};
use melodex_common::paths;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "melodex", version, about = "Personal music-library deduplication engine")]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, env = "MELODEX_PORT", default_value_t = 7878)]
    port: u16,

    /// Directory holding the profiles file and the default database, when
    /// neither is overridden individually.
    #[arg(long, env = "MELODEX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Explicit profiles file path, overriding `data_dir`.
    #[arg(long, env = "MELODEX_PROFILES_FILE")]
    profiles_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(paths::default_data_dir);
    let profiles_path = cli.profiles_file.clone().unwrap_or_else(|| data_dir.join("melodex-profiles.toml"));
    let default_db_path = data_dir.join("library.db");

    let profiles = ProfileStore::load_or_init(profiles_path, default_db_path)?;
    let active = profiles.active()?.clone();
    info!(profile = %active.id, database = %active.database_path.display(), "activating profile");

    let catalog = db::open(&active.database_path).await?;
    let state = AppState::new(catalog, profiles);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "melodex listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Waits for Ctrl+C so `axum::serve` can drain in-flight requests before
/// the process exits, per SPEC_FULL §11's graceful-shutdown addition.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}
