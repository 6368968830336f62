mod analysis;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod jobs;
mod state;
mod types;
mod validate;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::auth::login::seed_admin;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::CacheWarmer;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let addr = cfg.bind_addr();
    let state = ApiState::new(cfg, store)?;
    seed_admin(&state.store, &state.creds, &state.config).await?;

    // --- Background jobs ---
    let warmer = CacheWarmer::new(
        state.store.clone(),
        state.cache.clone(),
        state.creds.clone(),
        state.health.clone(),
    );
    tokio::spawn(async move { warmer.run().await });

    let sync = state.sync.clone();
    tokio::spawn(async move { sync.run().await });

    // --- REST API ---
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("REST API listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
