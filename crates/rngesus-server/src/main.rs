//! # rngesus-server
//!
//! HTTP front end for the RNGesus tabletop generator.
//!
//! This binary provides:
//! - **Campaign, character and chat routes** (axum) that stream generated
//!   records as newline-delimited JSON while the model is still writing
//! - **SQLite persistence** for every record a session emits
//! - **Per-IP rate limiting** on the routes that call the model

mod api;
mod campaign_locks;
mod config;
mod error;
mod game;
mod rate_limit;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use rngesus_engine::{ChatCompletionBackend, Orchestrator};
use rngesus_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::game::GameService;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments set the variables directly.
    let dotenv = dotenvy::dotenv();

    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,rngesus_server=debug,rngesus_engine=debug")
        }))
        .init();

    info!("Starting RNGesus server v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set, generation requests will fail");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Database ready");
    }

    let backend = ChatCompletionBackend::new(config.backend_config())?;
    let orchestrator = Orchestrator::new(Arc::new(backend), config.update_frequency);
    let game = Arc::new(GameService::new(db, orchestrator));

    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);

    let http_addr = config.http_addr;
    let app_state = AppState {
        game,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Evict buckets idle for more than 10 minutes, every 5 minutes.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.purge_stale(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
