//! Fund engine — entry point.
//!
//! Opens the SQLite ledger, applies migrations and serves the REST API until
//! Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fund_engine::api::{self, ApiState};
use fund_engine::config::Config;
use fund_engine::db;
use fund_engine::directory::{Directory, StaticDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let directory: Arc<dyn Directory> = match &config.directory_file {
        Some(path) => Arc::new(StaticDirectory::load(path)?),
        None => {
            warn!("DIRECTORY_FILE not set; summaries will carry no display names");
            Arc::new(StaticDirectory::default())
        }
    };

    // ─── Shutdown signal ──────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        });
    }

    // ─── REST API ─────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.api_port);
    let app = api::router(Arc::new(ApiState {
        pool: pool.clone(),
        config,
        directory,
    }));

    info!("API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    pool.close().await;
    info!("Fund engine stopped");
    Ok(())
}
