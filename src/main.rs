use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use campus_hub::app::{app, AppState};
use campus_hub::config;
use campus_hub::database::DatabaseManager;
use campus_hub::services::{ScheduleService, SyncRunService};
use campus_hub::sync::SyncScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    info!("Starting Campus Hub in {:?} mode", config.environment);

    let pool = DatabaseManager::connect().await.context("connecting to database")?;
    if config.database.run_migrations {
        DatabaseManager::migrate(&pool).await.context("applying migrations")?;
    }

    let interrupted = SyncRunService::new(pool.clone()).fail_interrupted().await?;
    if interrupted > 0 {
        warn!("Marked {} interrupted sync run(s) as failed", interrupted);
    }

    let state = AppState::new(pool.clone(), config).context("building application state")?;

    if config.sync.scheduler_enabled {
        let scheduler = SyncScheduler::new(
            Arc::clone(&state.orchestrator),
            ScheduleService::new(pool.clone()),
            Duration::from_secs(config.sync.scheduler_reload_secs.max(1)),
        );
        scheduler.start().await.context("starting sync scheduler")?;
    } else {
        info!("Sync scheduler disabled");
    }

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Campus Hub listening on http://{}", bind_addr);

    axum::serve(listener, app(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
