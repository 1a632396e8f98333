//! # Taskboard Worker
//!
//! Maintenance process for Taskboard. It applies pending migrations on
//! startup and then purges expired sessions until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! TASKBOARD__DATABASE__URL=postgresql://localhost/taskboard cargo run -p taskboard-worker
//! ```

use std::sync::Arc;
use taskboard_shared::auth::PgSessionStore;
use taskboard_shared::config::Config;
use taskboard_shared::db::{migrations::run_migrations, pool::create_pool};
use taskboard_worker::sweeper::SessionSweeper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard_worker=debug,taskboard_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Taskboard Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let pool = create_pool(config.database_config()).await?;
    run_migrations(&pool).await?;

    let sweeper = SessionSweeper::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        config.session.purge_interval(),
    );
    let shutdown = sweeper.shutdown_token();
    let handle = tokio::spawn(async move { sweeper.run().await });

    tracing::info!("Worker ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping sweeper...");

    shutdown.cancel();
    handle.await?;
    pool.close().await;

    Ok(())
}
