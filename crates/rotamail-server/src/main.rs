//! Rotamail - campaign dispatcher entry point

use anyhow::Result;
use rotamail_api::AppState;
use rotamail_common::config::Config;
use rotamail_core::dispatch::{
    DispatchSettings, HttpTokenProvider, LinkTracker, SmtpMailer, SendWorker,
};
use rotamail_core::queue::JobQueue;
use rotamail_storage::db::DatabasePool;
use rotamail_storage::repository::{DbAccountStore, DbCampaignStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Rotamail...");

    let config = Config::load()?;

    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    db_pool.migrate().await?;
    info!("Database migrations completed");

    let accounts = Arc::new(DbAccountStore::new(db_pool.clone()));
    let campaigns = Arc::new(DbCampaignStore::new(db_pool.clone()));
    let queue = Arc::new(JobQueue::new(db_pool.clone(), config.queue.clone()));
    let tokens = Arc::new(HttpTokenProvider::new(config.oauth.clone()));
    let tracker = LinkTracker::new(
        config.server.base_url.clone(),
        config.tracking.secret_key.clone(),
    );

    let mailer = Arc::new(SmtpMailer::new(Duration::from_secs(
        config.mailer.smtp_timeout_secs,
    )));
    let worker = Arc::new(SendWorker::new(
        campaigns.clone(),
        accounts.clone(),
        mailer,
        tokens.clone(),
        queue.clone(),
        tracker.clone(),
        DispatchSettings::from(&config.mailer),
    ));

    // Start queue processor
    let queue_handle = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue.run(worker).await;
        })
    };

    // Start API server
    let api_handle = {
        let state = Arc::new(AppState {
            db_pool: db_pool.clone(),
            accounts,
            campaigns,
            jobs: queue.clone(),
            queue: queue.clone(),
            tokens,
            tracker,
            oauth: config.oauth.clone(),
        });
        let bind = format!("{}:{}", config.server.bind_address, config.server.port);
        tokio::spawn(async move {
            let app = rotamail_api::create_router(state);
            let listener = match tokio::net::TcpListener::bind(&bind).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!("Failed to bind API server on {}: {}", bind, e);
                    return;
                }
            };
            info!("Starting API server on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("Rotamail started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    queue_handle.abort();
    api_handle.abort();

    info!("Rotamail shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rotamail=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
