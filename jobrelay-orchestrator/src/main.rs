use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use config::Config;
use repository::{PgExecutionStore, PgMappingRepository};
use service::{ForwardingClient, Orchestrator, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobrelay_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting JobRelay Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let mappings = Arc::new(PgMappingRepository::new(pool.clone()));
    if let Some(path) = &config.mappings_file {
        let count = mappings.seed_from_file(path).await?;
        tracing::info!("Seeded {} job mappings from {}", count, path.display());
    }

    let forwarder =
        ForwardingClient::new(&config.forwarding).context("Failed to build forwarding client")?;

    let orchestrator = Orchestrator::new(
        Arc::new(PgExecutionStore::new(pool)),
        mappings,
        Arc::new(forwarder),
        WorkerPool::new(config.worker_pool),
    );

    // Build router with all API endpoints
    let app = api::create_router(Arc::new(orchestrator));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
