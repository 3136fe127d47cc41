use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create job mappings table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_mappings (
            job_name VARCHAR(255) PRIMARY KEY,
            service_name VARCHAR(255) NOT NULL,
            url TEXT NOT NULL,
            port INTEGER NOT NULL,
            http_method VARCHAR(16)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job executions table; the unique idempotency key makes admission race-free
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_executions (
            id UUID PRIMARY KEY,
            status VARCHAR(32) NOT NULL,
            idempotency_key VARCHAR(255) UNIQUE,
            response TEXT,
            http_status INTEGER,
            started_at TIMESTAMPTZ NOT NULL,
            ended_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_executions_status ON job_executions(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_executions_started_at ON job_executions(started_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
