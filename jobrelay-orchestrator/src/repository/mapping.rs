//! Mapping Repository
//!
//! Resolves job names to downstream endpoints.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use jobrelay_core::domain::mapping::JobMapping;
use sqlx::PgPool;

use super::StoreError;

/// Job name to target endpoint lookup
#[async_trait]
pub trait MappingResolver: Send + Sync {
    /// Returns `None` when no mapping exists for the job name
    async fn resolve(&self, job_name: &str) -> Result<Option<JobMapping>, StoreError>;
}

/// Postgres-backed job mappings
#[derive(Clone)]
pub struct PgMappingRepository {
    pool: PgPool,
}

impl PgMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or replace the mapping for a job name
    pub async fn upsert(&self, mapping: &JobMapping) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_mappings (job_name, service_name, url, port, http_method)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_name) DO UPDATE SET
                service_name = EXCLUDED.service_name,
                url = EXCLUDED.url,
                port = EXCLUDED.port,
                http_method = EXCLUDED.http_method
            "#,
        )
        .bind(&mapping.job_name)
        .bind(&mapping.service_name)
        .bind(&mapping.url)
        .bind(i32::from(mapping.port))
        .bind(&mapping.http_method)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert every mapping in a JSON array file, returning how many were written
    pub async fn seed_from_file(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read job mappings file {}", path.display()))?;
        let mappings = parse_mappings(&raw)
            .with_context(|| format!("invalid job mappings file {}", path.display()))?;

        for mapping in &mappings {
            self.upsert(mapping).await?;
            tracing::debug!(
                "Seeded job mapping {} -> {}",
                mapping.job_name,
                mapping.endpoint_url()
            );
        }

        Ok(mappings.len())
    }
}

/// Parse a JSON array of job mappings
pub fn parse_mappings(raw: &str) -> Result<Vec<JobMapping>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[async_trait]
impl MappingResolver for PgMappingRepository {
    async fn resolve(&self, job_name: &str) -> Result<Option<JobMapping>, StoreError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT job_name, service_name, url, port, http_method
            FROM job_mappings
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobMapping::try_from).transpose()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MappingRow {
    job_name: String,
    service_name: String,
    url: String,
    port: i32,
    http_method: Option<String>,
}

impl TryFrom<MappingRow> for JobMapping {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port).map_err(|_| {
            StoreError::InvalidRecord(format!(
                "mapping {} has out-of-range port {}",
                row.job_name, row.port
            ))
        })?;

        Ok(JobMapping {
            job_name: row.job_name,
            service_name: row.service_name,
            url: row.url,
            port,
            http_method: row.http_method,
        })
    }
}
