// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use crate::{create_pool, run_migrations};
use async_trait::async_trait;
use coursework_core::domain::{Job, JobStatus, PaperRequest, PaperResult};
use coursework_core::error::Result;
use coursework_core::port::JobStore;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Durable job store: one row per job, request and result kept as JSON
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `database_url` and migrate it
    pub async fn initialize(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        info!(url = %database_url, "Job store ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let input = serde_json::to_string(&job.input)?;
        let result = job.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, input, progress, current_step,
                result, error, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                input = excluded.input,
                progress = excluded.progress,
                current_step = excluded.current_step,
                result = excluded.result,
                error = excluded.error,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(&input)
        .bind(i64::from(job.progress))
        .bind(&job.current_step)
        .bind(&result)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %job.id, status = %job.status, progress = job.progress, "Job saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_older_than(&self, cutoff_millis: i64, statuses: &[JobStatus]) -> Result<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "DELETE FROM jobs WHERE completed_at IS NOT NULL AND completed_at < ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(cutoff_millis);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    status: String,
    input: String,
    progress: i64,
    current_step: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status: JobStatus = self.status.parse()?;
        let input: PaperRequest = serde_json::from_str(&self.input)?;
        let result: Option<PaperResult> = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let progress = self.progress.clamp(0, 100) as u8;

        Ok(Job {
            id: self.id,
            status,
            input,
            progress,
            current_step: self.current_step,
            result,
            error: self.error,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}
