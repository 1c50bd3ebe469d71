use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::models::job::Job;
use crate::domain::ports::{JobRepository, QueueCounts};
use crate::error::AppError;

pub struct PostgresJobRepo {
    pool: PgPool,
}

impl PostgresJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepo {
    async fn enqueue(&self, job: &Job) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (id, name, payload, priority, attempts, max_attempts, status, last_error, execute_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.status.as_str())
        .bind(&job.last_error)
        .bind(job.execute_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn claim_due(
        &self,
        name: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, AppError> {
        // SKIP LOCKED keeps concurrent workers from double-claiming a job.
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'PROCESSING', attempts = attempts + 1, updated_at = $1
            WHERE id IN (
                SELECT id
                FROM jobs
                WHERE name = $2 AND status = 'PENDING' AND execute_at <= $1
                ORDER BY priority DESC, execute_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE jobs SET status = 'COMPLETED', updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'FAILED', last_error = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    async fn retry(
        &self,
        id: Uuid,
        error: &str,
        execute_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'PENDING', last_error = $1, execute_at = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(error)
        .bind(execute_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<QueueCounts, AppError> {
        sqlx::query_as::<_, QueueCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'PENDING' AND execute_at <= $1) AS waiting,
                COUNT(*) FILTER (WHERE status = 'PENDING' AND execute_at > $1) AS delayed,
                COUNT(*) FILTER (WHERE status = 'PROCESSING') AS active,
                COUNT(*) FILTER (WHERE status = 'COMPLETED') AS completed,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS failed
            FROM jobs
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn purge_finished(
        &self,
        keep_completed: i64,
        keep_failed: i64,
    ) -> Result<u64, AppError> {
        let completed = sqlx::query(
            "DELETE FROM jobs WHERE id IN (
                SELECT id FROM jobs WHERE status = 'COMPLETED'
                ORDER BY updated_at DESC OFFSET $1
            )",
        )
        .bind(keep_completed)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        let failed = sqlx::query(
            "DELETE FROM jobs WHERE id IN (
                SELECT id FROM jobs WHERE status = 'FAILED'
                ORDER BY updated_at DESC OFFSET $1
            )",
        )
        .bind(keep_failed)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(completed.rows_affected() + failed.rows_affected())
    }
}
