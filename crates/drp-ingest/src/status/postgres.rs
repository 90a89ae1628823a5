//! Postgres status store
//!
//! Deposit records are stored one row per field and job completion one row
//! per object, so every write the pipeline makes is a single-row upsert.
//! Concurrent readers (monitoring, admin UI) never observe a half-applied
//! update, and a crashed run resumes from exactly the rows it managed to
//! write.

use super::{DepositField, DepositState, DepositStatus, JobProgress, StatusStore};
use crate::error::StatusError;
use async_trait::async_trait;
use drp_common::types::{DepositId, JobId, Pid};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use tracing::instrument;
use uuid::Uuid;

/// Status store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub async fn connect(database_url: &str) -> Result<Self, StatusError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StatusError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn deposit_status(&self, deposit_id: &DepositId) -> Result<DepositStatus, StatusError> {
        let rows = sqlx::query("SELECT field, value FROM deposit_status WHERE deposit_id = $1")
            .bind(*deposit_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(StatusError::DepositNotFound(*deposit_id));
        }

        let mut fields = HashMap::with_capacity(rows.len());
        for row in rows {
            fields.insert(
                row.try_get::<String, _>("field")?,
                row.try_get::<String, _>("value")?,
            );
        }
        DepositStatus::from_fields(*deposit_id, &fields)
    }

    #[instrument(skip(self, fields), fields(deposit_id = %deposit_id))]
    async fn set_deposit_fields(
        &self,
        deposit_id: &DepositId,
        fields: &[(DepositField, String)],
    ) -> Result<(), StatusError> {
        for (field, value) in fields {
            sqlx::query(
                "INSERT INTO deposit_status (deposit_id, field, value) VALUES ($1, $2, $3) \
                 ON CONFLICT (deposit_id, field) \
                 DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
            )
            .bind(*deposit_id.as_uuid())
            .bind(field.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn poll_deposit_state(
        &self,
        deposit_id: &DepositId,
    ) -> Result<DepositState, StatusError> {
        let row =
            sqlx::query("SELECT value FROM deposit_status WHERE deposit_id = $1 AND field = $2")
                .bind(*deposit_id.as_uuid())
                .bind(DepositField::State.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => row.try_get::<String, _>("value")?.parse(),
            None => Err(StatusError::DepositNotFound(*deposit_id)),
        }
    }

    async fn job_completion_set(&self, job_id: &JobId) -> Result<HashSet<Pid>, StatusError> {
        let rows = sqlx::query("SELECT object_id FROM job_completed_objects WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(Pid::from(row.try_get::<Uuid, _>("object_id")?)))
            .collect()
    }

    async fn is_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<bool, StatusError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM job_completed_objects WHERE job_id = $1 AND object_id = $2",
        )
        .bind(job_id.as_str())
        .bind(*pid.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), fields(job_id = %job_id, object_id = %pid))]
    async fn mark_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<(), StatusError> {
        sqlx::query(
            "INSERT INTO job_completed_objects (job_id, object_id) VALUES ($1, $2) \
             ON CONFLICT (job_id, object_id) DO NOTHING",
        )
        .bind(job_id.as_str())
        .bind(*pid.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        sqlx::query(
            "INSERT INTO job_counters (job_id, completed, total) VALUES ($1, $2, 0) \
             ON CONFLICT (job_id) \
             DO UPDATE SET completed = job_counters.completed + EXCLUDED.completed, \
                           updated_at = now()",
        )
        .bind(job_id.as_str())
        .bind(to_db_count(n))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        sqlx::query(
            "INSERT INTO job_counters (job_id, completed, total) VALUES ($1, $2, 0) \
             ON CONFLICT (job_id) \
             DO UPDATE SET completed = EXCLUDED.completed, updated_at = now()",
        )
        .bind(job_id.as_str())
        .bind(to_db_count(n))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_total_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        sqlx::query(
            "INSERT INTO job_counters (job_id, completed, total) VALUES ($1, 0, $2) \
             ON CONFLICT (job_id) \
             DO UPDATE SET total = EXCLUDED.total, updated_at = now()",
        )
        .bind(job_id.as_str())
        .bind(to_db_count(n))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn job_progress(&self, job_id: &JobId) -> Result<JobProgress, StatusError> {
        let row = sqlx::query("SELECT completed, total FROM job_counters WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(JobProgress {
                completed: from_db_count(row.try_get("completed")?),
                total: from_db_count(row.try_get("total")?),
            }),
            None => Ok(JobProgress::default()),
        }
    }
}

fn to_db_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    async fn connected_store() -> PgStatusStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
        let store = PgStatusStore::connect(&url).await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires Postgres; set DATABASE_URL and run with --ignored"]
    async fn test_deposit_field_upsert_roundtrip() {
        let store = connected_store().await;
        let deposit_id = DepositId::new();

        store
            .set_deposit_fields(
                &deposit_id,
                &[
                    (DepositField::State, "queued".to_string()),
                    (DepositField::DepositorName, "depositor".to_string()),
                ],
            )
            .await
            .unwrap();
        store
            .set_deposit_fields(&deposit_id, &[(DepositField::State, "running".to_string())])
            .await
            .unwrap();

        let status = store.deposit_status(&deposit_id).await.unwrap();
        assert_eq!(status.state, DepositState::Running);
        assert_eq!(status.depositor_name.as_deref(), Some("depositor"));
        assert_eq!(
            store.poll_deposit_state(&deposit_id).await.unwrap(),
            DepositState::Running
        );
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires Postgres; set DATABASE_URL and run with --ignored"]
    async fn test_completion_set_and_counters() {
        let store = connected_store().await;
        let job_id = JobId::new(format!("ingest:{}", Uuid::new_v4()));
        let pid = Pid::new();

        assert!(!store.is_object_completed(&job_id, &pid).await.unwrap());
        store.mark_object_completed(&job_id, &pid).await.unwrap();
        store.mark_object_completed(&job_id, &pid).await.unwrap();
        assert!(store.is_object_completed(&job_id, &pid).await.unwrap());
        assert_eq!(store.job_completion_set(&job_id).await.unwrap().len(), 1);

        store.set_total_completion(&job_id, 4).await.unwrap();
        store.increment_completion(&job_id, 1).await.unwrap();
        store.increment_completion(&job_id, 2).await.unwrap();
        let progress = store.job_progress(&job_id).await.unwrap();
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.total, 4);
    }
}
