//! In-memory status store
//!
//! Backs tests and single-process runs that have no database configured.
//! Holds the same record shapes as the Postgres store, keyed the same way.

use super::{DepositField, DepositState, DepositStatus, JobProgress, StatusStore};
use crate::error::StatusError;
use async_trait::async_trait;
use drp_common::types::{DepositId, JobId, Pid};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    deposits: HashMap<DepositId, HashMap<String, String>>,
    completed: HashMap<JobId, HashSet<Pid>>,
    counters: HashMap<JobId, JobProgress>,
}

/// Status store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw field map of a deposit record, as a monitoring reader sees it.
    pub async fn raw_fields(&self, deposit_id: &DepositId) -> Option<HashMap<String, String>> {
        self.inner.read().await.deposits.get(deposit_id).cloned()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn deposit_status(&self, deposit_id: &DepositId) -> Result<DepositStatus, StatusError> {
        let inner = self.inner.read().await;
        let fields = inner
            .deposits
            .get(deposit_id)
            .ok_or(StatusError::DepositNotFound(*deposit_id))?;
        DepositStatus::from_fields(*deposit_id, fields)
    }

    async fn set_deposit_fields(
        &self,
        deposit_id: &DepositId,
        fields: &[(DepositField, String)],
    ) -> Result<(), StatusError> {
        let mut inner = self.inner.write().await;
        let record = inner.deposits.entry(*deposit_id).or_default();
        for (field, value) in fields {
            record.insert(field.as_str().to_string(), value.clone());
        }
        Ok(())
    }

    async fn poll_deposit_state(
        &self,
        deposit_id: &DepositId,
    ) -> Result<DepositState, StatusError> {
        let inner = self.inner.read().await;
        inner
            .deposits
            .get(deposit_id)
            .and_then(|fields| fields.get(DepositField::State.as_str()))
            .ok_or(StatusError::DepositNotFound(*deposit_id))?
            .parse()
    }

    async fn job_completion_set(&self, job_id: &JobId) -> Result<HashSet<Pid>, StatusError> {
        let inner = self.inner.read().await;
        Ok(inner.completed.get(job_id).cloned().unwrap_or_default())
    }

    async fn is_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<bool, StatusError> {
        let inner = self.inner.read().await;
        Ok(inner
            .completed
            .get(job_id)
            .is_some_and(|set| set.contains(pid)))
    }

    async fn mark_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<(), StatusError> {
        let mut inner = self.inner.write().await;
        inner.completed.entry(job_id.clone()).or_default().insert(*pid);
        Ok(())
    }

    async fn increment_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        let mut inner = self.inner.write().await;
        let progress = inner.counters.entry(job_id.clone()).or_default();
        progress.completed += n;
        Ok(())
    }

    async fn set_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        let mut inner = self.inner.write().await;
        inner.counters.entry(job_id.clone()).or_default().completed = n;
        Ok(())
    }

    async fn set_total_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        let mut inner = self.inner.write().await;
        inner.counters.entry(job_id.clone()).or_default().total = n;
        Ok(())
    }

    async fn job_progress(&self, job_id: &JobId) -> Result<JobProgress, StatusError> {
        let inner = self.inner.read().await;
        Ok(inner.counters.get(job_id).copied().unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_deposit_is_not_found() {
        let store = MemoryStatusStore::new();
        let err = store.deposit_status(&DepositId::new()).await.unwrap_err();
        assert!(matches!(err, StatusError::DepositNotFound(_)));
    }

    #[tokio::test]
    async fn test_partial_field_update_preserves_others() {
        let store = MemoryStatusStore::new();
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
    }

    #[tokio::test]
    async fn test_mark_completed_is_idempotent() {
        let store = MemoryStatusStore::new();
        let job_id = JobId::new("ingest:test");
        let pid = Pid::new();

        store.mark_object_completed(&job_id, &pid).await.unwrap();
        store.mark_object_completed(&job_id, &pid).await.unwrap();

        assert!(store.is_object_completed(&job_id, &pid).await.unwrap());
        assert_eq!(store.job_completion_set(&job_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counters_accumulate() {
        let store = MemoryStatusStore::new();
        let job_id = JobId::new("ingest:test");

        store.set_total_completion(&job_id, 5).await.unwrap();
        store.increment_completion(&job_id, 1).await.unwrap();
        store.increment_completion(&job_id, 2).await.unwrap();

        let progress = store.job_progress(&job_id).await.unwrap();
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.total, 5);
    }
}
