//! Deposit and job progress records
//!
//! The status store is the source of truth for resume and for the
//! cooperative pause/cancel signal. It holds two kinds of records: one
//! status record per deposit (state, depositor, destination, counters) and
//! one progress record per job attempt (a set of completed object ids plus
//! running counters). Other processes read the same records, so every write
//! is atomic per field or set member.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStatusStore;
pub use postgres::PgStatusStore;

use crate::error::StatusError;
use async_trait::async_trait;
use drp_common::types::{DepositId, JobId, Pid};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lifecycle state of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositState {
    Queued,
    Running,
    Paused,
    Failed,
    Finished,
    Cancelled,
}

impl DepositState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositState::Queued => "queued",
            DepositState::Running => "running",
            DepositState::Paused => "paused",
            DepositState::Failed => "failed",
            DepositState::Finished => "finished",
            DepositState::Cancelled => "cancelled",
        }
    }

    /// Whether the ingestor should keep walking when it polls this state.
    pub fn allows_progress(&self) -> bool {
        matches!(self, DepositState::Queued | DepositState::Running)
    }
}

impl std::str::FromStr for DepositState {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DepositState::Queued),
            "running" => Ok(DepositState::Running),
            "paused" => Ok(DepositState::Paused),
            "failed" => Ok(DepositState::Failed),
            "finished" => Ok(DepositState::Finished),
            "cancelled" => Ok(DepositState::Cancelled),
            other => Err(StatusError::UnknownState(other.to_string())),
        }
    }
}

impl std::fmt::Display for DepositState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Field keys of the per-deposit status record
///
/// The string forms are stable; the admin UI and monitoring read the same
/// records by these names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepositField {
    State,
    DepositorName,
    DestinationContainerId,
    PermissionGroups,
    IngestedObjects,
    TotalObjects,
    ErrorMessage,
}

impl DepositField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositField::State => "state",
            DepositField::DepositorName => "depositorName",
            DepositField::DestinationContainerId => "destinationContainerId",
            DepositField::PermissionGroups => "permissionGroups",
            DepositField::IngestedObjects => "ingestedObjects",
            DepositField::TotalObjects => "totalObjects",
            DepositField::ErrorMessage => "errorMessage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "state" => Some(DepositField::State),
            "depositorName" => Some(DepositField::DepositorName),
            "destinationContainerId" => Some(DepositField::DestinationContainerId),
            "permissionGroups" => Some(DepositField::PermissionGroups),
            "ingestedObjects" => Some(DepositField::IngestedObjects),
            "totalObjects" => Some(DepositField::TotalObjects),
            "errorMessage" => Some(DepositField::ErrorMessage),
            _ => None,
        }
    }
}

impl std::fmt::Display for DepositField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed view of one deposit's status record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositStatus {
    pub deposit_id: DepositId,
    pub state: DepositState,
    pub depositor_name: Option<String>,
    pub destination_container_id: Option<Pid>,
    pub permission_groups: Option<String>,
    pub ingested_objects: u64,
    pub total_objects: Option<u64>,
    pub error_message: Option<String>,
}

impl DepositStatus {
    /// Build the typed view from the raw field map of one record.
    pub fn from_fields(
        deposit_id: DepositId,
        fields: &HashMap<String, String>,
    ) -> Result<Self, StatusError> {
        let state = fields
            .get(DepositField::State.as_str())
            .ok_or(StatusError::DepositNotFound(deposit_id))?
            .parse()?;

        let destination_container_id = fields
            .get(DepositField::DestinationContainerId.as_str())
            .map(|value| {
                value.parse::<Pid>().map_err(|_| StatusError::InvalidField {
                    field: DepositField::DestinationContainerId.as_str(),
                    value: value.clone(),
                })
            })
            .transpose()?;

        Ok(Self {
            deposit_id,
            state,
            depositor_name: fields.get(DepositField::DepositorName.as_str()).cloned(),
            destination_container_id,
            permission_groups: fields.get(DepositField::PermissionGroups.as_str()).cloned(),
            ingested_objects: parse_counter(fields, DepositField::IngestedObjects)?.unwrap_or(0),
            total_objects: parse_counter(fields, DepositField::TotalObjects)?,
            error_message: fields.get(DepositField::ErrorMessage.as_str()).cloned(),
        })
    }
}

fn parse_counter(
    fields: &HashMap<String, String>,
    field: DepositField,
) -> Result<Option<u64>, StatusError> {
    fields
        .get(field.as_str())
        .map(|value| {
            value.parse::<u64>().map_err(|_| StatusError::InvalidField {
                field: field.as_str(),
                value: value.clone(),
            })
        })
        .transpose()
}

/// Running counters of one job attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub completed: u64,
    pub total: u64,
}

/// Progress and status persistence shared across job restarts
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Full status record of a deposit.
    async fn deposit_status(&self, deposit_id: &DepositId) -> Result<DepositStatus, StatusError>;

    /// Partial update of a deposit record, last write wins per field.
    ///
    /// Creates the record when it does not exist yet.
    async fn set_deposit_fields(
        &self,
        deposit_id: &DepositId,
        fields: &[(DepositField, String)],
    ) -> Result<(), StatusError>;

    /// Current state only. Cheap, safe to call at every traversal step.
    async fn poll_deposit_state(&self, deposit_id: &DepositId)
        -> Result<DepositState, StatusError>;

    /// Ids of every object the job has completed so far.
    async fn job_completion_set(&self, job_id: &JobId) -> Result<HashSet<Pid>, StatusError>;

    async fn is_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<bool, StatusError>;

    /// Record one completed object. Idempotent.
    async fn mark_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<(), StatusError>;

    async fn increment_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError>;

    async fn set_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError>;

    async fn set_total_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError>;

    async fn job_progress(&self, job_id: &JobId) -> Result<JobProgress, StatusError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing_roundtrip() {
        for state in [
            DepositState::Queued,
            DepositState::Running,
            DepositState::Paused,
            DepositState::Failed,
            DepositState::Finished,
            DepositState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<DepositState>().unwrap(), state);
        }
        assert!(matches!(
            "archived".parse::<DepositState>(),
            Err(StatusError::UnknownState(_))
        ));
    }

    #[test]
    fn test_only_queued_and_running_allow_progress() {
        assert!(DepositState::Running.allows_progress());
        assert!(DepositState::Queued.allows_progress());
        assert!(!DepositState::Paused.allows_progress());
        assert!(!DepositState::Cancelled.allows_progress());
    }

    #[test]
    fn test_status_from_fields() {
        let deposit_id = DepositId::new();
        let destination = Pid::new();
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), "running".to_string());
        fields.insert("depositorName".to_string(), "depositor".to_string());
        fields.insert(
            "destinationContainerId".to_string(),
            destination.to_string(),
        );
        fields.insert("ingestedObjects".to_string(), "3".to_string());

        let status = DepositStatus::from_fields(deposit_id, &fields).unwrap();
        assert_eq!(status.state, DepositState::Running);
        assert_eq!(status.destination_container_id, Some(destination));
        assert_eq!(status.ingested_objects, 3);
        assert_eq!(status.total_objects, None);
    }

    #[test]
    fn test_status_rejects_malformed_counter() {
        let mut fields = HashMap::new();
        fields.insert("state".to_string(), "running".to_string());
        fields.insert("ingestedObjects".to_string(), "many".to_string());

        let err = DepositStatus::from_fields(DepositId::new(), &fields).unwrap_err();
        assert!(matches!(err, StatusError::InvalidField { field, .. } if field == "ingestedObjects"));
    }
}
