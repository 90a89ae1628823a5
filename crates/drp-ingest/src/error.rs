//! Error types for deposit ingestion
//!
//! Interruption and failure are deliberately distinct types: a paused or
//! cancelled run is not an error and must not be reported as one, while a
//! failed run carries the originating cause for the operator.

use crate::acl::Permission;
use drp_common::types::{DepositId, DigestAlgorithm, Pid};
use thiserror::Error;

/// Why a run stopped without failing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    /// An operator paused the deposit
    Paused,
    /// An operator cancelled the deposit
    Cancelled,
    /// The host process asked the job to stop
    Shutdown,
}

impl InterruptCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptCause::Paused => "paused",
            InterruptCause::Cancelled => "cancelled",
            InterruptCause::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome of an ingestion run that did not complete
#[derive(Error, Debug)]
pub enum IngestError {
    /// The run stopped at a safe point and can be resumed later.
    ///
    /// No transaction is left open and no completion marks are lost.
    #[error("Ingestion of deposit {deposit_id} interrupted: {cause}")]
    Interrupted {
        deposit_id: DepositId,
        cause: InterruptCause,
    },

    /// The run hit an unrecoverable error.
    ///
    /// Objects completed before the failure remain committed; the next
    /// invocation resumes from the first uncompleted node.
    #[error("Ingestion of deposit {deposit_id} failed: {source}")]
    Failed {
        deposit_id: DepositId,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub fn interrupted(deposit_id: DepositId, cause: InterruptCause) -> Self {
        Self::Interrupted { deposit_id, cause }
    }

    pub fn failed(deposit_id: DepositId, source: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            deposit_id,
            source: source.into(),
        }
    }

    /// True for the resumable (non-error) outcome
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// Agent lacks the permission required for a repository write.
///
/// Raised before any write for the affected subtree; never retried.
#[derive(Error, Debug, Clone)]
#[error("Agent '{agent}' does not have permission '{permission}' on container {container}")]
pub struct AccessRestrictionError {
    pub agent: String,
    pub permission: Permission,
    pub container: Pid,
}

/// Errors raised while copying a staged binary into permanent storage
#[derive(Error, Debug)]
pub enum TransferError {
    /// The transferred bytes did not match a declared digest, even after
    /// the in-transfer retry budget was spent.
    #[error(
        "Checksum mismatch ({algorithm}) after {attempts} attempt(s): declared {declared}, computed {computed}"
    )]
    ChecksumMismatch {
        algorithm: DigestAlgorithm,
        declared: String,
        computed: String,
        attempts: u32,
    },

    #[error("Staged binary not found: {0}")]
    SourceMissing(String),

    #[error("Binary store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the transaction manager
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Only one transaction may be active per job at a time
    #[error("A transaction is already active for this job")]
    AlreadyActive,

    /// Internal signal recorded when a transaction is rolled back
    #[error("Transaction {tx_id} cancelled: {cause}")]
    Cancelled { tx_id: String, cause: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors from the content store client
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Object not found: {0}")]
    NotFound(Pid),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Content store rejected the request: {0}")]
    Rejected(String),

    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the deposit graph store
#[derive(Error, Debug)]
pub enum GraphStoreError {
    #[error("No deposit graph found for {0}")]
    NotFound(DepositId),

    #[error("A writable handle is already open for deposit {0}")]
    WriterAlreadyOpen(DepositId),

    #[error("Node not found in deposit graph: {0}")]
    NodeNotFound(Pid),

    #[error("Invalid deposit graph: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the status store
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("No status record for deposit {0}")]
    DepositNotFound(DepositId),

    #[error("Unknown deposit state: {0}")]
    UnknownState(String),

    #[error("Status field {field} holds an invalid value: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
