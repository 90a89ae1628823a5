//! Provenance events
//!
//! Every successfully ingested object gets append-only provenance notes in
//! the content store: what was done, by which agent, when. Events are never
//! retracted, so a failed run leaves the notes of everything committed
//! before the failure in place.

use chrono::{DateTime, Utc};
use drp_common::types::{DigestAlgorithm, Pid};
use serde::{Deserialize, Serialize};

/// PREMIS event vocabulary used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremisEventType {
    Ingestion,
    FixityCheck,
    PolicyAssignment,
    Validation,
    Normalization,
    VirusCheck,
}

impl PremisEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PremisEventType::Ingestion => "ingestion",
            PremisEventType::FixityCheck => "fixity_check",
            PremisEventType::PolicyAssignment => "policy_assignment",
            PremisEventType::Validation => "validation",
            PremisEventType::Normalization => "normalization",
            PremisEventType::VirusCheck => "virus_check",
        }
    }
}

impl std::fmt::Display for PremisEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only provenance note attached to a content-store object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    pub event_type: PremisEventType,

    /// Object the note is attached to
    pub object: Pid,

    /// Free-text description of what happened
    pub detail: String,

    /// Person the action was performed on behalf of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizing_agent: Option<String>,

    /// Software that performed the action
    pub executing_agent: String,

    pub timestamp: DateTime<Utc>,
}

impl ProvenanceEvent {
    pub fn new(event_type: PremisEventType, object: Pid, detail: impl Into<String>) -> Self {
        Self {
            event_type,
            object,
            detail: detail.into(),
            authorizing_agent: None,
            executing_agent: software_agent(),
            timestamp: Utc::now(),
        }
    }

    pub fn authorized_by(mut self, agent: impl Into<String>) -> Self {
        self.authorizing_agent = Some(agent.into());
        self
    }

    /// Note recorded when an object is created.
    pub fn ingestion(object: Pid, filename: Option<&str>, mimetype: Option<&str>) -> Self {
        let mut detail = format!("ingested as PID: {}", object);
        if let Some(filename) = filename {
            detail.push_str("; filename: ");
            detail.push_str(filename);
        }
        if let Some(mimetype) = mimetype {
            detail.push_str("; mimetype: ");
            detail.push_str(mimetype);
        }
        Self::new(PremisEventType::Ingestion, object, detail)
    }

    /// Note recorded when a transferred binary matched its declared digest.
    pub fn fixity(object: Pid, algorithm: DigestAlgorithm, value: &str) -> Self {
        Self::new(
            PremisEventType::FixityCheck,
            object,
            format!("{} checksum verified: {}", algorithm, value),
        )
    }

    /// Note recorded when explicit access grants were applied.
    pub fn policy_assignment(object: Pid, grant_count: usize) -> Self {
        Self::new(
            PremisEventType::PolicyAssignment,
            object,
            format!("applied {} access grant(s)", grant_count),
        )
    }

    /// Aggregate note recorded on a container after its children were added.
    pub fn added_children(object: Pid, count: u64) -> Self {
        Self::new(
            PremisEventType::Ingestion,
            object,
            format!("added {} child objects to this container", count),
        )
    }
}

/// Executing-agent identity for events written by this process.
fn software_agent() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("drp-ingest/{} on {}", env!("CARGO_PKG_VERSION"), host)
}
