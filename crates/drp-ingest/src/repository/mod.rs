//! Content store client
//!
//! The content store is the remote system of record the pipeline writes
//! into. The [`ContentStoreClient`] trait covers exactly the operations the
//! ingestor needs: transactional object and binary creation, provenance
//! notes, the primary-object link, and the existence probe used by
//! post-ingestion verification. Writes accept an optional transaction
//! handle; writes issued under a handle are undone when that transaction is
//! cancelled.

pub mod endpoints;
pub mod http;
pub mod memory;

pub use http::HttpContentStore;
pub use memory::MemoryContentStore;

use crate::acl::AccessGrant;
use crate::error::RepositoryError;
use crate::graph::NodeKind;
use crate::premis::ProvenanceEvent;
use async_trait::async_trait;
use drp_common::types::{DigestMap, Pid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handle of one open content-store transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Datastream slot of a binary attached to an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySlot {
    /// The object's original content
    Original,
    /// FITS-style technical metadata describing the original
    TechnicalMetadata,
    /// Edit history of the original
    History,
    /// Supplemental content alongside the original
    Alternate,
    /// Deposit manifest recorded on the destination container
    Manifest,
}

impl BinarySlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinarySlot::Original => "original",
            BinarySlot::TechnicalMetadata => "technical_metadata",
            BinarySlot::History => "history",
            BinarySlot::Alternate => "alternate",
            BinarySlot::Manifest => "manifest",
        }
    }
}

impl std::fmt::Display for BinarySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request to create one content-store object
///
/// The staged pid becomes the created object's pid, so a resumed run can
/// probe for the object under the same identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub pid: Pid,
    pub kind: NodeKind,
    /// Container the object becomes a member of
    pub parent: Pid,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<AccessGrant>,
}

impl ObjectSpec {
    pub fn new(pid: Pid, kind: NodeKind, parent: Pid, label: impl Into<String>) -> Self {
        Self {
            pid,
            kind,
            parent,
            label: label.into(),
            grants: Vec::new(),
        }
    }

    pub fn with_grants(mut self, grants: Vec<AccessGrant>) -> Self {
        self.grants = grants;
        self
    }
}

/// Request to attach one binary datastream to an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySpec {
    /// Object the binary hangs off
    pub parent: Pid,
    pub slot: BinarySlot,
    /// Permanent storage location of the transferred bytes
    pub content_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: DigestMap,
}

impl BinarySpec {
    pub fn new(parent: Pid, slot: BinarySlot, content_uri: impl Into<String>) -> Self {
        Self {
            parent,
            slot,
            content_uri: content_uri.into(),
            filename: None,
            mimetype: None,
            size: None,
            digests: DigestMap::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_digests(mut self, digests: DigestMap) -> Self {
        self.digests = digests;
        self
    }
}

/// Committed binary as recorded by the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryRef {
    pub parent: Pid,
    pub slot: BinarySlot,
    pub content_uri: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: DigestMap,
}

/// Operations the pipeline consumes from the content store
#[async_trait]
pub trait ContentStoreClient: Send + Sync {
    /// Open a transaction bracketing a set of writes.
    async fn begin_transaction(&self) -> Result<TxId, RepositoryError>;

    /// Roll back every write issued under the transaction.
    async fn cancel_transaction(&self, tx: &TxId, cause: &str) -> Result<(), RepositoryError>;

    /// Create an object as a member of its parent container.
    async fn create_object(
        &self,
        tx: Option<&TxId>,
        spec: &ObjectSpec,
    ) -> Result<Pid, RepositoryError>;

    /// Attach a binary datastream to an existing object.
    async fn add_binary(
        &self,
        tx: Option<&TxId>,
        spec: &BinarySpec,
    ) -> Result<BinaryRef, RepositoryError>;

    /// Point a work at its representative file.
    async fn set_primary_object(
        &self,
        tx: Option<&TxId>,
        work: &Pid,
        file: &Pid,
    ) -> Result<(), RepositoryError>;

    /// Append a provenance note to an object.
    async fn add_provenance_event(
        &self,
        tx: Option<&TxId>,
        event: &ProvenanceEvent,
    ) -> Result<(), RepositoryError>;

    /// Whether an object is visible outside any transaction.
    async fn object_exists(&self, pid: &Pid) -> Result<bool, RepositoryError>;
}
