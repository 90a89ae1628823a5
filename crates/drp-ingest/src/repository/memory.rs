//! In-memory content store
//!
//! Implements the full client contract against process memory, including
//! transactional rollback: writes issued under a transaction are journaled
//! and undone in reverse order when the transaction is cancelled. Starting
//! a new transaction implicitly commits any prior one, mirroring how the
//! pipeline moves past a completed object.
//!
//! Inspection accessors expose committed state so tests can assert exactly
//! what a run left behind.

use super::{BinaryRef, BinarySlot, BinarySpec, ContentStoreClient, ObjectSpec, TxId};
use crate::acl::AccessGrant;
use crate::error::RepositoryError;
use crate::graph::NodeKind;
use crate::premis::ProvenanceEvent;
use async_trait::async_trait;
use drp_common::types::Pid;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    kind: NodeKind,
    parent: Option<Pid>,
    label: String,
    grants: Vec<AccessGrant>,
    children: Vec<Pid>,
    primary_object: Option<Pid>,
    binaries: HashMap<BinarySlot, BinaryRef>,
    events: Vec<ProvenanceEvent>,
}

/// Undo log entry for one journaled write
#[derive(Debug, Clone)]
enum JournalEntry {
    CreatedObject(Pid),
    AddedBinary(Pid, BinarySlot),
    SetPrimary(Pid, Option<Pid>),
    AddedEvent(Pid),
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<Pid, StoredObject>,
    tx_seq: u64,
    active_tx: Option<(TxId, Vec<JournalEntry>)>,
    cancelled: Vec<(TxId, String)>,
}

impl Inner {
    fn journal(&mut self, tx: Option<&TxId>, entry: JournalEntry) -> Result<(), RepositoryError> {
        let Some(tx) = tx else {
            return Ok(());
        };
        match &mut self.active_tx {
            Some((active, journal)) if active == tx => {
                journal.push(entry);
                Ok(())
            }
            _ => Err(RepositoryError::UnknownTransaction(tx.to_string())),
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::CreatedObject(pid) => {
                if let Some(object) = self.objects.remove(&pid) {
                    if let Some(parent) = object.parent {
                        if let Some(parent_object) = self.objects.get_mut(&parent) {
                            parent_object.children.retain(|child| *child != pid);
                        }
                    }
                }
            }
            JournalEntry::AddedBinary(pid, slot) => {
                if let Some(object) = self.objects.get_mut(&pid) {
                    object.binaries.remove(&slot);
                }
            }
            JournalEntry::SetPrimary(pid, previous) => {
                if let Some(object) = self.objects.get_mut(&pid) {
                    object.primary_object = previous;
                }
            }
            JournalEntry::AddedEvent(pid) => {
                if let Some(object) = self.objects.get_mut(&pid) {
                    object.events.pop();
                }
            }
        }
    }
}

/// Content store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing container, typically the deposit destination.
    pub async fn register_container(&self, pid: Pid, kind: NodeKind, label: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.objects.insert(
            pid,
            StoredObject {
                kind,
                parent: None,
                label: label.into(),
                grants: Vec::new(),
                children: Vec::new(),
                primary_object: None,
                binaries: HashMap::new(),
                events: Vec::new(),
            },
        );
    }

    pub async fn object_count(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    pub async fn kind_of(&self, pid: &Pid) -> Option<NodeKind> {
        self.inner.read().await.objects.get(pid).map(|o| o.kind)
    }

    /// Children of a container in creation order.
    pub async fn children_of(&self, pid: &Pid) -> Vec<Pid> {
        self.inner
            .read()
            .await
            .objects
            .get(pid)
            .map(|o| o.children.clone())
            .unwrap_or_default()
    }

    pub async fn primary_object_of(&self, pid: &Pid) -> Option<Pid> {
        self.inner
            .read()
            .await
            .objects
            .get(pid)
            .and_then(|o| o.primary_object)
    }

    pub async fn events_for(&self, pid: &Pid) -> Vec<ProvenanceEvent> {
        self.inner
            .read()
            .await
            .objects
            .get(pid)
            .map(|o| o.events.clone())
            .unwrap_or_default()
    }

    pub async fn binary(&self, pid: &Pid, slot: BinarySlot) -> Option<BinaryRef> {
        self.inner
            .read()
            .await
            .objects
            .get(pid)
            .and_then(|o| o.binaries.get(&slot).cloned())
    }

    pub async fn grants_of(&self, pid: &Pid) -> Vec<AccessGrant> {
        self.inner
            .read()
            .await
            .objects
            .get(pid)
            .map(|o| o.grants.clone())
            .unwrap_or_default()
    }

    /// Transactions that were rolled back, with their causes.
    pub async fn cancelled_transactions(&self) -> Vec<(TxId, String)> {
        self.inner.read().await.cancelled.clone()
    }
}

#[async_trait]
impl ContentStoreClient for MemoryContentStore {
    async fn begin_transaction(&self) -> Result<TxId, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.tx_seq += 1;
        let tx = TxId::new(format!("tx:{}", inner.tx_seq));
        // Moving on to a new transaction commits the previous one.
        inner.active_tx = Some((tx.clone(), Vec::new()));
        Ok(tx)
    }

    async fn cancel_transaction(&self, tx: &TxId, cause: &str) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.active_tx.take() {
            Some((active, journal)) if active == *tx => {
                for entry in journal.into_iter().rev() {
                    inner.undo(entry);
                }
                inner.cancelled.push((tx.clone(), cause.to_string()));
                Ok(())
            }
            other => {
                inner.active_tx = other;
                Err(RepositoryError::UnknownTransaction(tx.to_string()))
            }
        }
    }

    async fn create_object(
        &self,
        tx: Option<&TxId>,
        spec: &ObjectSpec,
    ) -> Result<Pid, RepositoryError> {
        if !spec.kind.is_container() && spec.kind != NodeKind::File {
            return Err(RepositoryError::Rejected(format!(
                "Kind {} is not a content-store object",
                spec.kind
            )));
        }

        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&spec.pid) {
            return Err(RepositoryError::Rejected(format!(
                "Object {} already exists",
                spec.pid
            )));
        }
        match inner.objects.get(&spec.parent) {
            Some(parent) if parent.kind.is_container() => {}
            Some(_) => {
                return Err(RepositoryError::Rejected(format!(
                    "Object {} cannot hold members",
                    spec.parent
                )));
            }
            None => return Err(RepositoryError::NotFound(spec.parent)),
        }
        inner.journal(tx, JournalEntry::CreatedObject(spec.pid))?;

        if let Some(parent) = inner.objects.get_mut(&spec.parent) {
            parent.children.push(spec.pid);
        }
        inner.objects.insert(
            spec.pid,
            StoredObject {
                kind: spec.kind,
                parent: Some(spec.parent),
                label: spec.label.clone(),
                grants: spec.grants.clone(),
                children: Vec::new(),
                primary_object: None,
                binaries: HashMap::new(),
                events: Vec::new(),
            },
        );
        Ok(spec.pid)
    }

    async fn add_binary(
        &self,
        tx: Option<&TxId>,
        spec: &BinarySpec,
    ) -> Result<BinaryRef, RepositoryError> {
        let mut inner = self.inner.write().await;
        if !inner.objects.contains_key(&spec.parent) {
            return Err(RepositoryError::NotFound(spec.parent));
        }
        inner.journal(tx, JournalEntry::AddedBinary(spec.parent, spec.slot))?;

        let binary = BinaryRef {
            parent: spec.parent,
            slot: spec.slot,
            content_uri: spec.content_uri.clone(),
            size: spec.size.unwrap_or(0),
            digests: spec.digests.clone(),
        };
        if let Some(parent) = inner.objects.get_mut(&spec.parent) {
            parent.binaries.insert(spec.slot, binary.clone());
        }
        Ok(binary)
    }

    async fn set_primary_object(
        &self,
        tx: Option<&TxId>,
        work: &Pid,
        file: &Pid,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.objects.get(file) {
            Some(candidate) if candidate.parent == Some(*work) => {}
            Some(_) => {
                return Err(RepositoryError::Rejected(format!(
                    "Object {} is not a member of {}",
                    file, work
                )));
            }
            None => return Err(RepositoryError::NotFound(*file)),
        }
        let previous = inner
            .objects
            .get(work)
            .ok_or(RepositoryError::NotFound(*work))?
            .primary_object;
        inner.journal(tx, JournalEntry::SetPrimary(*work, previous))?;

        if let Some(object) = inner.objects.get_mut(work) {
            object.primary_object = Some(*file);
        }
        Ok(())
    }

    async fn add_provenance_event(
        &self,
        tx: Option<&TxId>,
        event: &ProvenanceEvent,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        if !inner.objects.contains_key(&event.object) {
            return Err(RepositoryError::NotFound(event.object));
        }
        inner.journal(tx, JournalEntry::AddedEvent(event.object))?;

        if let Some(object) = inner.objects.get_mut(&event.object) {
            object.events.push(event.clone());
        }
        Ok(())
    }

    async fn object_exists(&self, pid: &Pid) -> Result<bool, RepositoryError> {
        Ok(self.inner.read().await.objects.contains_key(pid))
    }
}
