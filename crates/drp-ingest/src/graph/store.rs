//! Deposit graph persistence
//!
//! Graphs live as pretty-printed JSON under `<base>/<deposit-id>/graph.json`.
//! Reads hand out an owned snapshot; writes go through an exclusive
//! [`WritableGraph`] handle so only one caller can mutate a deposit at a
//! time. Closing the handle persists and releases it; dropping it without
//! closing releases it and discards the changes.

use super::DepositGraph;
use crate::error::GraphStoreError;
use drp_common::types::DepositId;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

const GRAPH_FILE: &str = "graph.json";

/// Store of staged deposit graphs on the local filesystem
#[derive(Debug, Clone)]
pub struct DepositGraphStore {
    base_dir: PathBuf,
    writers: Arc<Mutex<HashSet<DepositId>>>,
}

impl DepositGraphStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            writers: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn graph_path(&self, deposit_id: &DepositId) -> PathBuf {
        self.base_dir.join(deposit_id.to_string()).join(GRAPH_FILE)
    }

    pub fn exists(&self, deposit_id: &DepositId) -> bool {
        self.graph_path(deposit_id).exists()
    }

    /// Persist a freshly staged graph.
    #[instrument(skip(self, graph), fields(deposit_id = %deposit_id))]
    pub fn create(
        &self,
        deposit_id: &DepositId,
        graph: &DepositGraph,
    ) -> Result<(), GraphStoreError> {
        let path = self.graph_path(deposit_id);
        if path.exists() {
            return Err(GraphStoreError::Invalid(format!(
                "Deposit {} is already staged",
                deposit_id
            )));
        }
        graph.validate()?;
        write_graph(&path, graph)?;
        debug!(nodes = graph.len(), "Staged deposit graph");
        Ok(())
    }

    /// Open a shared immutable view of a deposit graph.
    #[instrument(skip(self), fields(deposit_id = %deposit_id))]
    pub fn open_read_only(&self, deposit_id: &DepositId) -> Result<DepositGraph, GraphStoreError> {
        let mut graph = read_graph(&self.graph_path(deposit_id), deposit_id)?;
        graph.normalize_digests();
        graph.validate()?;
        Ok(graph)
    }

    /// Open the exclusive mutable handle for a deposit graph.
    ///
    /// Fails while another writable handle for the same deposit is open in
    /// this process.
    #[instrument(skip(self), fields(deposit_id = %deposit_id))]
    pub fn open_writable(&self, deposit_id: &DepositId) -> Result<WritableGraph, GraphStoreError> {
        {
            let mut writers = lock_writers(&self.writers);
            if !writers.insert(*deposit_id) {
                return Err(GraphStoreError::WriterAlreadyOpen(*deposit_id));
            }
        }

        let path = self.graph_path(deposit_id);
        let graph = match read_graph(&path, deposit_id) {
            Ok(mut graph) => {
                graph.normalize_digests();
                if let Err(err) = graph.validate() {
                    lock_writers(&self.writers).remove(deposit_id);
                    return Err(err);
                }
                graph
            }
            Err(err) => {
                lock_writers(&self.writers).remove(deposit_id);
                return Err(err);
            }
        };

        Ok(WritableGraph {
            deposit_id: *deposit_id,
            path,
            graph,
            writers: Arc::clone(&self.writers),
            closed: false,
        })
    }
}

/// Exclusive mutable handle on one deposit graph
#[derive(Debug)]
pub struct WritableGraph {
    deposit_id: DepositId,
    path: PathBuf,
    graph: DepositGraph,
    writers: Arc<Mutex<HashSet<DepositId>>>,
    closed: bool,
}

impl WritableGraph {
    pub fn deposit_id(&self) -> DepositId {
        self.deposit_id
    }

    /// Persist the graph and release the handle.
    pub fn close(mut self) -> Result<(), GraphStoreError> {
        self.graph.validate()?;
        write_graph(&self.path, &self.graph)?;
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            lock_writers(&self.writers).remove(&self.deposit_id);
        }
    }
}

impl Deref for WritableGraph {
    type Target = DepositGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

impl DerefMut for WritableGraph {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.graph
    }
}

impl Drop for WritableGraph {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                deposit_id = %self.deposit_id,
                "Writable graph handle dropped without close; changes not persisted"
            );
            self.release();
        }
    }
}

fn lock_writers(writers: &Mutex<HashSet<DepositId>>) -> MutexGuard<'_, HashSet<DepositId>> {
    writers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_graph(path: &Path, deposit_id: &DepositId) -> Result<DepositGraph, GraphStoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(GraphStoreError::NotFound(*deposit_id));
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

fn write_graph(path: &Path, graph: &DepositGraph) -> Result<(), GraphStoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(graph)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::{DepositNode, NodeKind};
    use drp_common::types::Pid;

    fn staged_store() -> (tempfile::TempDir, DepositGraphStore, DepositId, Pid) {
        let dir = tempfile::tempdir().unwrap();
        let store = DepositGraphStore::new(dir.path());
        let deposit_id = DepositId::new();

        let mut graph =
            DepositGraph::new(DepositNode::new(Pid::new(), NodeKind::Bag, "deposit")).unwrap();
        let root = graph.root_pid();
        let file = Pid::new();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "f.txt")
                    .with_parent(root)
                    .with_staging_uri("file:///staging/f.txt"),
            )
            .unwrap();
        store.create(&deposit_id, &graph).unwrap();
        (dir, store, deposit_id, file)
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let (_dir, store, deposit_id, file) = staged_store();

        let graph = store.open_read_only(&deposit_id).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.root().unwrap().children, vec![file]);
        assert_eq!(graph.node(&file).unwrap().label, "f.txt");
    }

    #[test]
    fn test_open_read_only_missing_deposit() {
        let dir = tempfile::tempdir().unwrap();
        let store = DepositGraphStore::new(dir.path());
        let err = store.open_read_only(&DepositId::new()).unwrap_err();
        assert!(matches!(err, GraphStoreError::NotFound(_)));
    }

    #[test]
    fn test_create_rejects_restaging() {
        let (_dir, store, deposit_id, _) = staged_store();
        let graph = store.open_read_only(&deposit_id).unwrap();
        assert!(store.create(&deposit_id, &graph).is_err());
    }

    #[test]
    fn test_single_writer_discipline() {
        let (_dir, store, deposit_id, _) = staged_store();

        let writable = store.open_writable(&deposit_id).unwrap();
        let err = store.open_writable(&deposit_id).unwrap_err();
        assert!(matches!(err, GraphStoreError::WriterAlreadyOpen(_)));

        writable.close().unwrap();
        assert!(store.open_writable(&deposit_id).is_ok());
    }

    #[test]
    fn test_close_persists_mutation() {
        let (_dir, store, deposit_id, file) = staged_store();

        let mut writable = store.open_writable(&deposit_id).unwrap();
        writable.node_mut(&file).unwrap().storage_uri =
            Some("file:///objects/f.txt".to_string());
        writable.close().unwrap();

        let graph = store.open_read_only(&deposit_id).unwrap();
        assert_eq!(
            graph.node(&file).unwrap().storage_uri.as_deref(),
            Some("file:///objects/f.txt")
        );
    }

    #[test]
    fn test_drop_without_close_discards_and_releases() {
        let (_dir, store, deposit_id, file) = staged_store();

        {
            let mut writable = store.open_writable(&deposit_id).unwrap();
            writable.node_mut(&file).unwrap().storage_uri =
                Some("file:///objects/f.txt".to_string());
        }

        let graph = store.open_read_only(&deposit_id).unwrap();
        assert_eq!(graph.node(&file).unwrap().storage_uri, None);
        assert!(store.open_writable(&deposit_id).is_ok());
    }

    #[test]
    fn test_read_only_view_lowercases_digests() {
        let dir = tempfile::tempdir().unwrap();
        let store = DepositGraphStore::new(dir.path());
        let deposit_id = DepositId::new();

        let mut graph =
            DepositGraph::new(DepositNode::new(Pid::new(), NodeKind::Bag, "deposit")).unwrap();
        let root = graph.root_pid();
        let file = Pid::new();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "f.txt")
                    .with_parent(root)
                    .with_staging_uri("file:///staging/f.txt")
                    .with_digest(
                        drp_common::types::DigestAlgorithm::Md5,
                        "5EB63BBBE01EEED093CB22BB8F5ACDC3",
                    ),
            )
            .unwrap();
        store.create(&deposit_id, &graph).unwrap();

        let loaded = store.open_read_only(&deposit_id).unwrap();
        assert_eq!(
            loaded.node(&file).unwrap().digests
                [&drp_common::types::DigestAlgorithm::Md5],
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }
}
