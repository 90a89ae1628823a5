//! Staged deposit description
//!
//! A deposit is described before ingestion as a rooted tree of nodes (the
//! "bag"): containers, works, files, and their binaries, each carrying the
//! labels, declared digests, staging locations, and access grants the
//! ingestor needs. The tree is built while the deposit is staged, persisted
//! by [`store::DepositGraphStore`], and walked read-only during ingestion.

pub mod store;

use crate::acl::AccessGrant;
use crate::error::GraphStoreError;
use drp_common::checksum::validate_digest_value;
use drp_common::types::{DigestAlgorithm, DigestMap, Pid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Type tag of a staged deposit node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Root container of the deposit tree.
    ///
    /// Never ingested itself; its direct children attach to the deposit's
    /// destination container in the content store.
    Bag,
    AdminUnit,
    Collection,
    Folder,
    Work,
    File,
    /// Supplemental binary attached to a file object.
    Binary,
    /// Deposit manifest recorded alongside the ingested content.
    ManifestEntry,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Bag => "bag",
            NodeKind::AdminUnit => "admin_unit",
            NodeKind::Collection => "collection",
            NodeKind::Folder => "folder",
            NodeKind::Work => "work",
            NodeKind::File => "file",
            NodeKind::Binary => "binary",
            NodeKind::ManifestEntry => "manifest_entry",
        }
    }

    /// Kinds that become container objects able to hold children.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::AdminUnit | NodeKind::Collection | NodeKind::Folder | NodeKind::Work
        )
    }

    /// Kinds the ingestor creates and counts. Everything except the bag.
    pub fn is_ingested(&self) -> bool {
        !matches!(self, NodeKind::Bag)
    }

    /// Kinds whose staged content is copied into binary storage.
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            NodeKind::File | NodeKind::Binary | NodeKind::ManifestEntry
        )
    }

    /// Kinds that become standalone content-store objects with their own
    /// pid. Binaries and manifest entries attach to an object instead.
    pub fn is_object(&self) -> bool {
        self.is_container() || matches!(self, NodeKind::File)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One staged node of a deposit tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositNode {
    pub pid: Pid,
    pub kind: NodeKind,
    pub label: String,

    /// Owning node. Every node except the root has exactly one parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Pid>,

    /// Child nodes in declared order. Ingestion order follows this list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Pid>,

    /// Representative file of a work. Must name a direct file child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_object: Option<Pid>,

    /// Staged location of the original content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_uri: Option<String>,

    /// Staged technical-metadata datastream for a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_metadata_uri: Option<String>,

    /// Staged edit-history datastream for a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_uri: Option<String>,

    /// Permanent storage location, stamped back after transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,

    /// Declared digests the transfer step treats as exact-match targets
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: DigestMap,

    /// Access grants to copy onto the created object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<AccessGrant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl DepositNode {
    pub fn new(pid: Pid, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            pid,
            kind,
            label: label.into(),
            parent: None,
            children: Vec::new(),
            primary_object: None,
            staging_uri: None,
            tech_metadata_uri: None,
            history_uri: None,
            storage_uri: None,
            digests: DigestMap::new(),
            grants: Vec::new(),
            filename: None,
            mimetype: None,
            size: None,
        }
    }

    pub fn with_parent(mut self, parent: Pid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_primary_object(mut self, file: Pid) -> Self {
        self.primary_object = Some(file);
        self
    }

    pub fn with_staging_uri(mut self, uri: impl Into<String>) -> Self {
        self.staging_uri = Some(uri.into());
        self
    }

    pub fn with_tech_metadata_uri(mut self, uri: impl Into<String>) -> Self {
        self.tech_metadata_uri = Some(uri.into());
        self
    }

    pub fn with_history_uri(mut self, uri: impl Into<String>) -> Self {
        self.history_uri = Some(uri.into());
        self
    }

    pub fn with_digest(mut self, algorithm: DigestAlgorithm, value: impl Into<String>) -> Self {
        self.digests.insert(algorithm, value.into());
        self
    }

    pub fn with_grant(mut self, grant: AccessGrant) -> Self {
        self.grants.push(grant);
        self
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
}

/// Rooted tree of staged deposit nodes
///
/// Construction goes through [`DepositGraph::new`] and
/// [`DepositGraph::insert`], which keep parent and child references wired
/// consistently. [`DepositGraph::validate`] re-checks the full structure,
/// which matters for graphs loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositGraph {
    root: Pid,
    nodes: BTreeMap<Pid, DepositNode>,
}

impl DepositGraph {
    /// Start a graph from its root bag node.
    pub fn new(root: DepositNode) -> Result<Self, GraphStoreError> {
        if root.kind != NodeKind::Bag {
            return Err(GraphStoreError::Invalid(format!(
                "Root node {} must be a bag, got {}",
                root.pid, root.kind
            )));
        }
        if root.parent.is_some() {
            return Err(GraphStoreError::Invalid(format!(
                "Root node {} cannot have a parent",
                root.pid
            )));
        }
        if !root.children.is_empty() {
            return Err(GraphStoreError::Invalid(
                "Root node children are wired through insert".to_string(),
            ));
        }

        let pid = root.pid;
        let mut nodes = BTreeMap::new();
        nodes.insert(pid, root);
        Ok(Self { root: pid, nodes })
    }

    /// Add a node under its declared parent.
    pub fn insert(&mut self, node: DepositNode) -> Result<(), GraphStoreError> {
        if self.nodes.contains_key(&node.pid) {
            return Err(GraphStoreError::Invalid(format!(
                "Duplicate node {}",
                node.pid
            )));
        }
        if node.kind == NodeKind::Bag {
            return Err(GraphStoreError::Invalid(format!(
                "Node {} is a bag but only the root may be one",
                node.pid
            )));
        }
        if !node.children.is_empty() {
            return Err(GraphStoreError::Invalid(format!(
                "Node {} children are wired through insert",
                node.pid
            )));
        }
        let Some(parent) = node.parent else {
            return Err(GraphStoreError::Invalid(format!(
                "Node {} requires a parent",
                node.pid
            )));
        };

        let pid = node.pid;
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(GraphStoreError::NodeNotFound(parent))?;
        parent_node.children.push(pid);
        self.nodes.insert(pid, node);
        Ok(())
    }

    pub fn root_pid(&self) -> Pid {
        self.root
    }

    pub fn root(&self) -> Result<&DepositNode, GraphStoreError> {
        self.node(&self.root)
    }

    pub fn node(&self, pid: &Pid) -> Result<&DepositNode, GraphStoreError> {
        self.nodes.get(pid).ok_or(GraphStoreError::NodeNotFound(*pid))
    }

    pub fn node_mut(&mut self, pid: &Pid) -> Result<&mut DepositNode, GraphStoreError> {
        self.nodes
            .get_mut(pid)
            .ok_or(GraphStoreError::NodeNotFound(*pid))
    }

    pub fn contains(&self, pid: &Pid) -> bool {
        self.nodes.contains_key(pid)
    }

    /// Children of a node in declared order.
    pub fn children_of(&self, pid: &Pid) -> Result<Vec<&DepositNode>, GraphStoreError> {
        let node = self.node(pid)?;
        node.children.iter().map(|child| self.node(child)).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Count of nodes the ingestor will create and track.
    pub fn ingested_node_count(&self) -> u64 {
        self.nodes
            .values()
            .filter(|node| node.kind.is_ingested())
            .count() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &DepositNode> {
        self.nodes.values()
    }

    /// Lowercase declared digest values so later comparisons are exact.
    pub fn normalize_digests(&mut self) {
        for node in self.nodes.values_mut() {
            for value in node.digests.values_mut() {
                if value.bytes().any(|b| b.is_ascii_uppercase()) {
                    *value = value.to_lowercase();
                }
            }
        }
    }

    /// Check the full structure of the tree.
    pub fn validate(&self) -> Result<(), GraphStoreError> {
        let root = self
            .nodes
            .get(&self.root)
            .ok_or(GraphStoreError::NodeNotFound(self.root))?;
        if root.kind != NodeKind::Bag {
            return Err(GraphStoreError::Invalid(format!(
                "Root node {} must be a bag, got {}",
                root.pid, root.kind
            )));
        }
        if root.parent.is_some() {
            return Err(GraphStoreError::Invalid(format!(
                "Root node {} cannot have a parent",
                root.pid
            )));
        }

        for node in self.nodes.values() {
            self.validate_links(node)?;
            self.validate_fields(node)?;
        }

        self.validate_reachability()
    }

    fn validate_links(&self, node: &DepositNode) -> Result<(), GraphStoreError> {
        if node.pid != self.root {
            if node.kind == NodeKind::Bag {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} is a bag but only the root may be one",
                    node.pid
                )));
            }
            let Some(parent) = node.parent else {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} has no parent",
                    node.pid
                )));
            };
            let parent_node = self
                .nodes
                .get(&parent)
                .ok_or(GraphStoreError::NodeNotFound(parent))?;
            let listed = parent_node
                .children
                .iter()
                .filter(|child| **child == node.pid)
                .count();
            if listed != 1 {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} is listed {} times by parent {}",
                    node.pid, listed, parent
                )));
            }
        }

        for child in &node.children {
            let child_node = self
                .nodes
                .get(child)
                .ok_or(GraphStoreError::NodeNotFound(*child))?;
            if child_node.parent != Some(node.pid) {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} lists child {} which does not point back",
                    node.pid, child
                )));
            }
        }

        Ok(())
    }

    fn validate_fields(&self, node: &DepositNode) -> Result<(), GraphStoreError> {
        match node.primary_object {
            Some(primary) if node.kind == NodeKind::Work => {
                let target = self
                    .nodes
                    .get(&primary)
                    .ok_or(GraphStoreError::NodeNotFound(primary))?;
                if target.kind != NodeKind::File || !node.children.contains(&primary) {
                    return Err(GraphStoreError::Invalid(format!(
                        "Work {} primary object {} is not a direct file child",
                        node.pid, primary
                    )));
                }
            }
            Some(_) => {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} declares a primary object but is not a work",
                    node.pid
                )));
            }
            None => {}
        }

        if node.kind.has_content() {
            if node.staging_uri.is_none() {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} ({}) has no staged content",
                    node.pid, node.kind
                )));
            }
        } else if node.staging_uri.is_some() {
            return Err(GraphStoreError::Invalid(format!(
                "Node {} ({}) cannot carry staged content",
                node.pid, node.kind
            )));
        }

        for (algorithm, value) in &node.digests {
            validate_digest_value(*algorithm, value).map_err(|_| {
                GraphStoreError::Invalid(format!(
                    "Node {} declares an invalid {} digest",
                    node.pid, algorithm
                ))
            })?;
        }

        Ok(())
    }

    fn validate_reachability(&self) -> Result<(), GraphStoreError> {
        let mut seen: HashSet<Pid> = HashSet::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root]);
        while let Some(pid) = queue.pop_front() {
            if !seen.insert(pid) {
                return Err(GraphStoreError::Invalid(format!(
                    "Node {} is reachable through more than one path",
                    pid
                )));
            }
            if let Some(node) = self.nodes.get(&pid) {
                queue.extend(node.children.iter().copied());
            }
        }
        if seen.len() != self.nodes.len() {
            return Err(GraphStoreError::Invalid(format!(
                "{} node(s) are not reachable from the root",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bag() -> DepositGraph {
        DepositGraph::new(DepositNode::new(Pid::new(), NodeKind::Bag, "deposit")).unwrap()
    }

    #[test]
    fn test_insert_wires_parent_and_child() {
        let mut graph = bag();
        let root = graph.root_pid();
        let folder = Pid::new();
        graph
            .insert(DepositNode::new(folder, NodeKind::Folder, "folder").with_parent(root))
            .unwrap();

        assert_eq!(graph.node(&folder).unwrap().parent, Some(root));
        assert_eq!(graph.root().unwrap().children, vec![folder]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_children_keep_declared_order() {
        let mut graph = bag();
        let root = graph.root_pid();
        let mut expected = Vec::new();
        for label in ["a", "b", "c"] {
            let pid = Pid::new();
            expected.push(pid);
            graph
                .insert(DepositNode::new(pid, NodeKind::Work, label).with_parent(root))
                .unwrap();
        }

        let order: Vec<Pid> = graph
            .children_of(&root)
            .unwrap()
            .iter()
            .map(|n| n.pid)
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_insert_rejects_unknown_parent() {
        let mut graph = bag();
        let err = graph
            .insert(DepositNode::new(Pid::new(), NodeKind::Work, "w").with_parent(Pid::new()))
            .unwrap_err();
        assert!(matches!(err, GraphStoreError::NodeNotFound(_)));
    }

    #[test]
    fn test_insert_rejects_duplicate_pid() {
        let mut graph = bag();
        let root = graph.root_pid();
        let pid = Pid::new();
        graph
            .insert(DepositNode::new(pid, NodeKind::Work, "w").with_parent(root))
            .unwrap();
        assert!(graph
            .insert(DepositNode::new(pid, NodeKind::Work, "again").with_parent(root))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_second_bag() {
        let mut graph = bag();
        let root = graph.root_pid();
        let pid = Pid::new();
        graph
            .insert(DepositNode::new(pid, NodeKind::Folder, "f").with_parent(root))
            .unwrap();
        graph.node_mut(&pid).unwrap().kind = NodeKind::Bag;
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_requires_staged_content_on_files() {
        let mut graph = bag();
        let root = graph.root_pid();
        let work = Pid::new();
        graph
            .insert(DepositNode::new(work, NodeKind::Work, "w").with_parent(root))
            .unwrap();
        graph
            .insert(DepositNode::new(Pid::new(), NodeKind::File, "f").with_parent(work))
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_primary_object_must_be_direct_file_child() {
        let mut graph = bag();
        let root = graph.root_pid();
        let work = Pid::new();
        let file = Pid::new();
        graph
            .insert(DepositNode::new(work, NodeKind::Work, "w").with_parent(root))
            .unwrap();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "f")
                    .with_parent(work)
                    .with_staging_uri("file:///staging/f.txt"),
            )
            .unwrap();

        graph.node_mut(&work).unwrap().primary_object = Some(file);
        assert!(graph.validate().is_ok());

        graph.node_mut(&work).unwrap().primary_object = Some(root);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_digest_value() {
        let mut graph = bag();
        let root = graph.root_pid();
        let file = Pid::new();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "f")
                    .with_parent(root)
                    .with_staging_uri("file:///staging/f.txt")
                    .with_digest(DigestAlgorithm::Md5, "not-hex"),
            )
            .unwrap();
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_normalize_digests_lowercases_values() {
        let mut graph = bag();
        let root = graph.root_pid();
        let file = Pid::new();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "f")
                    .with_parent(root)
                    .with_staging_uri("file:///staging/f.txt")
                    .with_digest(DigestAlgorithm::Md5, "5EB63BBBE01EEED093CB22BB8F5ACDC3"),
            )
            .unwrap();

        graph.normalize_digests();
        assert_eq!(
            graph.node(&file).unwrap().digests[&DigestAlgorithm::Md5],
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_ingested_node_count_excludes_bag() {
        let mut graph = bag();
        let root = graph.root_pid();
        let work = Pid::new();
        graph
            .insert(DepositNode::new(work, NodeKind::Work, "w").with_parent(root))
            .unwrap();
        graph
            .insert(
                DepositNode::new(Pid::new(), NodeKind::File, "f")
                    .with_parent(work)
                    .with_staging_uri("file:///staging/f.txt"),
            )
            .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.ingested_node_count(), 2);
    }
}
