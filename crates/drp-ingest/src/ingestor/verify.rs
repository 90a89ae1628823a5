//! Post-ingestion visibility check
//!
//! A job only reports success once every object it believes it created is
//! actually visible in the content store. Catches silently lost commits
//! before the deposit is declared finished.

use crate::graph::DepositGraph;
use crate::repository::ContentStoreClient;
use anyhow::bail;
use drp_common::types::Pid;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Probe the content store for every completed object.
///
/// Completion marks for binary attachments are skipped; they have no
/// standalone object to probe. Returns the number of objects checked.
#[instrument(skip_all, fields(marked = completed.len()))]
pub async fn confirm_visible(
    client: &dyn ContentStoreClient,
    graph: &DepositGraph,
    completed: &HashSet<Pid>,
) -> anyhow::Result<u64> {
    let mut checked = 0u64;
    let mut missing: Vec<Pid> = Vec::new();

    for pid in completed {
        let Ok(node) = graph.node(pid) else {
            // Mark from a superseded version of the graph; nothing to probe.
            continue;
        };
        if !node.kind.is_object() {
            continue;
        }
        checked += 1;
        if !client.object_exists(pid).await? {
            missing.push(*pid);
        }
    }

    if !missing.is_empty() {
        missing.sort();
        bail!(
            "{} ingested object(s) not visible in the content store, first missing: {}",
            missing.len(),
            missing[0]
        );
    }

    debug!(checked, "All completed objects visible in content store");
    Ok(checked)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::{DepositNode, NodeKind};
    use crate::repository::MemoryContentStore;

    fn two_folder_graph() -> (DepositGraph, Pid, Pid) {
        let root = Pid::new();
        let a = Pid::new();
        let b = Pid::new();
        let mut graph =
            DepositGraph::new(DepositNode::new(root, NodeKind::Bag, "bag")).unwrap();
        graph
            .insert(DepositNode::new(a, NodeKind::Folder, "a").with_parent(root))
            .unwrap();
        graph
            .insert(DepositNode::new(b, NodeKind::Folder, "b").with_parent(root))
            .unwrap();
        (graph, a, b)
    }

    #[tokio::test]
    async fn test_all_objects_visible() {
        let (graph, a, b) = two_folder_graph();
        let client = MemoryContentStore::new();
        client.register_container(a, NodeKind::Folder, "a").await;
        client.register_container(b, NodeKind::Folder, "b").await;

        let completed: HashSet<Pid> = [a, b].into_iter().collect();
        let checked = confirm_visible(&client, &graph, &completed).await.unwrap();
        assert_eq!(checked, 2);
    }

    #[tokio::test]
    async fn test_missing_object_is_reported() {
        let (graph, a, b) = two_folder_graph();
        let client = MemoryContentStore::new();
        client.register_container(a, NodeKind::Folder, "a").await;

        let completed: HashSet<Pid> = [a, b].into_iter().collect();
        let err = confirm_visible(&client, &graph, &completed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not visible"));
        assert!(err.to_string().contains(&b.to_string()));
    }

    #[tokio::test]
    async fn test_attachment_marks_are_not_probed() {
        let root = Pid::new();
        let work = Pid::new();
        let file = Pid::new();
        let binary = Pid::new();
        let mut graph =
            DepositGraph::new(DepositNode::new(root, NodeKind::Bag, "bag")).unwrap();
        graph
            .insert(DepositNode::new(work, NodeKind::Work, "work").with_parent(root))
            .unwrap();
        graph
            .insert(
                DepositNode::new(file, NodeKind::File, "file")
                    .with_parent(work)
                    .with_staging_uri("file:///staged/f.bin"),
            )
            .unwrap();
        graph
            .insert(
                DepositNode::new(binary, NodeKind::Binary, "alt")
                    .with_parent(file)
                    .with_staging_uri("file:///staged/alt.bin"),
            )
            .unwrap();

        let client = MemoryContentStore::new();
        client.register_container(work, NodeKind::Work, "work").await;
        let dest = Pid::new();
        client
            .register_container(dest, NodeKind::Collection, "dest")
            .await;

        // The binary has a completion mark but no standalone object.
        let mut completed: HashSet<Pid> = HashSet::new();
        completed.insert(work);
        completed.insert(binary);

        let checked = confirm_visible(&client, &graph, &completed).await.unwrap();
        assert_eq!(checked, 1);
    }
}
