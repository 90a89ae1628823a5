//! Integration tests for the deposit ingestion pipeline
//!
//! Drives full `ContentIngestor` runs against the in-memory status and
//! content stores with a filesystem binary store, covering the
//! resumability contract end to end:
//! 1. Rerunning a finished job creates nothing and changes no counters
//! 2. Completion increments follow the ingestable node count
//! 3. A bad file fails its run without damaging committed siblings, and a
//!    repaired rerun finishes with exactly the remaining increments
//! 4. Primary-object links and aggregate container events
//! 5. A transient checksum failure retries without duplicating the object
//! 6. Pausing mid-run stops cleanly; resuming finishes each node once
//! 7. Manifests and supplemental binaries attach to their parent objects

use async_trait::async_trait;
use drp_common::types::{DepositId, DigestAlgorithm, JobId, Pid};
use drp_ingest::acl::StaticAccessControl;
use drp_ingest::error::{StatusError, TransferError};
use drp_ingest::graph::store::DepositGraphStore;
use drp_ingest::graph::{DepositGraph, DepositNode, NodeKind};
use drp_ingest::ingestor::IngestOptions;
use drp_ingest::premis::PremisEventType;
use drp_ingest::repository::{BinarySlot, MemoryContentStore};
use drp_ingest::status::{
    DepositField, DepositState, DepositStatus, JobProgress, MemoryStatusStore, StatusStore,
};
use drp_ingest::transfer::{BinaryStore, FsBinaryStore, StoredBinary};
use drp_ingest::ContentIngestor;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

// md5 of "hello world"
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

/// One staged deposit with its destination container and backing stores.
struct TestDeposit {
    dir: tempfile::TempDir,
    deposit_id: DepositId,
    destination: Pid,
    status: Arc<MemoryStatusStore>,
    client: Arc<MemoryContentStore>,
}

impl TestDeposit {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let deposit_id = DepositId::new();
        let destination = Pid::new();

        let status = Arc::new(MemoryStatusStore::new());
        status
            .set_deposit_fields(
                &deposit_id,
                &[
                    (DepositField::State, "running".to_string()),
                    (DepositField::DepositorName, "lbaker".to_string()),
                    (
                        DepositField::DestinationContainerId,
                        destination.to_string(),
                    ),
                    (
                        DepositField::PermissionGroups,
                        "repository-admins".to_string(),
                    ),
                ],
            )
            .await
            .expect("Failed to stage deposit record");

        let client = Arc::new(MemoryContentStore::new());
        client
            .register_container(destination, NodeKind::Collection, "destination")
            .await;

        Self {
            dir,
            deposit_id,
            destination,
            status,
            client,
        }
    }

    /// Write staged content to disk; staging the same name again overwrites.
    fn stage_file(&self, name: &str, content: &[u8]) -> String {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("Failed to stage file");
        file.write_all(content).expect("Failed to stage file");
        format!("file://{}", path.display())
    }

    fn graph_store(&self) -> DepositGraphStore {
        DepositGraphStore::new(self.dir.path().join("deposits"))
    }

    fn storage_root(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    fn ingestor(&self, options: IngestOptions) -> ContentIngestor {
        self.ingestor_with(
            self.status.clone(),
            Arc::new(FsBinaryStore::new(self.storage_root())),
            options,
        )
    }

    fn ingestor_with(
        &self,
        status: Arc<dyn StatusStore>,
        binaries: Arc<dyn BinaryStore>,
        options: IngestOptions,
    ) -> ContentIngestor {
        ContentIngestor::new(
            self.deposit_id,
            self.graph_store(),
            status,
            self.client.clone(),
            Arc::new(StaticAccessControl::new(vec![
                "repository-admins".to_string()
            ])),
            binaries,
            options,
        )
    }

    async fn set_state(&self, state: &str) {
        self.status
            .set_deposit_fields(
                &self.deposit_id,
                &[(DepositField::State, state.to_string())],
            )
            .await
            .expect("Failed to set deposit state");
    }
}

fn bag() -> (DepositGraph, Pid) {
    let root = Pid::new();
    let graph = DepositGraph::new(DepositNode::new(root, NodeKind::Bag, "bag"))
        .expect("Failed to create deposit graph");
    (graph, root)
}

fn insert(graph: &mut DepositGraph, node: DepositNode) {
    graph.insert(node).expect("Failed to insert graph node");
}

/// Binary store that reports a corrupted digest for its first put.
struct FlakyOnceStore {
    inner: FsBinaryStore,
    corrupted: AtomicBool,
    puts: AtomicU32,
}

impl FlakyOnceStore {
    fn new(root: PathBuf) -> Self {
        Self {
            inner: FsBinaryStore::new(root),
            corrupted: AtomicBool::new(false),
            puts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl BinaryStore for FlakyOnceStore {
    async fn put(
        &self,
        pid: &Pid,
        slot: BinarySlot,
        source: &Path,
        algorithms: &[DigestAlgorithm],
    ) -> Result<StoredBinary, TransferError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.inner.put(pid, slot, source, algorithms).await?;
        if !self.corrupted.swap(true, Ordering::SeqCst) {
            for value in stored.digests.values_mut() {
                *value = "f".repeat(value.len());
            }
        }
        Ok(stored)
    }

    async fn remove(&self, pid: &Pid, slot: BinarySlot) -> Result<(), TransferError> {
        self.inner.remove(pid, slot).await
    }
}

/// Status store that flips the deposit to paused after N traversal polls.
struct PauseAfterPolls {
    inner: Arc<MemoryStatusStore>,
    deposit_id: DepositId,
    remaining: AtomicI64,
}

impl PauseAfterPolls {
    fn new(inner: Arc<MemoryStatusStore>, deposit_id: DepositId, polls: i64) -> Self {
        Self {
            inner,
            deposit_id,
            remaining: AtomicI64::new(polls),
        }
    }
}

#[async_trait]
impl StatusStore for PauseAfterPolls {
    async fn deposit_status(&self, deposit_id: &DepositId) -> Result<DepositStatus, StatusError> {
        self.inner.deposit_status(deposit_id).await
    }

    async fn set_deposit_fields(
        &self,
        deposit_id: &DepositId,
        fields: &[(DepositField, String)],
    ) -> Result<(), StatusError> {
        self.inner.set_deposit_fields(deposit_id, fields).await
    }

    async fn poll_deposit_state(
        &self,
        deposit_id: &DepositId,
    ) -> Result<DepositState, StatusError> {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            // An operator pauses the deposit while the job is mid-walk.
            self.inner
                .set_deposit_fields(
                    &self.deposit_id,
                    &[(DepositField::State, "paused".to_string())],
                )
                .await?;
        }
        self.inner.poll_deposit_state(deposit_id).await
    }

    async fn job_completion_set(&self, job_id: &JobId) -> Result<HashSet<Pid>, StatusError> {
        self.inner.job_completion_set(job_id).await
    }

    async fn is_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<bool, StatusError> {
        self.inner.is_object_completed(job_id, pid).await
    }

    async fn mark_object_completed(&self, job_id: &JobId, pid: &Pid) -> Result<(), StatusError> {
        self.inner.mark_object_completed(job_id, pid).await
    }

    async fn increment_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        self.inner.increment_completion(job_id, n).await
    }

    async fn set_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        self.inner.set_completion(job_id, n).await
    }

    async fn set_total_completion(&self, job_id: &JobId, n: u64) -> Result<(), StatusError> {
        self.inner.set_total_completion(job_id, n).await
    }

    async fn job_progress(&self, job_id: &JobId) -> Result<JobProgress, StatusError> {
        self.inner.job_progress(job_id).await
    }
}

// ============================================================================
// Resumability Tests
// ============================================================================

#[tokio::test]
async fn test_completed_job_rerun_creates_nothing() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let folder = Pid::new();
    let work = Pid::new();
    let file = Pid::new();
    let staged = deposit.stage_file("content.txt", b"hello world");

    insert(
        &mut graph,
        DepositNode::new(folder, NodeKind::Folder, "folder").with_parent(root),
    );
    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(folder)
            .with_primary_object(file),
    );
    insert(
        &mut graph,
        DepositNode::new(file, NodeKind::File, "file")
            .with_parent(work)
            .with_staging_uri(staged)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );

    let ingestor = deposit.ingestor(IngestOptions::default());
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    let first = ingestor.run().await.expect("First run should succeed");
    assert_eq!(first.created, 3);
    assert_eq!(first.completed, 3);

    // The landed location was stamped back onto the staged graph.
    let stamped = ingestor
        .graph_store()
        .open_read_only(&deposit.deposit_id)
        .expect("Failed to reopen graph");
    let storage_uri = stamped
        .node(&file)
        .expect("File node should still exist")
        .storage_uri
        .clone()
        .expect("File should carry its landed URI");
    assert!(storage_uri.starts_with("file://"));

    let objects_after_first = deposit.client.object_count().await;
    let folder_events_after_first = deposit.client.events_for(&folder).await.len();

    let second = ingestor.run().await.expect("Rerun should succeed");
    assert_eq!(second.created, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.completed, 3);

    // Nothing in the content store moved: no duplicate objects, no
    // duplicate membership, no duplicate provenance.
    assert_eq!(deposit.client.object_count().await, objects_after_first);
    assert_eq!(
        deposit.client.events_for(&folder).await.len(),
        folder_events_after_first
    );
    assert_eq!(
        deposit.client.children_of(&deposit.destination).await,
        vec![folder]
    );

    let progress = deposit
        .status
        .job_progress(ingestor.job_id())
        .await
        .expect("Failed to read job progress");
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.total, 3);
}

#[tokio::test]
async fn test_folder_chain_completion_count() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();

    let mut parent = root;
    let mut folders = Vec::new();
    for depth in 0..4 {
        let folder = Pid::new();
        insert(
            &mut graph,
            DepositNode::new(folder, NodeKind::Folder, format!("level-{depth}"))
                .with_parent(parent),
        );
        folders.push(folder);
        parent = folder;
    }
    let work = Pid::new();
    let file = Pid::new();
    let staged = deposit.stage_file("leaf.txt", b"hello world");
    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(parent)
            .with_primary_object(file),
    );
    insert(
        &mut graph,
        DepositNode::new(file, NodeKind::File, "leaf")
            .with_parent(work)
            .with_staging_uri(staged)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );

    let ingestor = deposit.ingestor(IngestOptions::default());
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    // Four folders plus the work and its file.
    let summary = ingestor.run().await.expect("Run should succeed");
    assert_eq!(summary.created, 6);
    assert_eq!(summary.total, 6);

    let progress = deposit
        .status
        .job_progress(ingestor.job_id())
        .await
        .expect("Failed to read job progress");
    assert_eq!(progress.completed, 6);

    // The destination holds exactly the chain head; every link holds one.
    assert_eq!(deposit.client.children_of(&deposit.destination).await.len(), 1);
    for folder in &folders {
        assert_eq!(deposit.client.children_of(folder).await.len(), 1);
    }
    assert_eq!(deposit.client.primary_object_of(&work).await, Some(file));
}

#[tokio::test]
async fn test_failed_file_leaves_siblings_committed() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let folder = Pid::new();
    let work_a = Pid::new();
    let file_a = Pid::new();
    let work_b = Pid::new();
    let file_b = Pid::new();

    let good = deposit.stage_file("good.txt", b"hello world");
    let bad = deposit.stage_file("bad.txt", b"tampered during staging");

    insert(
        &mut graph,
        DepositNode::new(folder, NodeKind::Folder, "folder").with_parent(root),
    );
    insert(
        &mut graph,
        DepositNode::new(work_a, NodeKind::Work, "work a")
            .with_parent(folder)
            .with_primary_object(file_a),
    );
    insert(
        &mut graph,
        DepositNode::new(file_a, NodeKind::File, "file a")
            .with_parent(work_a)
            .with_staging_uri(good)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );
    insert(
        &mut graph,
        DepositNode::new(work_b, NodeKind::Work, "work b")
            .with_parent(folder)
            .with_primary_object(file_b),
    );
    insert(
        &mut graph,
        DepositNode::new(file_b, NodeKind::File, "file b")
            .with_parent(work_b)
            .with_staging_uri(bad)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );

    let ingestor = deposit.ingestor(IngestOptions::default());
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    let err = ingestor
        .run()
        .await
        .expect_err("Mismatched digest must fail the run");
    assert!(!err.is_interrupted());

    // Everything before the bad file stays committed and visible. The
    // second work exists but has no file children.
    assert_eq!(
        deposit.client.children_of(&folder).await,
        vec![work_a, work_b]
    );
    assert_eq!(deposit.client.children_of(&work_a).await, vec![file_a]);
    assert!(deposit.client.children_of(&work_b).await.is_empty());

    let completed = deposit
        .status
        .job_completion_set(ingestor.job_id())
        .await
        .expect("Failed to read completion set");
    assert_eq!(completed.len(), 4);
    assert!(!completed.contains(&file_b));

    // The failure cause lands on the deposit record for the operator.
    let record = deposit
        .status
        .deposit_status(&deposit.deposit_id)
        .await
        .expect("Failed to read deposit record");
    assert!(record
        .error_message
        .expect("Failure should be recorded")
        .contains("Checksum mismatch"));

    // Repair the staged copy and rerun: only the bad file is created.
    deposit.stage_file("bad.txt", b"hello world");
    let summary = ingestor
        .run()
        .await
        .expect("Rerun after repair should finish");
    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.completed, 5);

    assert_eq!(deposit.client.children_of(&work_b).await, vec![file_b]);
    assert_eq!(
        deposit.client.children_of(&folder).await,
        vec![work_a, work_b]
    );
    assert_eq!(
        deposit.client.children_of(&deposit.destination).await,
        vec![folder]
    );
    // The repaired work received its primary-object link after all.
    assert_eq!(
        deposit.client.primary_object_of(&work_b).await,
        Some(file_b)
    );
}

#[tokio::test]
async fn test_pause_interrupts_and_resume_finishes_each_node_once() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let folder = Pid::new();
    let work = Pid::new();
    let file = Pid::new();
    let staged = deposit.stage_file("content.txt", b"hello world");

    insert(
        &mut graph,
        DepositNode::new(folder, NodeKind::Folder, "folder").with_parent(root),
    );
    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(folder)
            .with_primary_object(file),
    );
    insert(
        &mut graph,
        DepositNode::new(file, NodeKind::File, "file")
            .with_parent(work)
            .with_staging_uri(staged)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );

    // The second traversal poll observes the pause, after the folder but
    // before the work.
    let pausing = Arc::new(PauseAfterPolls::new(
        deposit.status.clone(),
        deposit.deposit_id,
        2,
    ));
    let ingestor = deposit.ingestor_with(
        pausing,
        Arc::new(FsBinaryStore::new(deposit.storage_root())),
        IngestOptions::default(),
    );
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    let err = ingestor.run().await.expect_err("Pause must interrupt the run");
    assert!(err.is_interrupted());
    assert!(err.to_string().contains("paused"));

    assert_eq!(deposit.client.object_count().await, 2);
    let completed = deposit
        .status
        .job_completion_set(ingestor.job_id())
        .await
        .expect("Failed to read completion set");
    assert_eq!(completed.len(), 1);
    assert!(completed.contains(&folder));

    // An operator resumes the deposit; the rerun finishes the rest.
    deposit.set_state("running").await;
    let summary = ingestor.run().await.expect("Resumed run should finish");
    assert_eq!(summary.created, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 3);

    assert_eq!(deposit.client.children_of(&folder).await, vec![work]);
    assert_eq!(deposit.client.children_of(&work).await, vec![file]);
}

// ============================================================================
// Placement and Provenance Tests
// ============================================================================

#[tokio::test]
async fn test_primary_linkage_and_container_events() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let work = Pid::new();
    let file_a = Pid::new();
    let file_b = Pid::new();

    let staged_a = deposit.stage_file("primary.txt", b"hello world");
    let staged_b = deposit.stage_file("supplement.txt", b"supplemental reading");

    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(root)
            .with_primary_object(file_a),
    );
    insert(
        &mut graph,
        DepositNode::new(file_a, NodeKind::File, "primary file")
            .with_parent(work)
            .with_staging_uri(staged_a)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );
    // No declared digest on the supplement; the transfer still records one.
    insert(
        &mut graph,
        DepositNode::new(file_b, NodeKind::File, "supplemental file")
            .with_parent(work)
            .with_staging_uri(staged_b),
    );

    let ingestor = deposit.ingestor(IngestOptions::default());
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");
    ingestor.run().await.expect("Run should succeed");

    assert_eq!(deposit.client.primary_object_of(&work).await, Some(file_a));

    // The declared digest produced a fixity note next to the ingestion note.
    let events_a = deposit.client.events_for(&file_a).await;
    assert_eq!(
        events_a
            .iter()
            .filter(|e| e.event_type == PremisEventType::Ingestion)
            .count(),
        1
    );
    assert_eq!(
        events_a
            .iter()
            .filter(|e| e.event_type == PremisEventType::FixityCheck)
            .count(),
        1
    );

    let events_b = deposit.client.events_for(&file_b).await;
    assert_eq!(events_b.len(), 1);
    assert_eq!(events_b[0].event_type, PremisEventType::Ingestion);

    // Exactly one aggregate note on the work, counting both files.
    let work_events = deposit.client.events_for(&work).await;
    let aggregates: Vec<_> = work_events
        .iter()
        .filter(|e| e.detail.contains("added 2 child objects"))
        .collect();
    assert_eq!(aggregates.len(), 1);

    // The destination gained one child object, the work.
    let destination_events = deposit.client.events_for(&deposit.destination).await;
    assert_eq!(destination_events.len(), 1);
    assert!(destination_events[0]
        .detail
        .contains("added 1 child objects"));

    // The undeclared digest was still computed on the landed binary.
    let supplement = deposit
        .client
        .binary(&file_b, BinarySlot::Original)
        .await
        .expect("Supplemental file should carry its content");
    assert!(supplement.digests.contains_key(&DigestAlgorithm::Md5));
}

#[tokio::test]
async fn test_manifest_and_supplemental_content_attach_to_parents() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let work = Pid::new();
    let file = Pid::new();
    let binary = Pid::new();
    let manifest = Pid::new();

    let staged_file = deposit.stage_file("scan.tiff", b"hello world");
    let staged_binary = deposit.stage_file("notes.xml", b"supplemental notes");
    let staged_manifest = deposit.stage_file("manifest.txt", b"one file, one note");

    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(root)
            .with_primary_object(file),
    );
    insert(
        &mut graph,
        DepositNode::new(file, NodeKind::File, "scan")
            .with_parent(work)
            .with_staging_uri(staged_file)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5)
            .with_filename("scan.tiff")
            .with_mimetype("image/tiff"),
    );
    insert(
        &mut graph,
        DepositNode::new(binary, NodeKind::Binary, "notes")
            .with_parent(file)
            .with_staging_uri(staged_binary)
            .with_filename("notes.xml"),
    );
    insert(
        &mut graph,
        DepositNode::new(manifest, NodeKind::ManifestEntry, "manifest")
            .with_parent(root)
            .with_staging_uri(staged_manifest)
            .with_filename("manifest.txt"),
    );

    let ingestor = deposit.ingestor(IngestOptions::default());
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    let summary = ingestor.run().await.expect("Run should succeed");
    assert_eq!(summary.created, 4);
    assert_eq!(summary.total, 4);

    // Only the work and file became objects; the rest are attachments.
    assert_eq!(deposit.client.object_count().await, 3);
    assert!(deposit.client.kind_of(&binary).await.is_none());
    assert!(deposit.client.kind_of(&manifest).await.is_none());

    let original = deposit
        .client
        .binary(&file, BinarySlot::Original)
        .await
        .expect("File should carry its original content");
    assert_eq!(original.size, 11);

    let alternate = deposit
        .client
        .binary(&file, BinarySlot::Alternate)
        .await
        .expect("Supplemental binary should attach to the file");
    assert_eq!(alternate.size, b"supplemental notes".len() as u64);

    let landed_manifest = deposit
        .client
        .binary(&deposit.destination, BinarySlot::Manifest)
        .await
        .expect("Manifest should attach to the destination");
    assert!(landed_manifest.digests.contains_key(&DigestAlgorithm::Md5));

    // The aggregate on the destination counts the work alone; manifest and
    // binary attachments are not child objects.
    let destination_events = deposit.client.events_for(&deposit.destination).await;
    let aggregates: Vec<_> = destination_events
        .iter()
        .filter(|e| e.detail.contains("child objects"))
        .collect();
    assert_eq!(aggregates.len(), 1);
    assert!(aggregates[0].detail.contains("added 1 child objects"));
    // The manifest's own ingestion note landed on the destination.
    assert!(destination_events.iter().any(|e| {
        e.event_type == PremisEventType::Ingestion && e.detail.contains("manifest.txt")
    }));
}

// ============================================================================
// Transfer Retry Tests
// ============================================================================

#[tokio::test]
async fn test_transient_checksum_failure_creates_no_duplicate() {
    let deposit = TestDeposit::new().await;
    let (mut graph, root) = bag();
    let work = Pid::new();
    let file = Pid::new();
    let staged = deposit.stage_file("content.txt", b"hello world");

    insert(
        &mut graph,
        DepositNode::new(work, NodeKind::Work, "work")
            .with_parent(root)
            .with_primary_object(file),
    );
    insert(
        &mut graph,
        DepositNode::new(file, NodeKind::File, "file")
            .with_parent(work)
            .with_staging_uri(staged)
            .with_digest(DigestAlgorithm::Md5, HELLO_MD5),
    );

    let store = Arc::new(FlakyOnceStore::new(deposit.storage_root()));
    let ingestor = deposit.ingestor_with(
        deposit.status.clone(),
        store.clone(),
        IngestOptions::default(),
    );
    ingestor
        .graph_store()
        .create(&deposit.deposit_id, &graph)
        .expect("Failed to stage deposit graph");

    let summary = ingestor.run().await.expect("Retry should recover the run");
    assert_eq!(summary.created, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(store.puts.load(Ordering::SeqCst), 2);

    // One object, one membership entry, and a verified landed digest.
    assert_eq!(deposit.client.children_of(&work).await, vec![file]);
    let landed = deposit
        .client
        .binary(&file, BinarySlot::Original)
        .await
        .expect("File should carry its content");
    assert_eq!(landed.digests[&DigestAlgorithm::Md5], HELLO_MD5);
}
