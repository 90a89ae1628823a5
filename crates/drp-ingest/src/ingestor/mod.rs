//! The resumable deposit ingestion job
//!
//! One [`ContentIngestor`] owns the end-to-end ingestion of a single staged
//! deposit: it walks the deposit graph depth-first, parent before children
//! and children in declared order, creating each repository object inside a
//! content-store transaction, transferring and checksum-verifying binaries,
//! stamping access grants, and writing provenance events. Every completed
//! object is marked in the status store, so a re-invoked job resumes from
//! the first uncompleted node instead of duplicating work.
//!
//! Traversal outcome is carried as a value up the call stack rather than by
//! unwinding: interruption (pause, cancel, host shutdown) unwinds cleanly
//! with no open transaction and no lost completion marks, and is distinct
//! from failure, which records the cause and rolls back only the object in
//! flight.

pub mod verify;

use crate::acl::{require_permission, AccessControlService, AgentPrincipals, Permission};
use crate::config::{IngestConfig, TxGranularity, DEFAULT_CHECKSUM_RETRY_LIMIT};
use crate::error::{IngestError, InterruptCause};
use crate::graph::store::DepositGraphStore;
use crate::graph::{DepositGraph, DepositNode, NodeKind};
use crate::premis::ProvenanceEvent;
use crate::repository::{BinarySlot, BinarySpec, ContentStoreClient, ObjectSpec, TxId};
use crate::status::{DepositField, DepositState, StatusStore};
use crate::transfer::{BinaryStore, BinaryTransferSession, TransferRequest};
use crate::tx::TransactionManager;
use anyhow::{anyhow, bail};
use drp_common::types::{DepositId, JobId, Pid};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Tunables for one ingestion job
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Immediate retries after a checksum mismatch before it becomes fatal
    pub checksum_retry_limit: u32,
    pub tx_granularity: TxGranularity,
    /// Probe the content store for every completed object before reporting
    /// success
    pub verify_after_run: bool,
    /// Acting agent; defaults to the depositor recorded on the deposit
    pub agent: Option<AgentPrincipals>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            checksum_retry_limit: DEFAULT_CHECKSUM_RETRY_LIMIT,
            tx_granularity: TxGranularity::default(),
            verify_after_run: true,
            agent: None,
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            checksum_retry_limit: config.checksum_retry_limit,
            tx_granularity: config.tx_granularity,
            verify_after_run: config.verify_after_run,
            agent: None,
        }
    }

    /// Act as the given agent instead of the recorded depositor.
    pub fn with_agent(mut self, agent: AgentPrincipals) -> Self {
        self.agent = Some(agent);
        self
    }
}

/// What one completed run did
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub deposit_id: DepositId,
    pub job_id: JobId,
    /// Objects created by this run
    pub created: u64,
    /// Objects found already completed and skipped
    pub skipped: u64,
    /// Completion marks recorded across all runs of this job
    pub completed: u64,
    /// Ingestable nodes in the deposit graph
    pub total: u64,
    /// Whether post-ingestion verification ran
    pub verified: bool,
}

/// Outcome of visiting one subtree
enum Visit {
    /// Subtree fully processed
    Done { created_self: bool },
    /// A stop signal was observed; unwind without failing
    Interrupted(InterruptCause),
}

/// Values fixed for the whole run, threaded through every traversal call
struct RunCtx {
    agent: AgentPrincipals,
    destination: Pid,
    /// Run-wide transaction id under per-deposit granularity
    run_tx: Option<TxId>,
}

/// Mutable traversal state
#[derive(Default)]
struct WalkState {
    created: u64,
    skipped: u64,
    /// Completion marks recorded so far, mirrored into the deposit record
    completed_total: u64,
    /// Marks deferred until the run-wide transaction commits
    pending_marks: Vec<Pid>,
}

/// Depth-first ingestion of one staged deposit
pub struct ContentIngestor {
    deposit_id: DepositId,
    job_id: JobId,
    graphs: DepositGraphStore,
    status: Arc<dyn StatusStore>,
    client: Arc<dyn ContentStoreClient>,
    access: Arc<dyn AccessControlService>,
    transfer: BinaryTransferSession,
    tx: TransactionManager,
    interrupt: Arc<AtomicBool>,
    options: IngestOptions,
}

impl ContentIngestor {
    pub fn new(
        deposit_id: DepositId,
        graphs: DepositGraphStore,
        status: Arc<dyn StatusStore>,
        client: Arc<dyn ContentStoreClient>,
        access: Arc<dyn AccessControlService>,
        binary_store: Arc<dyn BinaryStore>,
        options: IngestOptions,
    ) -> Self {
        let job_id = JobId::for_deposit(&deposit_id);
        let transfer = BinaryTransferSession::new(binary_store, options.checksum_retry_limit);
        let tx = TransactionManager::new(client.clone());
        Self {
            deposit_id,
            job_id,
            graphs,
            status,
            client,
            access,
            transfer,
            tx,
            interrupt: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    pub fn deposit_id(&self) -> DepositId {
        self.deposit_id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Graph store this job reads from; tools and tests stage deposits here.
    pub fn graph_store(&self) -> &DepositGraphStore {
        &self.graphs
    }

    /// Flag the host process can set to stop the job at the next safe point.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Load the deposit, validate its graph, and publish the expected totals.
    ///
    /// Safe to call repeatedly; a resumed job re-derives the same totals.
    #[instrument(skip(self), fields(deposit_id = %self.deposit_id))]
    pub async fn init(&self) -> Result<(), IngestError> {
        self.prepare().await.map(|_| ())
    }

    async fn prepare(&self) -> Result<DepositGraph, IngestError> {
        let fail = |err: anyhow::Error| IngestError::failed(self.deposit_id, err);

        self.status
            .deposit_status(&self.deposit_id)
            .await
            .map_err(|e| fail(e.into()))?;

        let graph = self
            .graphs
            .open_read_only(&self.deposit_id)
            .map_err(|e| fail(e.into()))?;

        let total = graph.ingested_node_count();
        self.status
            .set_total_completion(&self.job_id, total)
            .await
            .map_err(|e| fail(e.into()))?;
        self.status
            .set_deposit_fields(
                &self.deposit_id,
                &[(DepositField::TotalObjects, total.to_string())],
            )
            .await
            .map_err(|e| fail(e.into()))?;

        debug!(total, nodes = graph.len(), "Deposit prepared for ingestion");
        Ok(graph)
    }

    /// Run the job to completion, interruption, or failure.
    ///
    /// Completion marks recorded by earlier runs are honored, so invoking
    /// this again after an interruption or failure continues from the first
    /// uncompleted node.
    #[instrument(skip(self), fields(deposit_id = %self.deposit_id, job_id = %self.job_id))]
    pub async fn run(&self) -> Result<IngestSummary, IngestError> {
        let graph = self.prepare().await?;
        let status = self
            .status
            .deposit_status(&self.deposit_id)
            .await
            .map_err(|e| IngestError::failed(self.deposit_id, anyhow::Error::from(e)))?;

        let agent = match &self.options.agent {
            Some(agent) => agent.clone(),
            None => {
                let name = status.depositor_name.clone().ok_or_else(|| {
                    IngestError::failed(self.deposit_id, anyhow!("Deposit has no depositor recorded"))
                })?;
                AgentPrincipals::from_permission_groups(
                    name,
                    status.permission_groups.as_deref().unwrap_or(""),
                )
            }
        };
        let destination = status.destination_container_id.ok_or_else(|| {
            IngestError::failed(self.deposit_id, anyhow!("Deposit has no destination container"))
        })?;

        // Resync the job counter to the completion set; the set is what
        // resume decisions are made from.
        let completed_before = self
            .status
            .job_completion_set(&self.job_id)
            .await
            .map_err(|e| IngestError::failed(self.deposit_id, anyhow::Error::from(e)))?;
        self.status
            .set_completion(&self.job_id, completed_before.len() as u64)
            .await
            .map_err(|e| IngestError::failed(self.deposit_id, anyhow::Error::from(e)))?;

        let run_tx_guard = match self.options.tx_granularity {
            TxGranularity::PerObject => None,
            TxGranularity::PerDeposit => Some(
                self.tx
                    .begin()
                    .await
                    .map_err(|e| IngestError::failed(self.deposit_id, anyhow::Error::from(e)))?,
            ),
        };
        let ctx = RunCtx {
            agent,
            destination,
            run_tx: run_tx_guard.as_ref().map(|t| t.id().clone()),
        };
        let mut state = WalkState {
            completed_total: completed_before.len() as u64,
            ..WalkState::default()
        };

        info!(
            total = graph.ingested_node_count(),
            already_completed = state.completed_total,
            granularity = %self.options.tx_granularity,
            "Starting ingestion run"
        );

        match self.walk(&graph, &ctx, &mut state).await {
            Ok(Visit::Done { .. }) => {
                if let Some(tx) = run_tx_guard {
                    tx.complete();
                }
                self.flush_pending_marks(&mut state)
                    .await
                    .map_err(|e| IngestError::failed(self.deposit_id, e))?;
                let verified = self
                    .verify_run(&graph)
                    .await
                    .map_err(|e| IngestError::failed(self.deposit_id, e))?;

                let summary = IngestSummary {
                    deposit_id: self.deposit_id,
                    job_id: self.job_id.clone(),
                    created: state.created,
                    skipped: state.skipped,
                    completed: state.completed_total,
                    total: graph.ingested_node_count(),
                    verified,
                };
                info!(
                    created = summary.created,
                    skipped = summary.skipped,
                    completed = summary.completed,
                    "Ingestion run finished"
                );
                Ok(summary)
            }
            Ok(Visit::Interrupted(cause)) => {
                if let Some(tx) = run_tx_guard {
                    let signal = tx.cancel(cause.as_str()).await;
                    debug!(%signal, "Rolled back run transaction on interrupt");
                }
                info!(%cause, created = state.created, "Ingestion run interrupted");
                Err(IngestError::interrupted(self.deposit_id, cause))
            }
            Err(err) => {
                if let Some(tx) = run_tx_guard {
                    let signal = tx.cancel(&err.to_string()).await;
                    debug!(%signal, "Rolled back run transaction on failure");
                }
                if let Err(write_err) = self
                    .status
                    .set_deposit_fields(
                        &self.deposit_id,
                        &[(DepositField::ErrorMessage, err.to_string())],
                    )
                    .await
                {
                    warn!(error = %write_err, "Could not record failure on deposit");
                }
                warn!(error = %err, created = state.created, "Ingestion run failed");
                Err(IngestError::failed(self.deposit_id, err))
            }
        }
    }

    /// Visit every top-level subtree under the bag root.
    async fn walk(
        &self,
        graph: &DepositGraph,
        ctx: &RunCtx,
        state: &mut WalkState,
    ) -> anyhow::Result<Visit> {
        let top_level: Vec<Pid> = graph.root()?.children.clone();
        let mut direct_added = 0u64;

        for pid in top_level {
            match self
                .visit_subtree(graph, ctx, pid, ctx.destination, false, state)
                .await?
            {
                Visit::Done { created_self } => {
                    // Attachments (binaries, manifests) are not child objects.
                    if created_self && graph.node(&pid)?.kind.is_object() {
                        direct_added += 1;
                    }
                }
                interrupted => return Ok(interrupted),
            }
        }

        if direct_added > 0 {
            self.client
                .add_provenance_event(
                    ctx.run_tx.as_ref(),
                    &ProvenanceEvent::added_children(ctx.destination, direct_added)
                        .authorized_by(&ctx.agent.name),
                )
                .await?;
        }

        Ok(Visit::Done {
            created_self: false,
        })
    }

    /// Visit one node and then its subtree.
    ///
    /// `effective_parent` is the content-store object this node attaches to:
    /// its graph parent, or the destination container for top-level nodes.
    fn visit_subtree<'a>(
        &'a self,
        graph: &'a DepositGraph,
        ctx: &'a RunCtx,
        pid: Pid,
        effective_parent: Pid,
        in_primary_subtree: bool,
        state: &'a mut WalkState,
    ) -> BoxFuture<'a, anyhow::Result<Visit>> {
        Box::pin(async move {
            if let Some(cause) = self.poll_stop_signal().await? {
                debug!(%pid, %cause, "Stop signal observed before node");
                return Ok(Visit::Interrupted(cause));
            }

            let node = graph.node(&pid)?;
            let created_at_entry = state.created;
            let created_self = self
                .ensure_node(ctx, node, effective_parent, in_primary_subtree, state)
                .await?;

            let children: Vec<Pid> = node.children.clone();
            let mut direct_added = 0u64;
            for child in children {
                let child_primary =
                    in_primary_subtree || node.primary_object == Some(child);
                match self
                    .visit_subtree(graph, ctx, child, pid, child_primary, state)
                    .await?
                {
                    Visit::Done { created_self } => {
                        if created_self && graph.node(&child)?.kind.is_object() {
                            direct_added += 1;
                        }
                    }
                    interrupted => return Ok(interrupted),
                }
            }

            if node.kind.is_container() && direct_added > 0 {
                self.client
                    .add_provenance_event(
                        ctx.run_tx.as_ref(),
                        &ProvenanceEvent::added_children(pid, direct_added)
                            .authorized_by(&ctx.agent.name),
                    )
                    .await?;
            }

            if node.kind == NodeKind::Work {
                if let Some(primary) = node.primary_object {
                    // Set once, after the file children exist; a resumed run
                    // that created nothing here leaves the link untouched.
                    if state.created > created_at_entry {
                        self.client
                            .set_primary_object(ctx.run_tx.as_ref(), &pid, &primary)
                            .await?;
                        debug!(work = %pid, file = %primary, "Linked primary object");
                    }
                }
            }

            Ok(Visit::Done { created_self })
        })
    }

    /// Create the node's repository counterpart unless it already exists.
    ///
    /// Returns whether this call created it.
    async fn ensure_node(
        &self,
        ctx: &RunCtx,
        node: &DepositNode,
        effective_parent: Pid,
        in_primary_subtree: bool,
        state: &mut WalkState,
    ) -> anyhow::Result<bool> {
        if self
            .status
            .is_object_completed(&self.job_id, &node.pid)
            .await?
        {
            debug!(pid = %node.pid, "Already completed; skipping");
            state.skipped += 1;
            return Ok(false);
        }

        // A mark can be lost between object commit and its recording.
        // Objects the store already holds are reconciled, not re-created.
        if node.kind.is_object() && self.client.object_exists(&node.pid).await? {
            info!(pid = %node.pid, "Object already in content store; reconciling completion mark");
            self.record_completion(node.pid, state).await?;
            state.skipped += 1;
            return Ok(false);
        }

        self.check_permission(ctx, node).await?;

        let tx_guard = match &ctx.run_tx {
            Some(_) => None,
            None => Some(self.tx.begin().await?),
        };
        let tx_id = match (&ctx.run_tx, &tx_guard) {
            (Some(id), _) => id.clone(),
            (None, Some(guard)) => guard.id().clone(),
            (None, None) => bail!("No transaction available for object creation"),
        };

        match self
            .create_node(ctx, node, effective_parent, in_primary_subtree, &tx_id)
            .await
        {
            Ok(landed_uri) => {
                if let Some(tx) = tx_guard {
                    tx.complete();
                }
                if let Some(uri) = landed_uri {
                    self.stamp_storage_uri(node.pid, uri)?;
                }
                match self.options.tx_granularity {
                    TxGranularity::PerObject => self.record_completion(node.pid, state).await?,
                    TxGranularity::PerDeposit => state.pending_marks.push(node.pid),
                }
                state.created += 1;
                info!(pid = %node.pid, kind = %node.kind, "Ingested object");
                Ok(true)
            }
            Err(err) => {
                if let Some(tx) = tx_guard {
                    let signal = tx.cancel(&err.to_string()).await;
                    debug!(%signal, pid = %node.pid, "Rolled back object transaction");
                }
                Err(err)
            }
        }
    }

    /// Permission gate, evaluated before any write for the node.
    ///
    /// Checks target the deposit's destination container: objects staged in
    /// this deposit inherit from it and carry no independent ACLs until they
    /// are committed.
    async fn check_permission(&self, ctx: &RunCtx, node: &DepositNode) -> anyhow::Result<()> {
        let permission = match node.kind {
            NodeKind::AdminUnit => Permission::CreateAdminUnit,
            NodeKind::Collection => Permission::CreateCollection,
            _ => Permission::Ingest,
        };
        require_permission(
            self.access.as_ref(),
            &ctx.agent,
            &ctx.destination,
            permission,
        )
        .await
    }

    /// Issue the content-store writes for one node under the given
    /// transaction. Returns the landed URI of its content, if it has any.
    async fn create_node(
        &self,
        ctx: &RunCtx,
        node: &DepositNode,
        effective_parent: Pid,
        in_primary_subtree: bool,
        tx: &TxId,
    ) -> anyhow::Result<Option<String>> {
        let tx = Some(tx);
        let grants = effective_grants(node, in_primary_subtree);

        match node.kind {
            NodeKind::Bag => bail!("Bag root is never ingested"),
            NodeKind::AdminUnit | NodeKind::Collection | NodeKind::Folder | NodeKind::Work => {
                let spec = ObjectSpec::new(node.pid, node.kind, effective_parent, &node.label)
                    .with_grants(grants.clone());
                self.client.create_object(tx, &spec).await?;
                self.client
                    .add_provenance_event(
                        tx,
                        &ProvenanceEvent::ingestion(node.pid, None, None)
                            .authorized_by(&ctx.agent.name),
                    )
                    .await?;
                self.add_policy_event(tx, node.pid, &grants, ctx).await?;
                Ok(None)
            }
            NodeKind::File => {
                let spec = ObjectSpec::new(node.pid, node.kind, effective_parent, &node.label)
                    .with_grants(grants.clone());
                self.client.create_object(tx, &spec).await?;

                let stored = self
                    .transfer_content(node, node.pid, BinarySlot::Original)
                    .await?;
                self.add_stored_binary(tx, node, node.pid, BinarySlot::Original, &stored)
                    .await?;

                if let Some(uri) = &node.tech_metadata_uri {
                    let tech = self
                        .transfer
                        .transfer(&TransferRequest::new(
                            node.pid,
                            BinarySlot::TechnicalMetadata,
                            uri.clone(),
                        ))
                        .await?;
                    self.client
                        .add_binary(
                            tx,
                            &BinarySpec::new(node.pid, BinarySlot::TechnicalMetadata, &tech.uri)
                                .with_size(tech.size)
                                .with_digests(tech.digests),
                        )
                        .await?;
                }
                if let Some(uri) = &node.history_uri {
                    let history = self
                        .transfer
                        .transfer(&TransferRequest::new(
                            node.pid,
                            BinarySlot::History,
                            uri.clone(),
                        ))
                        .await?;
                    self.client
                        .add_binary(
                            tx,
                            &BinarySpec::new(node.pid, BinarySlot::History, &history.uri)
                                .with_size(history.size)
                                .with_digests(history.digests),
                        )
                        .await?;
                }

                self.client
                    .add_provenance_event(
                        tx,
                        &ProvenanceEvent::ingestion(
                            node.pid,
                            node.filename.as_deref(),
                            node.mimetype.as_deref(),
                        )
                        .authorized_by(&ctx.agent.name),
                    )
                    .await?;
                self.add_fixity_events(tx, node, node.pid, &stored).await?;
                self.add_policy_event(tx, node.pid, &grants, ctx).await?;
                Ok(Some(stored.uri))
            }
            NodeKind::Binary => {
                let stored = self
                    .transfer_content(node, node.pid, BinarySlot::Alternate)
                    .await?;
                self.add_stored_binary(tx, node, effective_parent, BinarySlot::Alternate, &stored)
                    .await?;
                self.client
                    .add_provenance_event(
                        tx,
                        &ProvenanceEvent::ingestion(
                            effective_parent,
                            node.filename.as_deref(),
                            node.mimetype.as_deref(),
                        )
                        .authorized_by(&ctx.agent.name),
                    )
                    .await?;
                self.add_fixity_events(tx, node, effective_parent, &stored).await?;
                Ok(Some(stored.uri))
            }
            NodeKind::ManifestEntry => {
                let stored = self
                    .transfer_content(node, node.pid, BinarySlot::Manifest)
                    .await?;
                self.add_stored_binary(tx, node, effective_parent, BinarySlot::Manifest, &stored)
                    .await?;
                self.client
                    .add_provenance_event(
                        tx,
                        &ProvenanceEvent::ingestion(
                            effective_parent,
                            node.filename.as_deref(),
                            node.mimetype.as_deref(),
                        )
                        .authorized_by(&ctx.agent.name),
                    )
                    .await?;
                Ok(Some(stored.uri))
            }
        }
    }

    /// Transfer a node's staged content with digest verification.
    async fn transfer_content(
        &self,
        node: &DepositNode,
        pid: Pid,
        slot: BinarySlot,
    ) -> anyhow::Result<crate::transfer::StoredBinary> {
        let staging = node
            .staging_uri
            .clone()
            .ok_or_else(|| anyhow!("Node {} has no staged content", node.pid))?;
        let request = TransferRequest::new(pid, slot, staging)
            .with_declared_digests(node.digests.clone());
        Ok(self.transfer.transfer(&request).await?)
    }

    async fn add_stored_binary(
        &self,
        tx: Option<&TxId>,
        node: &DepositNode,
        parent: Pid,
        slot: BinarySlot,
        stored: &crate::transfer::StoredBinary,
    ) -> anyhow::Result<()> {
        let mut spec = BinarySpec::new(parent, slot, &stored.uri)
            .with_size(stored.size)
            .with_digests(stored.digests.clone());
        if let Some(filename) = &node.filename {
            spec = spec.with_filename(filename);
        }
        if let Some(mimetype) = &node.mimetype {
            spec = spec.with_mimetype(mimetype);
        }
        self.client.add_binary(tx, &spec).await?;
        Ok(())
    }

    /// One fixity event per declared digest that the transfer verified.
    async fn add_fixity_events(
        &self,
        tx: Option<&TxId>,
        node: &DepositNode,
        object: Pid,
        stored: &crate::transfer::StoredBinary,
    ) -> anyhow::Result<()> {
        for algorithm in node.digests.keys() {
            if let Some(value) = stored.digests.get(algorithm) {
                self.client
                    .add_provenance_event(tx, &ProvenanceEvent::fixity(object, *algorithm, value))
                    .await?;
            }
        }
        Ok(())
    }

    async fn add_policy_event(
        &self,
        tx: Option<&TxId>,
        object: Pid,
        grants: &[crate::acl::AccessGrant],
        ctx: &RunCtx,
    ) -> anyhow::Result<()> {
        if grants.is_empty() {
            return Ok(());
        }
        self.client
            .add_provenance_event(
                tx,
                &ProvenanceEvent::policy_assignment(object, grants.len())
                    .authorized_by(&ctx.agent.name),
            )
            .await?;
        Ok(())
    }

    /// Record one completion mark and mirror the running count onto the
    /// deposit record.
    async fn record_completion(&self, pid: Pid, state: &mut WalkState) -> anyhow::Result<()> {
        self.status.mark_object_completed(&self.job_id, &pid).await?;
        self.status.increment_completion(&self.job_id, 1).await?;
        state.completed_total += 1;
        self.status
            .set_deposit_fields(
                &self.deposit_id,
                &[(
                    DepositField::IngestedObjects,
                    state.completed_total.to_string(),
                )],
            )
            .await?;
        Ok(())
    }

    /// Flush marks deferred under per-deposit granularity.
    async fn flush_pending_marks(&self, state: &mut WalkState) -> anyhow::Result<()> {
        if state.pending_marks.is_empty() {
            return Ok(());
        }
        let marks = std::mem::take(&mut state.pending_marks);
        let count = marks.len() as u64;
        for pid in &marks {
            self.status.mark_object_completed(&self.job_id, pid).await?;
        }
        self.status.increment_completion(&self.job_id, count).await?;
        state.completed_total += count;
        self.status
            .set_deposit_fields(
                &self.deposit_id,
                &[(
                    DepositField::IngestedObjects,
                    state.completed_total.to_string(),
                )],
            )
            .await?;
        Ok(())
    }

    /// Write the landed content location back onto the graph node.
    fn stamp_storage_uri(&self, pid: Pid, uri: String) -> anyhow::Result<()> {
        let mut writable = self.graphs.open_writable(&self.deposit_id)?;
        writable.node_mut(&pid)?.storage_uri = Some(uri);
        writable.close()?;
        Ok(())
    }

    /// The cooperative stop check run before every node.
    async fn poll_stop_signal(&self) -> anyhow::Result<Option<InterruptCause>> {
        if self.interrupt.load(Ordering::Relaxed) {
            return Ok(Some(InterruptCause::Shutdown));
        }
        let deposit_state = self.status.poll_deposit_state(&self.deposit_id).await?;
        if deposit_state.allows_progress() {
            Ok(None)
        } else {
            Ok(Some(match deposit_state {
                DepositState::Cancelled => InterruptCause::Cancelled,
                _ => InterruptCause::Paused,
            }))
        }
    }

    async fn verify_run(&self, graph: &DepositGraph) -> anyhow::Result<bool> {
        if !self.options.verify_after_run {
            return Ok(false);
        }
        let completed = self.status.job_completion_set(&self.job_id).await?;
        verify::confirm_visible(self.client.as_ref(), graph, &completed).await?;
        Ok(true)
    }
}

/// Grants to stamp on a created object.
///
/// Revocations never apply inside a work's primary-object subtree; a
/// staff-only deposit must not hide the representative file.
fn effective_grants(node: &DepositNode, in_primary_subtree: bool) -> Vec<crate::acl::AccessGrant> {
    if in_primary_subtree {
        node.grants
            .iter()
            .filter(|grant| !grant.is_revocation())
            .cloned()
            .collect()
    } else {
        node.grants.clone()
    }
}
