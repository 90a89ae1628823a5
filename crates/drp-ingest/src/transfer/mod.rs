//! Checksum-verified binary transfer
//!
//! Copies staged binaries into their permanent storage location and
//! confirms the landed bytes match every digest declared on the deposit.
//! Digests are computed from the bytes actually written, so a short read,
//! a corrupted staging copy, or a bad landing all surface as a mismatch.
//! One mismatch is classified transient and retried in place; a repeat is
//! returned to the caller with the attempt count.

pub mod fs;
pub mod s3;

pub use fs::FsBinaryStore;
pub use s3::{S3BinaryStore, S3Config};

use crate::error::TransferError;
use crate::repository::BinarySlot;
use async_trait::async_trait;
use drp_common::types::{DigestAlgorithm, DigestMap, Pid};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Binary as landed in permanent storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBinary {
    /// Permanent location of the bytes
    pub uri: String,
    pub size: u64,
    /// Digests computed from the transferred bytes
    pub digests: DigestMap,
}

/// Destination store for transferred binaries
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Copy the staged bytes into place, computing the given digests from
    /// the bytes written.
    async fn put(
        &self,
        pid: &Pid,
        slot: BinarySlot,
        source: &Path,
        algorithms: &[DigestAlgorithm],
    ) -> Result<StoredBinary, TransferError>;

    /// Remove a landed binary. Removing an absent binary is not an error.
    async fn remove(&self, pid: &Pid, slot: BinarySlot) -> Result<(), TransferError>;
}

/// One staged binary to move into permanent storage
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Object the binary belongs to
    pub pid: Pid,
    pub slot: BinarySlot,
    /// `file://` URI or plain path of the staged bytes
    pub staging_uri: String,
    /// Declared digests the landed bytes must match exactly
    pub declared_digests: DigestMap,
}

impl TransferRequest {
    pub fn new(pid: Pid, slot: BinarySlot, staging_uri: impl Into<String>) -> Self {
        Self {
            pid,
            slot,
            staging_uri: staging_uri.into(),
            declared_digests: DigestMap::new(),
        }
    }

    pub fn with_declared_digests(mut self, digests: DigestMap) -> Self {
        self.declared_digests = digests;
        self
    }
}

/// Copies staged binaries into permanent storage and verifies digests
pub struct BinaryTransferSession {
    store: Arc<dyn BinaryStore>,
    retry_limit: u32,
}

impl BinaryTransferSession {
    /// `retry_limit` is the number of immediate retries after a mismatch,
    /// not the total attempt count.
    pub fn new(store: Arc<dyn BinaryStore>, retry_limit: u32) -> Self {
        Self { store, retry_limit }
    }

    /// Transfer one binary and verify every declared digest.
    #[instrument(skip(self, request), fields(pid = %request.pid, slot = %request.slot))]
    pub async fn transfer(&self, request: &TransferRequest) -> Result<StoredBinary, TransferError> {
        let source = staging_path(&request.staging_uri)?;
        let algorithms = digest_algorithms(&request.declared_digests);

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let stored = self
                .store
                .put(&request.pid, request.slot, &source, &algorithms)
                .await?;

            match first_mismatch(&stored, &request.declared_digests) {
                None => {
                    if attempts > 1 {
                        info!(attempts, "Binary transfer verified after retry");
                    }
                    return Ok(stored);
                }
                Some((algorithm, declared, computed)) => {
                    // Never leave a bad copy in permanent storage.
                    self.store.remove(&request.pid, request.slot).await?;
                    if attempts > self.retry_limit {
                        return Err(TransferError::ChecksumMismatch {
                            algorithm,
                            declared,
                            computed,
                            attempts,
                        });
                    }
                    warn!(
                        algorithm = %algorithm,
                        attempt = attempts,
                        "Checksum mismatch, retrying transfer"
                    );
                }
            }
        }
    }
}

/// Algorithms to compute for a transfer. Digests are always recorded, so a
/// binary with nothing declared still gets an md5.
fn digest_algorithms(declared: &DigestMap) -> Vec<DigestAlgorithm> {
    if declared.is_empty() {
        vec![DigestAlgorithm::Md5]
    } else {
        declared.keys().copied().collect()
    }
}

fn first_mismatch(
    stored: &StoredBinary,
    declared: &DigestMap,
) -> Option<(DigestAlgorithm, String, String)> {
    for (algorithm, declared_value) in declared {
        let computed = stored.digests.get(algorithm).map(String::as_str).unwrap_or("");
        if !computed.eq_ignore_ascii_case(declared_value) {
            return Some((*algorithm, declared_value.clone(), computed.to_string()));
        }
    }
    None
}

/// Resolve a staging URI to a local path.
fn staging_path(uri: &str) -> Result<PathBuf, TransferError> {
    let path = match uri.strip_prefix("file://") {
        Some(rest) => PathBuf::from(rest),
        None if uri.contains("://") => {
            return Err(TransferError::SourceMissing(uri.to_string()));
        }
        None => PathBuf::from(uri),
    };
    if !path.is_file() {
        return Err(TransferError::SourceMissing(uri.to_string()));
    }
    Ok(path)
}
