//! Filesystem binary store

use super::{BinaryStore, StoredBinary};
use crate::error::TransferError;
use crate::repository::BinarySlot;
use async_trait::async_trait;
use drp_common::checksum::MultiDigest;
use drp_common::types::{DigestAlgorithm, Pid};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

const COPY_BUF_SIZE: usize = 8192;

/// Stores binaries under a local directory, sharded by pid.
///
/// Layout: `<root>/objects/<aa>/<bb>/<pid>/<slot>` where `aa` and `bb` are
/// the first two byte pairs of the pid's hex form. Keeps directory fanout
/// bounded for large repositories.
#[derive(Debug, Clone)]
pub struct FsBinaryStore {
    root: PathBuf,
}

impl FsBinaryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path for one binary.
    pub fn object_path(&self, pid: &Pid, slot: BinarySlot) -> PathBuf {
        let hex = pid.as_uuid().simple().to_string();
        self.root
            .join("objects")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
            .join(slot.as_str())
    }
}

#[async_trait]
impl BinaryStore for FsBinaryStore {
    #[instrument(skip(self, source, algorithms), fields(pid = %pid, slot = %slot))]
    async fn put(
        &self,
        pid: &Pid,
        slot: BinarySlot,
        source: &Path,
        algorithms: &[DigestAlgorithm],
    ) -> Result<StoredBinary, TransferError> {
        let target = self.object_path(pid, slot);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = tokio::fs::File::open(source).await?;
        let mut writer = tokio::fs::File::create(&target).await?;
        let mut digest = MultiDigest::new(algorithms);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut size: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        writer.flush().await?;

        debug!(size, path = %target.display(), "Stored binary on filesystem");
        Ok(StoredBinary {
            uri: format!("file://{}", target.display()),
            size,
            digests: digest.finalize(),
        })
    }

    async fn remove(&self, pid: &Pid, slot: BinarySlot) -> Result<(), TransferError> {
        let target = self.object_path(pid, slot);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
