//! Transaction bracketing for content-store writes
//!
//! The manager opens one transaction at a time and hands out a handle the
//! ingestor threads through its writes. Cancelling a handle rolls back only
//! the writes issued under it; completing it releases the slot without
//! rollback, which is how the pipeline commits: by moving past the object.

use crate::error::TransactionError;
use crate::repository::{ContentStoreClient, TxId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Brackets bounded sets of content-store writes
///
/// Each job owns one manager, so "one active transaction per job" is
/// enforced here rather than in the content store.
pub struct TransactionManager {
    client: Arc<dyn ContentStoreClient>,
    active: Arc<AtomicBool>,
}

impl TransactionManager {
    pub fn new(client: Arc<dyn ContentStoreClient>) -> Self {
        Self {
            client,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a transaction. Fails while another handle is still live.
    pub async fn begin(&self) -> Result<ActiveTransaction, TransactionError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(TransactionError::AlreadyActive);
        }

        match self.client.begin_transaction().await {
            Ok(id) => {
                debug!(tx_id = %id, "Opened content-store transaction");
                Ok(ActiveTransaction {
                    id,
                    client: Arc::clone(&self.client),
                    active: Arc::clone(&self.active),
                    open: true,
                })
            }
            Err(err) => {
                self.active.store(false, Ordering::SeqCst);
                Err(err.into())
            }
        }
    }
}

/// Handle on the currently open transaction
pub struct ActiveTransaction {
    id: TxId,
    client: Arc<dyn ContentStoreClient>,
    active: Arc<AtomicBool>,
    open: bool,
}

impl std::fmt::Debug for ActiveTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveTransaction")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl ActiveTransaction {
    pub fn id(&self) -> &TxId {
        &self.id
    }

    /// Commit implicitly: the writes stand, the slot is released.
    pub fn complete(mut self) {
        debug!(tx_id = %self.id, "Completed content-store transaction");
        self.release();
    }

    /// Roll back every write issued under this transaction.
    ///
    /// Returns the cancellation signal carrying the triggering cause, or
    /// the underlying error when the rollback itself failed. Either way the
    /// slot is released and the handle is dead.
    pub async fn cancel(mut self, cause: &str) -> TransactionError {
        let result = self.client.cancel_transaction(&self.id, cause).await;
        self.release();
        match result {
            Ok(()) => TransactionError::Cancelled {
                tx_id: self.id.to_string(),
                cause: cause.to_string(),
            },
            Err(err) => {
                warn!(tx_id = %self.id, error = ?err, "Transaction rollback failed");
                TransactionError::Repository(err)
            }
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.active.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for ActiveTransaction {
    fn drop(&mut self) {
        if self.open {
            // The content store expires abandoned transactions on its own.
            warn!(tx_id = %self.id, "Transaction handle dropped while open");
            self.release();
        }
    }
}
