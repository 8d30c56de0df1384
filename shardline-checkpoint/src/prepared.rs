//! Deferred checkpoints.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use shardline_core::ExtendedSequenceNumber;
use tracing::debug;

use crate::checkpointer::Checkpointer;
use crate::error::{CheckpointError, CheckpointResult};

/// A checkpoint pinned at a position, to be committed later.
///
/// Obtained from [`Checkpointer::prepare_checkpoint`] before a long unit of
/// work starts. Committing runs exactly the same ownership and lease checks
/// as an immediate checkpoint, evaluated at commit time. Dropping the token
/// without committing leaves no trace in the ledger.
///
/// By default a token may be committed more than once; each commit is
/// validated on its own. With one-shot commits configured, a second commit
/// after a successful one fails with `AlreadyCommitted`, and so does a
/// commit started while another commit of the same token is in flight. A
/// failed commit does not consume the token.
pub struct PreparedCheckpoint<'a> {
    /// Position to checkpoint at.
    pending: ExtendedSequenceNumber,
    /// Coordinator that issued this token.
    checkpointer: &'a dyn Checkpointer,
    /// Refuse commits after the first success.
    one_shot: bool,
    /// Set after the first successful commit.
    committed: AtomicBool,
}

impl<'a> PreparedCheckpoint<'a> {
    /// Creates a token for `pending` backed by `checkpointer`.
    #[must_use]
    pub fn new(
        pending: ExtendedSequenceNumber,
        checkpointer: &'a dyn Checkpointer,
        one_shot: bool,
    ) -> Self {
        Self {
            pending,
            checkpointer,
            one_shot,
            committed: AtomicBool::new(false),
        }
    }

    /// Returns the pinned position.
    #[must_use]
    pub const fn pending_checkpoint(&self) -> &ExtendedSequenceNumber {
        &self.pending
    }

    /// Returns true if a commit has succeeded.
    ///
    /// For one-shot tokens this is also true while a commit is in flight.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    /// Checkpoints at the pinned position.
    ///
    /// # Errors
    ///
    /// Same as [`Checkpointer::checkpoint`], plus `AlreadyCommitted` for a
    /// repeat commit of a one-shot token.
    pub async fn commit(&self) -> CheckpointResult<()> {
        // One-shot tokens claim the flag before the write so concurrent
        // commits of the same token cannot both reach the ledger.
        if self.one_shot
            && self
                .committed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(CheckpointError::AlreadyCommitted {
                shard_id: self.checkpointer.shard_id(),
                position: self.pending.clone(),
            });
        }

        let result = self
            .checkpointer
            .checkpoint(self.pending.sequence_number())
            .await;
        if let Err(e) = result {
            if self.one_shot {
                self.committed.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }

        self.committed.store(true, Ordering::SeqCst);
        debug!(
            shard_id = %self.checkpointer.shard_id(),
            position = %self.pending,
            "Committed prepared checkpoint"
        );
        Ok(())
    }
}

impl fmt::Debug for PreparedCheckpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedCheckpoint")
            .field("pending", &self.pending)
            .field("one_shot", &self.one_shot)
            .field("committed", &self.is_committed())
            .finish_non_exhaustive()
    }
}
