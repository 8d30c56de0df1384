//! Checkpoint coordination error types.

use std::fmt;

use shardline_core::{ExtendedSequenceNumber, ShardId, WorkerId};
use thiserror::Error;

/// Result type for lease ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Renders an optional owner for error messages.
fn owner_label(owner: Option<&WorkerId>) -> &str {
    owner.map_or("<none>", WorkerId::as_str)
}

// -----------------------------------------------------------------------------
// Ledger Errors
// -----------------------------------------------------------------------------

/// Errors reported by a lease ledger.
///
/// These are infrastructure faults. The checkpoint coordinator passes them
/// through to its caller unchanged and never retries them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The store could not be reached or the operation failed.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// A conditional write was rejected because the writer is not the
    /// recorded lease owner.
    #[error(
        "conditional write rejected for shard {shard_id}: recorded owner {}, attempted by {}",
        owner_label(.recorded_owner.as_ref()),
        owner_label(.attempted_owner.as_ref())
    )]
    ConditionFailed {
        /// The shard whose checkpoint was being written.
        shard_id: ShardId,
        /// Owner recorded in the ledger at write time.
        recorded_owner: Option<WorkerId>,
        /// Owner named by the rejected write.
        attempted_owner: Option<WorkerId>,
    },

    /// The ledger has no lease record for the shard.
    #[error("no lease record for shard {shard_id}")]
    ShardNotFound {
        /// The shard that was not found.
        shard_id: ShardId,
    },
}

// -----------------------------------------------------------------------------
// Checkpoint Errors
// -----------------------------------------------------------------------------

/// Why a checkpoint was refused before reaching the ledger write.
///
/// Both causes require the same action: stop processing the shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceCause {
    /// Another worker is now the recorded owner of the shard.
    Shutdown {
        /// Owner recorded in the ledger.
        recorded_owner: Option<WorkerId>,
        /// Owner cached in the local shard handle.
        local_owner: Option<WorkerId>,
    },

    /// The local lease timed out before the checkpoint was attempted.
    LeaseExpired {
        /// Lease expiry (microseconds since epoch).
        lease_timeout_us: u64,
        /// Clock reading used for the check (microseconds since epoch).
        checked_at_us: u64,
    },
}

impl fmt::Display for FenceCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown {
                recorded_owner,
                local_owner,
            } => write!(
                f,
                "another instance may have started processing this shard \
                 (recorded owner {}, local owner {})",
                owner_label(recorded_owner.as_ref()),
                owner_label(local_owner.as_ref())
            ),
            Self::LeaseExpired {
                lease_timeout_us,
                checked_at_us,
            } => write!(
                f,
                "the lease on the shard expired at {lease_timeout_us}us (checked at {checked_at_us}us)"
            ),
        }
    }
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    /// The ledger query or write failed. Carried verbatim.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The worker no longer holds a valid lease on the shard.
    #[error("checkpoint refused for shard {shard_id}: {cause}")]
    Fenced {
        /// The shard being checkpointed.
        shard_id: ShardId,
        /// Whether ownership moved or the lease timed out.
        cause: FenceCause,
    },

    /// A one-shot prepared checkpoint was committed a second time.
    #[error("prepared checkpoint at {position} for shard {shard_id} was already committed")]
    AlreadyCommitted {
        /// The shard the token belongs to.
        shard_id: ShardId,
        /// The pinned position.
        position: ExtendedSequenceNumber,
    },
}

impl CheckpointError {
    /// Returns true if the caller must stop processing the shard.
    #[must_use]
    pub const fn must_stop_processing(&self) -> bool {
        matches!(self, Self::Fenced { .. })
    }

    /// Returns true if the error came from the ledger itself.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }

    /// Returns true if another worker took over the shard.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(
            self,
            Self::Fenced {
                cause: FenceCause::Shutdown { .. },
                ..
            }
        )
    }

    /// Returns true if the local lease had expired.
    #[must_use]
    pub const fn is_lease_expired(&self) -> bool {
        matches!(
            self,
            Self::Fenced {
                cause: FenceCause::LeaseExpired { .. },
                ..
            }
        )
    }
}
