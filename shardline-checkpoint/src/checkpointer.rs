//! Checkpoint coordinator for a single shard.
//!
//! The `ShardCheckpointer` gates every checkpoint write behind an ownership
//! and lease check, then advances the cached value on the shard handle and
//! persists it through the lease ledger.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use shardline_core::{CheckpointValue, ExtendedSequenceNumber, SequenceNumber, ShardId};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{CheckpointConfig, HandleUpdate};
use crate::error::{CheckpointError, CheckpointResult, FenceCause};
use crate::ledger::LeaseLedger;
use crate::prepared::PreparedCheckpoint;
use crate::shard::ShardStatus;

// -----------------------------------------------------------------------------
// Checkpointer Trait
// -----------------------------------------------------------------------------

/// Checkpointing capability handed to record processors.
///
/// One instance exists per shard assignment.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Records progress through the shard.
    ///
    /// `None` marks the shard as fully consumed, used once a closed shard
    /// (for example the parent of a split) has been drained.
    ///
    /// # Errors
    ///
    /// - `Ledger` if the owner query or the write fails
    /// - `Fenced` with `Shutdown` if another worker owns the shard
    /// - `Fenced` with `LeaseExpired` if the local lease timed out
    async fn checkpoint(&self, sequence_number: Option<&SequenceNumber>) -> CheckpointResult<()>;

    /// Pins a position to checkpoint later.
    ///
    /// Does not contact the ledger; validation happens when the returned
    /// token is committed.
    ///
    /// # Errors
    ///
    /// Implementations may reject positions they cannot record.
    fn prepare_checkpoint(
        &self,
        position: ExtendedSequenceNumber,
    ) -> CheckpointResult<PreparedCheckpoint<'_>>;

    /// Returns the shard this checkpointer writes for.
    fn shard_id(&self) -> ShardId;
}

// -----------------------------------------------------------------------------
// Shard Checkpointer
// -----------------------------------------------------------------------------

/// Checkpoint coordinator bound to one shard handle.
///
/// # Design
///
/// The ownership query and lease check are a fast rejection path. The
/// ledger's conditional write is what actually fences a stale worker: a
/// lease lost between the check and the write is caught there, not here.
///
/// The coordinator never retries and never spawns background work. No lock
/// is held across a ledger call.
///
/// # Thread Safety
///
/// `Send + Sync`, but a shard has exactly one processing task at a time and
/// the handle must not be shared with another coordinator.
pub struct ShardCheckpointer<L: LeaseLedger + ?Sized, C: Clock = SystemClock> {
    /// Cached ownership and checkpoint state.
    shard: Mutex<ShardStatus>,
    /// Shared lease ledger.
    ledger: Arc<L>,
    /// Time source for lease expiry.
    clock: C,
    /// Configuration.
    config: CheckpointConfig,
}

impl<L: LeaseLedger + ?Sized> ShardCheckpointer<L, SystemClock> {
    /// Creates a checkpointer that reads wall-clock time.
    #[must_use]
    pub fn new(shard: ShardStatus, ledger: Arc<L>, config: CheckpointConfig) -> Self {
        Self::with_clock(shard, ledger, SystemClock, config)
    }
}

impl<L: LeaseLedger + ?Sized, C: Clock> ShardCheckpointer<L, C> {
    /// Creates a checkpointer with an explicit clock.
    #[must_use]
    pub fn with_clock(
        shard: ShardStatus,
        ledger: Arc<L>,
        clock: C,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            shard: Mutex::new(shard),
            ledger,
            clock,
            config,
        }
    }

    /// Returns a snapshot of the shard handle.
    #[must_use]
    pub fn shard(&self) -> ShardStatus {
        self.lock_shard().clone()
    }

    /// Returns the cached checkpoint value.
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<CheckpointValue> {
        self.lock_shard().checkpoint().cloned()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Consumes the checkpointer and returns the shard handle.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn into_shard(self) -> ShardStatus {
        self.shard.into_inner().expect("shard lock poisoned")
    }

    /// Records a renewed lease timeout on the handle.
    ///
    /// Called by the worker's lease renewal loop after the ledger accepted
    /// the renewal.
    pub fn renew_lease(&self, lease_timeout_us: u64) {
        self.lock_shard().set_lease_timeout_us(lease_timeout_us);
    }

    /// Loads the last persisted checkpoint into the handle.
    ///
    /// Used when a shard is picked up so processing resumes after the
    /// recorded position. Performs no ownership check; a read cannot move
    /// progress. The handle keeps its value if the ledger has none.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if the read fails.
    pub async fn refresh_checkpoint(&self) -> CheckpointResult<Option<CheckpointValue>> {
        let shard_id = self.lock_shard().id().clone();
        let persisted = self.ledger.fetch_checkpoint(&shard_id).await?;

        if let Some(value) = &persisted {
            self.lock_shard().set_checkpoint(value.clone());
            debug!(shard_id = %shard_id, checkpoint = %value, "Loaded checkpoint");
        }
        Ok(persisted)
    }

    fn lock_shard(&self) -> MutexGuard<'_, ShardStatus> {
        self.shard.lock().expect("shard lock poisoned")
    }

    /// Checks the recorded owner and the local lease.
    ///
    /// A handle without an owner never holds the lease, even when the
    /// ledger records no owner either.
    async fn validate_lease(&self, shard_id: &ShardId) -> CheckpointResult<()> {
        let shard = self.shard();
        let local_owner = shard.lease_owner().cloned();

        let recorded_owner = self.ledger.get_lease_owner(shard_id).await?;
        if local_owner.is_none() || recorded_owner != local_owner {
            debug!(
                shard_id = %shard_id,
                recorded_owner = ?recorded_owner,
                local_owner = ?local_owner,
                "Checkpoint refused: shard owned by another worker"
            );
            return Err(CheckpointError::Fenced {
                shard_id: shard_id.clone(),
                cause: FenceCause::Shutdown {
                    recorded_owner,
                    local_owner,
                },
            });
        }

        let now_us = self.clock.now_us();
        let lease_timeout_us = shard.lease_timeout_us();
        if shard.is_lease_expired_at(now_us) {
            debug!(
                shard_id = %shard_id,
                lease_timeout_us,
                now_us,
                "Checkpoint refused: lease expired"
            );
            return Err(CheckpointError::Fenced {
                shard_id: shard_id.clone(),
                cause: FenceCause::LeaseExpired {
                    lease_timeout_us,
                    checked_at_us: now_us,
                },
            });
        }

        Ok(())
    }
}

#[async_trait]
impl<L: LeaseLedger + ?Sized, C: Clock> Checkpointer for ShardCheckpointer<L, C> {
    async fn checkpoint(&self, sequence_number: Option<&SequenceNumber>) -> CheckpointResult<()> {
        let shard_id = self.lock_shard().id().clone();

        self.validate_lease(&shard_id).await?;

        let value = sequence_number
            .cloned()
            .map_or(CheckpointValue::ShardEnd, CheckpointValue::Sequence);

        match self.config.handle_update {
            HandleUpdate::Optimistic => {
                let snapshot = {
                    let mut shard = self.lock_shard();
                    shard.set_checkpoint(value.clone());
                    shard.clone()
                };
                self.ledger.checkpoint_sequence(&snapshot).await?;
            }
            HandleUpdate::AfterPersist => {
                let mut snapshot = self.lock_shard().clone();
                snapshot.set_checkpoint(value.clone());
                self.ledger.checkpoint_sequence(&snapshot).await?;
                self.lock_shard().set_checkpoint(value.clone());
            }
        }

        debug!(shard_id = %shard_id, checkpoint = %value, "Checkpointed");
        Ok(())
    }

    fn prepare_checkpoint(
        &self,
        position: ExtendedSequenceNumber,
    ) -> CheckpointResult<PreparedCheckpoint<'_>> {
        debug!(shard_id = %self.shard_id(), position = %position, "Prepared checkpoint");
        Ok(PreparedCheckpoint::new(
            position,
            self,
            self.config.one_shot_commit,
        ))
    }

    fn shard_id(&self) -> ShardId {
        self.lock_shard().id().clone()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
