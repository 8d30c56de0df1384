//! Shard ownership handle.

use shardline_core::{CheckpointValue, SequenceNumber, ShardId, WorkerId};

// -----------------------------------------------------------------------------
// Shard Status
// -----------------------------------------------------------------------------

/// Locally cached lease and checkpoint state for one shard.
///
/// Created by the lease-assignment subsystem when the shard is assigned to
/// this worker. The ledger is the source of truth; this handle may be stale
/// relative to it, which is why every checkpoint revalidates ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStatus {
    /// Shard identifier.
    id: ShardId,
    /// Parent shard after a split or merge.
    parent_shard_id: Option<ShardId>,
    /// Worker the lease is assigned to.
    assigned_to: Option<WorkerId>,
    /// Lease expiration timestamp (microseconds since epoch).
    lease_timeout_us: u64,
    /// Last checkpoint value.
    checkpoint: Option<CheckpointValue>,
    /// First sequence number in the shard.
    starting_sequence_number: Option<SequenceNumber>,
    /// Last sequence number in the shard, set once the shard is closed.
    ending_sequence_number: Option<SequenceNumber>,
}

impl ShardStatus {
    /// Creates an unassigned shard handle with no checkpoint.
    #[must_use]
    pub const fn new(id: ShardId) -> Self {
        Self {
            id,
            parent_shard_id: None,
            assigned_to: None,
            lease_timeout_us: 0,
            checkpoint: None,
            starting_sequence_number: None,
            ending_sequence_number: None,
        }
    }

    /// Builder: set the lease owner and timeout.
    #[must_use]
    pub fn with_lease(mut self, owner: WorkerId, lease_timeout_us: u64) -> Self {
        self.assigned_to = Some(owner);
        self.lease_timeout_us = lease_timeout_us;
        self
    }

    /// Builder: set the parent shard.
    #[must_use]
    pub fn with_parent(mut self, parent_shard_id: ShardId) -> Self {
        self.parent_shard_id = Some(parent_shard_id);
        self
    }

    /// Builder: set the sequence number range reported by the stream.
    #[must_use]
    pub fn with_sequence_range(
        mut self,
        starting: SequenceNumber,
        ending: Option<SequenceNumber>,
    ) -> Self {
        self.starting_sequence_number = Some(starting);
        self.ending_sequence_number = ending;
        self
    }

    /// Builder: set the checkpoint recovered from the ledger.
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: CheckpointValue) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Returns the shard identifier.
    #[must_use]
    pub const fn id(&self) -> &ShardId {
        &self.id
    }

    /// Returns the parent shard, if any.
    #[must_use]
    pub const fn parent_shard_id(&self) -> Option<&ShardId> {
        self.parent_shard_id.as_ref()
    }

    /// Returns the worker the lease is assigned to.
    #[must_use]
    pub const fn lease_owner(&self) -> Option<&WorkerId> {
        self.assigned_to.as_ref()
    }

    /// Sets the lease owner.
    pub fn set_lease_owner(&mut self, owner: Option<WorkerId>) {
        self.assigned_to = owner;
    }

    /// Returns the lease timeout (microseconds since epoch).
    #[must_use]
    pub const fn lease_timeout_us(&self) -> u64 {
        self.lease_timeout_us
    }

    /// Sets the lease timeout (microseconds since epoch).
    pub fn set_lease_timeout_us(&mut self, lease_timeout_us: u64) {
        self.lease_timeout_us = lease_timeout_us;
    }

    /// Returns true if the lease has expired at the given time.
    ///
    /// A lease is expired at its timeout instant, not only after it.
    #[must_use]
    pub const fn is_lease_expired_at(&self, current_time_us: u64) -> bool {
        current_time_us >= self.lease_timeout_us
    }

    /// Returns the last checkpoint value.
    #[must_use]
    pub const fn checkpoint(&self) -> Option<&CheckpointValue> {
        self.checkpoint.as_ref()
    }

    /// Sets the checkpoint value.
    ///
    /// Does not check ordering; callers checkpoint in sequence order.
    pub fn set_checkpoint(&mut self, checkpoint: CheckpointValue) {
        self.checkpoint = Some(checkpoint);
    }

    /// Returns true if the shard has been checkpointed as fully consumed.
    #[must_use]
    pub const fn is_shard_end(&self) -> bool {
        matches!(self.checkpoint, Some(CheckpointValue::ShardEnd))
    }

    /// Returns the first sequence number in the shard.
    #[must_use]
    pub const fn starting_sequence_number(&self) -> Option<&SequenceNumber> {
        self.starting_sequence_number.as_ref()
    }

    /// Returns the last sequence number in the shard, if the shard is closed.
    #[must_use]
    pub const fn ending_sequence_number(&self) -> Option<&SequenceNumber> {
        self.ending_sequence_number.as_ref()
    }
}
