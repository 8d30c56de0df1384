//! Checkpoint coordinator configuration.

/// When the shard handle's cached checkpoint is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleUpdate {
    /// Advance the cached value before the ledger write.
    ///
    /// If the write fails the handle is left ahead of the ledger; callers
    /// treat the handle as authoritative only after a successful return.
    #[default]
    Optimistic,

    /// Advance the cached value only after the ledger confirms the write.
    ///
    /// The ledger receives a copy of the handle carrying the new value.
    AfterPersist,
}

/// Configuration for a shard checkpointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointConfig {
    /// When the cached checkpoint on the handle moves.
    pub handle_update: HandleUpdate,
    /// Refuse a second commit of the same prepared checkpoint.
    ///
    /// Off by default: a repeat commit re-runs the full ownership and lease
    /// validation and may succeed or fail on its own.
    pub one_shot_commit: bool,
}

impl CheckpointConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handle_update: HandleUpdate::Optimistic,
            one_shot_commit: false,
        }
    }

    /// Handle only moves on confirmed writes; prepared checkpoints commit once.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            handle_update: HandleUpdate::AfterPersist,
            one_shot_commit: true,
        }
    }

    /// Builder: set the handle update policy.
    #[must_use]
    pub const fn with_handle_update(mut self, handle_update: HandleUpdate) -> Self {
        self.handle_update = handle_update;
        self
    }

    /// Builder: enable or disable one-shot commits.
    #[must_use]
    pub const fn with_one_shot_commit(mut self, one_shot_commit: bool) -> Self {
        self.one_shot_commit = one_shot_commit;
        self
    }
}
