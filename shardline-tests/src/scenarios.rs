//! Reusable test scenarios for checkpoint fencing.
//!
//! Scenarios bundle a shared ledger, a manual clock, and helpers to hand a
//! shard's lease from worker to worker, plus ledger wrappers that inject
//! ownership changes at precise points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shardline_checkpoint::{
    CheckpointConfig, Clock, LeaseLedger, LedgerFaultConfig, LedgerResult, ManualClock,
    ShardCheckpointer, ShardStatus, SimulatedLeaseLedger,
};
use shardline_core::{CheckpointValue, ShardId, WorkerId};

/// Common time constants, in microseconds.
pub mod time {
    /// Simulation start (2023-11-14T22:13:20Z).
    pub const START_US: u64 = 1_700_000_000_000_000;
    /// One second.
    pub const SECOND_US: u64 = 1_000_000;
    /// Lease length used by scenarios.
    pub const LEASE_US: u64 = 5 * SECOND_US;
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of derived seeds for stress runs.
    pub const STRESS_SEED_COUNT: u64 = 100;
}

/// Checkpointer type used throughout the scenarios.
pub type SimCheckpointer<L = SimulatedLeaseLedger> = ShardCheckpointer<L, ManualClock>;

/// Creates a worker identity, panicking on an empty name.
///
/// # Panics
///
/// Panics if `name` is empty.
#[must_use]
pub fn worker(name: &str) -> WorkerId {
    WorkerId::new(name).expect("worker name must not be empty")
}

/// Creates a shard identifier, panicking on an empty name.
///
/// # Panics
///
/// Panics if `name` is empty.
#[must_use]
pub fn shard(name: &str) -> ShardId {
    ShardId::new(name).expect("shard name must not be empty")
}

// ============================================================================
// Shard Scenario
// ============================================================================

/// One shard, one shared ledger, one clock, and any number of workers.
#[derive(Debug, Clone)]
pub struct ShardScenario {
    /// Shard under test.
    pub shard_id: ShardId,
    /// Ledger shared by every worker.
    pub ledger: SimulatedLeaseLedger,
    /// Clock shared by every worker.
    pub clock: ManualClock,
}

impl ShardScenario {
    /// Creates a scenario without ledger faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, LedgerFaultConfig::none())
    }

    /// Creates a scenario whose ledger injects faults.
    #[must_use]
    pub fn with_faults(seed: u64, faults: LedgerFaultConfig) -> Self {
        Self {
            shard_id: shard("shardId-000000000000"),
            ledger: SimulatedLeaseLedger::with_faults(seed, faults),
            clock: ManualClock::new(time::START_US),
        }
    }

    /// Grants `owner` a fresh lease in the ledger and returns its timeout.
    #[must_use]
    pub fn grant(&self, owner: &WorkerId) -> u64 {
        let lease_timeout_us = self.clock.now_us() + time::LEASE_US;
        self.ledger
            .assign_lease(&self.shard_id, owner.clone(), lease_timeout_us);
        lease_timeout_us
    }

    /// Grants `owner` a lease and builds its checkpointer.
    #[must_use]
    pub fn acquire(&self, owner: &WorkerId, config: CheckpointConfig) -> SimCheckpointer {
        let lease_timeout_us = self.grant(owner);
        self.checkpointer_for(owner, lease_timeout_us, config)
    }

    /// Builds a checkpointer for `owner` without touching the ledger.
    ///
    /// Models a worker whose cached view says it holds the lease until
    /// `lease_timeout_us`, whatever the ledger currently records.
    #[must_use]
    pub fn checkpointer_for(
        &self,
        owner: &WorkerId,
        lease_timeout_us: u64,
        config: CheckpointConfig,
    ) -> SimCheckpointer {
        let handle =
            ShardStatus::new(self.shard_id.clone()).with_lease(owner.clone(), lease_timeout_us);
        ShardCheckpointer::with_clock(
            handle,
            Arc::new(self.ledger.clone()),
            self.clock.clone(),
            config,
        )
    }

    /// Returns the checkpoint stored in the ledger (bypasses faults).
    #[must_use]
    pub fn persisted(&self) -> Option<CheckpointValue> {
        self.ledger
            .record(&self.shard_id)
            .and_then(|record| record.checkpoint)
    }
}

// ============================================================================
// Handoff Ledger
// ============================================================================

/// Ledger wrapper that hands the shard to another worker right after an
/// owner query, whether or not the query succeeded.
///
/// Reproduces the accepted race where ownership moves between the
/// coordinator's check and its write. The check passes on stale data; the
/// write must then be rejected by the ledger itself.
#[derive(Debug)]
pub struct HandoffLedger {
    inner: SimulatedLeaseLedger,
    armed: AtomicBool,
    successor: Mutex<Option<(WorkerId, u64)>>,
}

impl HandoffLedger {
    /// Wraps `inner` with no handoff armed.
    #[must_use]
    pub fn new(inner: SimulatedLeaseLedger) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            successor: Mutex::new(None),
        }
    }

    /// Hands the shard to `successor` after the next owner query.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn arm(&self, successor: WorkerId, lease_timeout_us: u64) {
        *self.successor.lock().expect("successor lock poisoned") =
            Some((successor, lease_timeout_us));
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Returns the wrapped ledger.
    #[must_use]
    pub const fn inner(&self) -> &SimulatedLeaseLedger {
        &self.inner
    }
}

#[async_trait]
impl LeaseLedger for HandoffLedger {
    async fn get_lease_owner(&self, shard_id: &ShardId) -> LedgerResult<Option<WorkerId>> {
        let owner = self.inner.get_lease_owner(shard_id).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            let successor = self
                .successor
                .lock()
                .expect("successor lock poisoned")
                .take();
            if let Some((next_owner, lease_timeout_us)) = successor {
                self.inner.assign_lease(shard_id, next_owner, lease_timeout_us);
            }
        }
        owner
    }

    async fn checkpoint_sequence(&self, shard: &ShardStatus) -> LedgerResult<()> {
        self.inner.checkpoint_sequence(shard).await
    }

    async fn fetch_checkpoint(&self, shard_id: &ShardId) -> LedgerResult<Option<CheckpointValue>> {
        self.inner.fetch_checkpoint(shard_id).await
    }
}
