//! Lease ledger abstraction.
//!
//! Provides the `LeaseLedger` trait the checkpoint coordinator writes
//! through, and `SimulatedLeaseLedger` for deterministic simulation testing.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shardline_core::{CheckpointValue, ShardId, WorkerId};

use crate::error::{LedgerError, LedgerResult};
use crate::shard::ShardStatus;

// -----------------------------------------------------------------------------
// Lease Ledger Trait
// -----------------------------------------------------------------------------

/// Durable record of shard ownership and checkpoints.
///
/// The ledger is shared by every worker and is the synchronization point
/// between them. Implementations must serialize conflicting writes per
/// shard; the local ownership check in the coordinator is only a fast
/// rejection.
#[async_trait]
pub trait LeaseLedger: Send + Sync {
    /// Gets the currently recorded lease owner for a shard.
    ///
    /// Returns `None` if the shard has no owner. An error means the ledger
    /// could not answer, never that the shard is unowned.
    async fn get_lease_owner(&self, shard_id: &ShardId) -> LedgerResult<Option<WorkerId>>;

    /// Persists the handle's current checkpoint value.
    ///
    /// Implementations should make this a conditional write that fails with
    /// `ConditionFailed` unless the handle's owner is the recorded owner.
    async fn checkpoint_sequence(&self, shard: &ShardStatus) -> LedgerResult<()>;

    /// Gets the last persisted checkpoint for a shard.
    ///
    /// Returns `None` if nothing has been checkpointed yet.
    async fn fetch_checkpoint(&self, shard_id: &ShardId) -> LedgerResult<Option<CheckpointValue>>;
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the simulated ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerFaultConfig {
    /// Probability of owner queries and checkpoint reads failing (0.0 - 1.0).
    pub query_fail_rate: f64,
    /// Probability of checkpoint writes failing (0.0 - 1.0).
    pub persist_fail_rate: f64,
    /// Force next owner query to fail (one-shot).
    pub force_query_fail: bool,
    /// Force next checkpoint write to fail (one-shot).
    pub force_persist_fail: bool,
}

impl LedgerFaultConfig {
    /// No faults (all operations succeed).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            query_fail_rate: 0.0,
            persist_fail_rate: 0.0,
            force_query_fail: false,
            force_persist_fail: false,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            query_fail_rate: 0.05,
            persist_fail_rate: 0.05,
            force_query_fail: false,
            force_persist_fail: false,
        }
    }

    /// Builder: set query fail rate.
    #[must_use]
    pub const fn with_query_fail_rate(mut self, rate: f64) -> Self {
        self.query_fail_rate = rate;
        self
    }

    /// Builder: set persist fail rate.
    #[must_use]
    pub const fn with_persist_fail_rate(mut self, rate: f64) -> Self {
        self.persist_fail_rate = rate;
        self
    }
}

// -----------------------------------------------------------------------------
// Simulated Lease Ledger
// -----------------------------------------------------------------------------

/// One shard's row in the simulated ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Recorded lease owner.
    pub owner: Option<WorkerId>,
    /// Lease expiration timestamp (microseconds since epoch).
    pub lease_timeout_us: u64,
    /// Last persisted checkpoint.
    pub checkpoint: Option<CheckpointValue>,
}

/// A checkpoint write that reached the simulated ledger's condition check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistAttempt {
    /// Shard written.
    pub shard_id: ShardId,
    /// Owner named by the writer's handle.
    pub writer: Option<WorkerId>,
    /// Owner recorded at write time.
    pub recorded_owner: Option<WorkerId>,
    /// Checkpoint the writer tried to store.
    pub checkpoint: Option<CheckpointValue>,
    /// Whether the conditional write was accepted.
    pub accepted: bool,
}

/// In-memory simulated lease ledger for DST.
///
/// Clones share state via `Arc`, so several workers can hold handles to the
/// same ledger. Checkpoint writes are conditional on the recorded owner.
/// Supports deterministic fault injection for testing error paths.
#[derive(Debug, Clone)]
pub struct SimulatedLeaseLedger {
    /// Per-shard lease records.
    records: Arc<Mutex<HashMap<ShardId, LeaseRecord>>>,
    /// Every write that reached the condition check, in order.
    history: Arc<Mutex<Vec<PersistAttempt>>>,
    /// Fault configuration.
    fault_config: Arc<Mutex<LedgerFaultConfig>>,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
    /// Number of `get_lease_owner` calls.
    owner_queries: Arc<AtomicU64>,
    /// Number of `checkpoint_sequence` calls.
    persist_calls: Arc<AtomicU64>,
}

impl SimulatedLeaseLedger {
    /// Creates a new simulated ledger with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, LedgerFaultConfig::none())
    }

    /// Creates a simulated ledger with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: LedgerFaultConfig) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(Vec::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            owner_queries: Arc::new(AtomicU64::new(0)),
            persist_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns fault config for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, LedgerFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Records `owner` as the lease holder, standing in for lease assignment.
    ///
    /// Keeps any checkpoint already stored for the shard.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn assign_lease(&self, shard_id: &ShardId, owner: WorkerId, lease_timeout_us: u64) {
        let mut records = self.records.lock().expect("records lock poisoned");
        let record = records.entry(shard_id.clone()).or_insert(LeaseRecord {
            owner: None,
            lease_timeout_us: 0,
            checkpoint: None,
        });
        record.owner = Some(owner);
        record.lease_timeout_us = lease_timeout_us;
    }

    /// Clears the recorded owner of a shard.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn revoke_lease(&self, shard_id: &ShardId) {
        let mut records = self.records.lock().expect("records lock poisoned");
        if let Some(record) = records.get_mut(shard_id) {
            record.owner = None;
        }
    }

    /// Returns a shard's record (bypasses faults, for assertions in tests).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn record(&self, shard_id: &ShardId) -> Option<LeaseRecord> {
        let records = self.records.lock().expect("records lock poisoned");
        records.get(shard_id).cloned()
    }

    /// Returns every write that reached the condition check.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn persist_history(&self) -> Vec<PersistAttempt> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// Returns the number of owner queries served or failed.
    #[must_use]
    pub fn owner_query_count(&self) -> u64 {
        self.owner_queries.load(Ordering::SeqCst)
    }

    /// Returns the number of checkpoint writes attempted, including failed ones.
    #[must_use]
    pub fn persist_count(&self) -> u64 {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// Deterministic RNG.
    ///
    /// Uses `(seed + counter) * M` formula for reproducible fault injection.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    /// Returns an injected query failure, if one is due.
    fn query_fault(&self, operation: &'static str, honor_force: bool) -> LedgerResult<()> {
        let mut config = self.fault_config.lock().expect("lock poisoned");
        if honor_force && config.force_query_fail {
            config.force_query_fail = false;
            return Err(LedgerError::Io {
                operation,
                message: "simulated failure (forced)".into(),
            });
        }
        let rate = config.query_fail_rate;
        drop(config);

        if self.should_inject_fault(rate) {
            return Err(LedgerError::Io {
                operation,
                message: "simulated failure (random)".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseLedger for SimulatedLeaseLedger {
    async fn get_lease_owner(&self, shard_id: &ShardId) -> LedgerResult<Option<WorkerId>> {
        self.owner_queries.fetch_add(1, Ordering::SeqCst);
        self.query_fault("get_lease_owner", true)?;

        let records = self.records.lock().expect("records lock poisoned");
        Ok(records.get(shard_id).and_then(|r| r.owner.clone()))
    }

    async fn checkpoint_sequence(&self, shard: &ShardStatus) -> LedgerResult<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);

        // Check for forced failure.
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_persist_fail {
                config.force_persist_fail = false;
                return Err(LedgerError::Io {
                    operation: "checkpoint_sequence",
                    message: "simulated failure (forced)".into(),
                });
            }
        }

        // Check for probabilistic failure.
        let persist_fail_rate = self.fault_config.lock().expect("lock").persist_fail_rate;
        if self.should_inject_fault(persist_fail_rate) {
            return Err(LedgerError::Io {
                operation: "checkpoint_sequence",
                message: "simulated failure (random)".into(),
            });
        }

        let mut records = self.records.lock().expect("records lock poisoned");
        let record = records
            .get_mut(shard.id())
            .ok_or_else(|| LedgerError::ShardNotFound {
                shard_id: shard.id().clone(),
            })?;

        // An unowned writer never matches, not even an unowned record.
        let accepted = matches!(
            (record.owner.as_ref(), shard.lease_owner()),
            (Some(recorded), Some(writer)) if recorded == writer
        );
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(PersistAttempt {
                shard_id: shard.id().clone(),
                writer: shard.lease_owner().cloned(),
                recorded_owner: record.owner.clone(),
                checkpoint: shard.checkpoint().cloned(),
                accepted,
            });

        if !accepted {
            return Err(LedgerError::ConditionFailed {
                shard_id: shard.id().clone(),
                recorded_owner: record.owner.clone(),
                attempted_owner: shard.lease_owner().cloned(),
            });
        }

        record.checkpoint = shard.checkpoint().cloned();

        // Postcondition: the stored value is the handle's value.
        assert_eq!(record.checkpoint.as_ref(), shard.checkpoint());
        Ok(())
    }

    async fn fetch_checkpoint(&self, shard_id: &ShardId) -> LedgerResult<Option<CheckpointValue>> {
        self.query_fault("fetch_checkpoint", false)?;

        let records = self.records.lock().expect("records lock poisoned");
        Ok(records.get(shard_id).and_then(|r| r.checkpoint.clone()))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
