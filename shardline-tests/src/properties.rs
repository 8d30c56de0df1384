//! Property definitions and checkers for checkpoint simulation tests.
//!
//! Properties are invariants that must hold throughout simulation. The
//! checker reads the simulated ledger's write history incrementally, so it
//! can be called after every operation.

use std::collections::BTreeMap;

use shardline_checkpoint::{PersistAttempt, SimulatedLeaseLedger};
use shardline_core::{CheckpointValue, ShardId, WorkerId};

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a checkpoint fencing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FencingViolation {
    /// The ledger accepted a write whose writer was not the recorded owner.
    AcceptedFromNonOwner {
        /// Position in the ledger's write history.
        index: usize,
        /// Owner named by the writer.
        writer: Option<WorkerId>,
        /// Owner recorded when the write landed.
        recorded_owner: Option<WorkerId>,
    },
    /// A write was accepted from a worker the simulation had already
    /// replaced.
    AcceptedFromStaleWorker {
        /// Position in the ledger's write history.
        index: usize,
        /// Owner named by the writer.
        writer: Option<WorkerId>,
        /// Owner the simulation had assigned.
        current_owner: Option<WorkerId>,
    },
    /// The stored checkpoint differs from the last accepted write.
    StoredCheckpointMismatch {
        /// Shard checked.
        shard_id: ShardId,
        /// Value of the last accepted write.
        expected: Option<CheckpointValue>,
        /// Value the ledger holds.
        stored: Option<CheckpointValue>,
    },
}

impl std::fmt::Display for FencingViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AcceptedFromNonOwner {
                index,
                writer,
                recorded_owner,
            } => {
                write!(
                    f,
                    "Write #{index} accepted from {writer:?} while {recorded_owner:?} \
                     held the lease"
                )
            }
            Self::AcceptedFromStaleWorker {
                index,
                writer,
                current_owner,
            } => {
                write!(
                    f,
                    "Write #{index} accepted from replaced worker {writer:?} \
                     (current owner {current_owner:?})"
                )
            }
            Self::StoredCheckpointMismatch {
                shard_id,
                expected,
                stored,
            } => {
                write!(
                    f,
                    "Shard {shard_id} stores {stored:?} but last accepted write was {expected:?}"
                )
            }
        }
    }
}

// ============================================================================
// Fencing Checker
// ============================================================================

/// Tracks ledger writes across a simulation for property verification.
#[derive(Debug, Default)]
pub struct FencingChecker {
    /// Number of history entries already inspected.
    cursor: usize,
    /// Last accepted checkpoint per shard.
    last_accepted: BTreeMap<ShardId, Option<CheckpointValue>>,
    /// Accepted writes seen.
    accepted_writes: u64,
    /// Rejected writes seen.
    rejected_writes: u64,
    /// Violations found.
    violations: Vec<FencingViolation>,
}

impl FencingChecker {
    /// Creates a new checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspects writes since the last call and checks the stored value.
    ///
    /// `current_owner` is the worker the simulation considers the owner of
    /// `shard_id` for every write made since the previous call.
    pub fn check(
        &mut self,
        ledger: &SimulatedLeaseLedger,
        shard_id: &ShardId,
        current_owner: Option<&WorkerId>,
    ) {
        let history = ledger.persist_history();
        for (index, attempt) in history.iter().enumerate().skip(self.cursor) {
            self.check_attempt(index, attempt, shard_id, current_owner);
        }
        self.cursor = history.len();

        if let Some(expected) = self.last_accepted.get(shard_id) {
            let stored = ledger.record(shard_id).and_then(|r| r.checkpoint);
            if &stored != expected {
                self.violations
                    .push(FencingViolation::StoredCheckpointMismatch {
                        shard_id: shard_id.clone(),
                        expected: expected.clone(),
                        stored,
                    });
            }
        }
    }

    fn check_attempt(
        &mut self,
        index: usize,
        attempt: &PersistAttempt,
        shard_id: &ShardId,
        current_owner: Option<&WorkerId>,
    ) {
        if !attempt.accepted {
            self.rejected_writes += 1;
            return;
        }
        self.accepted_writes += 1;

        if attempt.writer.is_none() || attempt.writer != attempt.recorded_owner {
            self.violations.push(FencingViolation::AcceptedFromNonOwner {
                index,
                writer: attempt.writer.clone(),
                recorded_owner: attempt.recorded_owner.clone(),
            });
        }
        if &attempt.shard_id == shard_id && attempt.writer.as_ref() != current_owner {
            self.violations
                .push(FencingViolation::AcceptedFromStaleWorker {
                    index,
                    writer: attempt.writer.clone(),
                    current_owner: current_owner.cloned(),
                });
        }

        self.last_accepted
            .insert(attempt.shard_id.clone(), attempt.checkpoint.clone());
    }

    /// Returns all violations found so far.
    #[must_use]
    pub fn violations(&self) -> &[FencingViolation] {
        &self.violations
    }

    /// Returns true if no violations have been found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the number of accepted writes inspected.
    #[must_use]
    pub const fn accepted_writes(&self) -> u64 {
        self.accepted_writes
    }

    /// Returns the number of rejected writes inspected.
    #[must_use]
    pub const fn rejected_writes(&self) -> u64 {
        self.rejected_writes
    }
}
