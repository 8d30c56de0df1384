//! Shard checkpoint coordination for Shardline.
//!
//! This crate lets a worker record its progress through a shard while
//! guaranteeing that progress is never recorded by a worker that has lost
//! the shard's lease.
//!
//! # Overview
//!
//! - **Lease ledger**: the shared, durable record of who owns each shard and
//!   the last checkpoint. Injected as a [`LeaseLedger`] implementation.
//! - **Shard handle**: [`ShardStatus`], this worker's cached view of one
//!   shard's lease and checkpoint.
//! - **Coordinator**: [`ShardCheckpointer`] checks the recorded owner and the
//!   local lease expiry before every write, then persists through the ledger.
//! - **Deferred checkpoints**: [`PreparedCheckpoint`] pins a position before
//!   long-running work and commits it afterwards with the same checks.
//!
//! # Fencing
//!
//! The coordinator's ownership check is advisory. Correctness rests on the
//! ledger: `checkpoint_sequence` must be a conditional write keyed on the
//! recorded owner, so a stale worker that raced past the local check is
//! still rejected.
//!
//! # Errors
//!
//! Every failed checkpoint reports exactly one cause:
//!
//! - [`CheckpointError::Ledger`]: the ledger call itself failed; retry policy
//!   is the caller's.
//! - [`CheckpointError::Fenced`] with [`FenceCause::Shutdown`]: another
//!   worker owns the shard. Stop processing it.
//! - [`CheckpointError::Fenced`] with [`FenceCause::LeaseExpired`]: the lease
//!   timed out. Stop processing it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shardline_checkpoint::{
//!     CheckpointConfig, Checkpointer, ShardCheckpointer, ShardStatus, SimulatedLeaseLedger,
//! };
//! use shardline_core::{ExtendedSequenceNumber, SequenceNumber, ShardId, WorkerId};
//!
//! let shard_id = ShardId::new("shardId-000000000000")?;
//! let worker = WorkerId::new("W1")?;
//!
//! let ledger = Arc::new(SimulatedLeaseLedger::new(42));
//! ledger.assign_lease(&shard_id, worker.clone(), lease_timeout_us);
//!
//! let shard = ShardStatus::new(shard_id).with_lease(worker, lease_timeout_us);
//! let checkpointer = ShardCheckpointer::new(shard, ledger, CheckpointConfig::default());
//!
//! // Immediate checkpoint.
//! checkpointer.checkpoint(Some(&SequenceNumber::new("49590")?)).await?;
//!
//! // Deferred checkpoint around expensive work.
//! let prepared = checkpointer
//!     .prepare_checkpoint(ExtendedSequenceNumber::new(SequenceNumber::new("49600")?))?;
//! do_expensive_work().await;
//! prepared.commit().await?;
//!
//! // Closed shard fully drained.
//! checkpointer.checkpoint(None).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Allow these for cleaner code in this crate.
#![allow(clippy::module_name_repetitions)]

mod checkpointer;
mod clock;
mod config;
mod error;
mod ledger;
mod prepared;
mod shard;

// Re-export public API.
pub use checkpointer::{Checkpointer, ShardCheckpointer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CheckpointConfig, HandleUpdate};
pub use error::{CheckpointError, CheckpointResult, FenceCause, LedgerError, LedgerResult};
pub use ledger::{LeaseLedger, LeaseRecord, LedgerFaultConfig, PersistAttempt, SimulatedLeaseLedger};
pub use prepared::PreparedCheckpoint;
pub use shard::ShardStatus;
