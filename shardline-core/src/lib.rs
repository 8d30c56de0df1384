//! Shardline Core - Strongly-typed identifiers and positions for Shardline.
//!
//! This crate provides the value types shared by every Shardline crate:
//! shard and worker identities, sequence positions within a shard, and the
//! checkpoint value recorded in the lease ledger. It does NOT talk to any
//! store; ledger access lives in `shardline-checkpoint`.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up a `ShardId` with a `WorkerId`
//! - **Non-empty by construction**: Identifiers and sequence numbers reject
//!   empty strings at the boundary
//! - **Explicit sentinels**: "shard fully consumed" is an enum variant, never
//!   a magic string inside the process
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod sequence;
mod types;

pub use error::{Error, Result};
pub use sequence::{CheckpointValue, ExtendedSequenceNumber, SequenceNumber, SHARD_END};
pub use types::{ShardId, WorkerId};
