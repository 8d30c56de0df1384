//! Positions within a shard's record stream.
//!
//! A [`SequenceNumber`] is the opaque marker the stream service assigns to a
//! record. An [`ExtendedSequenceNumber`] adds a sub-sequence number so records
//! unpacked from the same aggregated batch still have a total order. The
//! value recorded in the lease ledger is a [`CheckpointValue`], which is
//! either a concrete sequence number or the shard-end sentinel.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Stored form of the "shard fully consumed" checkpoint.
pub const SHARD_END: &str = "SHARD_END";

// -----------------------------------------------------------------------------
// Sequence Number
// -----------------------------------------------------------------------------

/// Opaque, totally ordered position of a record within a shard.
///
/// Stream services issue sequence numbers as arbitrarily long decimal
/// strings without leading zeros, so all-digit values are compared
/// numerically (shorter is smaller, then digit by digit). All-digit values
/// sort before any other value; the rest use plain string ordering.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SequenceNumber(String);

impl SequenceNumber {
    /// Creates a sequence number.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `value` is empty or equals the
    /// [`SHARD_END`] sentinel.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidArgument {
                name: "sequence_number",
                reason: "must not be empty",
            });
        }
        if value == SHARD_END {
            return Err(Error::InvalidArgument {
                name: "sequence_number",
                reason: "shard end is not a sequence number",
            });
        }
        Ok(Self(value))
    }

    /// Returns the raw sequence number.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_numeric(&self) -> bool {
        self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_numeric(), other.is_numeric()) {
            (true, true) => self
                .0
                .len()
                .cmp(&other.0.len())
                .then_with(|| self.0.cmp(&other.0)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq({})", self.0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SequenceNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for SequenceNumber {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl AsRef<str> for SequenceNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// -----------------------------------------------------------------------------
// Extended Sequence Number
// -----------------------------------------------------------------------------

/// A sequence number plus a sub-sequence number for aggregated records.
///
/// A missing sequence number denotes the end of the shard; it sorts after
/// every concrete position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtendedSequenceNumber {
    sequence_number: Option<SequenceNumber>,
    sub_sequence_number: u64,
}

impl ExtendedSequenceNumber {
    /// Creates a position for a non-aggregated record.
    #[must_use]
    pub const fn new(sequence_number: SequenceNumber) -> Self {
        Self {
            sequence_number: Some(sequence_number),
            sub_sequence_number: 0,
        }
    }

    /// Creates a position for a record inside an aggregated batch.
    #[must_use]
    pub const fn with_sub_sequence(
        sequence_number: SequenceNumber,
        sub_sequence_number: u64,
    ) -> Self {
        Self {
            sequence_number: Some(sequence_number),
            sub_sequence_number,
        }
    }

    /// The position past the last record of a closed shard.
    #[must_use]
    pub const fn shard_end() -> Self {
        Self {
            sequence_number: None,
            sub_sequence_number: 0,
        }
    }

    /// Returns the sequence number, or `None` at shard end.
    #[must_use]
    pub const fn sequence_number(&self) -> Option<&SequenceNumber> {
        self.sequence_number.as_ref()
    }

    /// Returns the sub-sequence number.
    #[must_use]
    pub const fn sub_sequence_number(&self) -> u64 {
        self.sub_sequence_number
    }

    /// Returns true if this is the shard-end position.
    #[must_use]
    pub const fn is_shard_end(&self) -> bool {
        self.sequence_number.is_none()
    }

    /// Returns the checkpoint value this position would record.
    ///
    /// The sub-sequence number is not part of the stored checkpoint.
    #[must_use]
    pub fn to_checkpoint_value(&self) -> CheckpointValue {
        self.sequence_number
            .clone()
            .map_or(CheckpointValue::ShardEnd, CheckpointValue::Sequence)
    }
}

impl From<SequenceNumber> for ExtendedSequenceNumber {
    fn from(sequence_number: SequenceNumber) -> Self {
        Self::new(sequence_number)
    }
}

impl Ord for ExtendedSequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_sequence = match (&self.sequence_number, &other.sequence_number) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_sequence.then(self.sub_sequence_number.cmp(&other.sub_sequence_number))
    }
}

impl PartialOrd for ExtendedSequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ExtendedSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sequence_number {
            None => f.write_str(SHARD_END),
            Some(seq) if self.sub_sequence_number == 0 => write!(f, "{seq}"),
            Some(seq) => write!(f, "{seq}:{}", self.sub_sequence_number),
        }
    }
}

// -----------------------------------------------------------------------------
// Checkpoint Value
// -----------------------------------------------------------------------------

/// The value recorded as a shard's checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckpointValue {
    /// Everything up to and including this sequence number is processed.
    Sequence(SequenceNumber),
    /// The shard is closed and fully consumed.
    ShardEnd,
}

impl CheckpointValue {
    /// Parses the stored form of a checkpoint.
    ///
    /// [`SHARD_END`] maps to [`CheckpointValue::ShardEnd`]; anything else
    /// non-empty is a sequence number.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `value` is empty.
    pub fn parse(value: &str) -> Result<Self> {
        if value == SHARD_END {
            return Ok(Self::ShardEnd);
        }
        SequenceNumber::new(value).map(Self::Sequence)
    }

    /// Returns the stored form of the checkpoint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sequence(seq) => seq.as_str(),
            Self::ShardEnd => SHARD_END,
        }
    }

    /// Returns true if this is the shard-end sentinel.
    #[must_use]
    pub const fn is_shard_end(&self) -> bool {
        matches!(self, Self::ShardEnd)
    }

    /// Returns the sequence number, or `None` for the sentinel.
    #[must_use]
    pub const fn sequence_number(&self) -> Option<&SequenceNumber> {
        match self {
            Self::Sequence(seq) => Some(seq),
            Self::ShardEnd => None,
        }
    }
}

impl From<SequenceNumber> for CheckpointValue {
    fn from(seq: SequenceNumber) -> Self {
        Self::Sequence(seq)
    }
}

impl fmt::Display for CheckpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
