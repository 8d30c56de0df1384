//! Strongly-typed identifiers for Shardline entities.
//!
//! Shard and worker identities are opaque strings assigned outside this
//! library (by the stream service and the lease-assignment subsystem). The
//! wrappers keep them from being mixed up and reject empty values.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Macro to generate strongly-typed string identifier wrappers.
///
/// Each ID type wraps a non-empty `String` and provides:
/// - Type safety (can't pass a `WorkerId` where a `ShardId` is expected)
/// - Debug/Display formatting
/// - Fallible conversions from `&str` and `String`
macro_rules! define_name_id {
    ($name:ident, $arg:expr, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID.
            ///
            /// # Errors
            ///
            /// Returns `InvalidArgument` if `value` is empty.
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.is_empty() {
                    return Err(Error::InvalidArgument {
                        name: $arg,
                        reason: "must not be empty",
                    });
                }
                Ok(Self(value))
            }

            /// Returns the raw identifier.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the ID and returns the raw identifier.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name_id!(
    ShardId,
    "shard_id",
    "shard",
    "Identifier of a shard (an ordered partition of the stream)."
);
define_name_id!(
    WorkerId,
    "worker_id",
    "worker",
    "Identity of a worker that can hold shard leases."
);
