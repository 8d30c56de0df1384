//! Error types for Shardline core values.
//!
//! All construction errors are returned explicitly. No silent coercion of
//! malformed identifiers or positions.

use std::fmt;

/// The result type for Shardline core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing core values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
