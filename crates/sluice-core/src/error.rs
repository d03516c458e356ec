//! Error types and result aliases shared across Sluice components.
//!
//! Errors are structured for programmatic handling and include enough
//! context to name the exact envelope or identifier involved.

use crate::token::TypeToken;

/// The result type used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core Sluice operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A payload could not be downcast to the requested type.
    #[error("type mismatch: payload is {actual}, requested {requested}")]
    TypeMismatch {
        /// The runtime type the payload actually carries.
        actual: TypeToken,
        /// The runtime type the caller asked for.
        requested: TypeToken,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
