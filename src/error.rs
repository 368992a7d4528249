//! Centralized error handling for graphvault.
//!
//! Every failure in the crate is a [`VaultError`]. Library code never panics:
//! the crate root enforces `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`,
//! so all failure conditions travel through [`Result`].
//!
//! ## Error Categories
//!
//! - **Connection** ([`VaultError::ConnectionLost`]): the backing connection failed its
//!   health check and the single reconnect attempt failed as well.
//! - **Database** ([`VaultError::Database`]): a statement failed on a healthy connection.
//! - **Encoding** ([`VaultError::CorruptEncoding`]): the rows of one key cannot be
//!   reconstructed. Scoped to that key; a full-table load keeps going.
//! - **Internal** ([`VaultError::Internal`]): worker panics, poisoned locks, pool setup.
//!
//! Hash collisions between caller keys are *not* an error category. Two keys that
//! hash to the same [`KeyHash`](crate::key::KeyHash) silently share one slot; see
//! the documentation on that type.
//!
//! ## Usage
//!
//! ```rust
//! use graphvault::VaultError;
//!
//! fn describe(err: &VaultError) -> &'static str {
//!     match err {
//!         VaultError::ConnectionLost(_) => "database unreachable",
//!         VaultError::CorruptEncoding { .. } => "stored value unreadable",
//!         _ => "other failure",
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::key::KeyHash;

/// A specialized `Result` type for graphvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The master error enum covering all failure domains of the vault.
///
/// This type is `Clone` so that a corrupt key's error can live in the cache next to
/// the healthy values and be handed out repeatedly. Foreign errors are wrapped in
/// `Arc` to keep cloning cheap.
#[derive(Debug, Clone)]
pub enum VaultError {
    /// The backing connection is gone and one reconnect attempt did not bring it back.
    ///
    /// The string carries the reason reported by the last attempt.
    ConnectionLost(String),

    /// A SQL statement failed on an otherwise healthy connection.
    Database(Arc<rusqlite::Error>),

    /// The stored rows of a single key do not describe a valid value.
    ///
    /// ## Common Causes
    ///
    /// - Unknown type tag
    /// - Scalar column that does not match its tag
    /// - Child row whose parent local id matches no composite (orphan)
    /// - Missing root row, or more than one
    /// - Gaps or duplicates in the sequence indices of an ordered container
    CorruptEncoding {
        /// The hashed key whose rows are corrupt, when it is known.
        key: Option<KeyHash>,
        /// Description of the first violation found.
        reason: String,
    },

    /// Logic error inside the crate (worker panic, poisoned mutex, pool construction).
    Internal(String),
}

impl VaultError {
    /// Builds a [`VaultError::CorruptEncoding`] for `key`.
    pub fn corrupt(key: impl Into<Option<KeyHash>>, reason: impl Into<String>) -> Self {
        Self::CorruptEncoding {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true when the error is scoped to one key's encoding.
    pub fn is_corrupt_encoding(&self) -> bool {
        matches!(self, Self::CorruptEncoding { .. })
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(reason) => write!(f, "Connection Lost: {reason}"),
            Self::Database(e) => write!(f, "Database Error: {e}"),
            Self::CorruptEncoding {
                key: Some(key),
                reason,
            } => write!(f, "Corrupt Encoding for key {key}: {reason}"),
            Self::CorruptEncoding { key: None, reason } => {
                write!(f, "Corrupt Encoding: {reason}")
            }
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for VaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Blocking worker failed: {err}"))
    }
}
