//! Common error types shared across crates.

use thiserror::Error;

/// Result alias for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by every [`RecordStore`](crate::store::RecordStore) operation.
///
/// Messages may name record kinds and attributes but never attribute values of
/// sensitive fields. Use [`StoreError::public_message`] for text that is safe to
/// hand to end users.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write: another row already holds `value`.
    #[error("unique constraint violated on {kind}.{attribute}")]
    UniqueViolation {
        /// Record kind the constraint belongs to.
        kind: &'static str,
        /// Attribute carrying the constraint.
        attribute: String,
        /// The conflicting value.
        value: String,
    },

    /// The write was refused before reaching the store.
    #[error("write aborted: {0}")]
    Aborted(String),

    /// The backing store failed (I/O, connection, driver error).
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for errors the caller may resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    /// Message safe to surface to end users.
    ///
    /// Internal causes are collapsed into a generic message so nothing about
    /// key resolution or storage internals leaks past the service boundary.
    pub fn public_message(&self) -> &'static str {
        match self {
            StoreError::UniqueViolation { .. } => "record already exists",
            StoreError::Aborted(_) | StoreError::Backend(_) => "internal error",
        }
    }
}
