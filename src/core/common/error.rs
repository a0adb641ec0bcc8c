//! Error types for the transaction manager.
//!
//! Follows the same shape as most of the error handling in this crate: one
//! flat enum per concern, manual `Display`/`Error` impls, and `From` bridges
//! for the handful of upstream error types we actually wrap.

use std::fmt;

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, Clone)]
pub enum TxManagerError {
    /// The auxiliary `tx-info`/`tx-data` tables exist with attribute
    /// definitions that do not match what this crate expects.
    BadTxTableAttributes(String),
    /// The auxiliary tables exist with a key schema that does not match.
    BadTxTableKeySchema(String),
    /// A table's key schema could not be resolved against the caller-supplied
    /// key values (e.g. a range key exists but none was given).
    KeyConfigurationError(String),
    /// `lock()` was called with a lock type the item lock manager does not
    /// understand.
    BadLockType(String),
    /// `wait_lock` exceeded `max_wait_time` without acquiring the lock.
    LockWaitTimeout { table: String, rec_uuid: String, waited_ms: u64 },
    /// A read, update, or delete targeted an item that does not exist.
    NotExistingItem { table: String },
    /// A conditional write to the underlying store failed. Most call sites
    /// treat this as significant; lock-release paths swallow it instead.
    ConditionalCheckFailed(String),
    /// A status transition on `tx-info` failed its condition. The
    /// transaction is left in an indeterminate state for a sweeper to find.
    StatusTransitionFailed { tx_uuid: String, from: String, to: String },
    /// The transaction has already reached a terminal state (`COMMIT` or
    /// `ROLLBACK`) and cannot be mutated further.
    TransactionTerminated(String),
    /// Errors surfaced unchanged from the underlying `RemoteStore`
    /// implementation (throttling, network failures, ...).
    Store(String),
    /// JSON encode/decode failures for WAL images or lock-set entries.
    Serialization(String),
    /// Anything else, narrated for debugging.
    Internal(String),
}

impl fmt::Display for TxManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTxTableAttributes(msg) => write!(f, "bad tx table attributes: {msg}"),
            Self::BadTxTableKeySchema(msg) => write!(f, "bad tx table key schema: {msg}"),
            Self::KeyConfigurationError(msg) => write!(f, "key configuration error: {msg}"),
            Self::BadLockType(msg) => write!(f, "bad lock type: {msg}"),
            Self::LockWaitTimeout { table, rec_uuid, waited_ms } => write!(
                f,
                "timed out after {waited_ms}ms waiting for a lock on {table}/{rec_uuid}"
            ),
            Self::NotExistingItem { table } => write!(f, "item does not exist in table {table}"),
            Self::ConditionalCheckFailed(msg) => write!(f, "conditional check failed: {msg}"),
            Self::StatusTransitionFailed { tx_uuid, from, to } => write!(
                f,
                "tx {tx_uuid} failed to transition {from} -> {to}; leaving for sweeper-driven rollback"
            ),
            Self::TransactionTerminated(msg) => write!(f, "transaction already terminated: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for TxManagerError {}

impl From<serde_json::Error> for TxManagerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
