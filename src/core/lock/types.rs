//! Lock types and the reserved item attributes the lock manager stores them
//! in, matching the original source's `LOCK_SHARED`/`LOCK_EXCLUSIVE` and
//! `tx_manager_locks`/`tx_manager_x_lock` fields.

use crate::core::common::error::TxManagerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved attribute holding the set of `{"tx_uuid":…,"lock":"S"|"X"}`
/// entries describing every lock currently held on an item.
pub const LOCKS_ATTR: &str = "tx_manager_locks";

/// Reserved attribute holding the transaction uuid of an item's exclusive
/// lock holder, if any.
pub const X_LOCK_ATTR: &str = "tx_manager_x_lock";

/// The two lock modes an item handle can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// Shared: compatible with any number of other shared locks, blocked by
    /// an exclusive lock.
    Shared,
    /// Exclusive: blocked by any other lock, shared or exclusive.
    Exclusive,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "S"),
            Self::Exclusive => write!(f, "X"),
        }
    }
}

impl FromStr for LockType {
    type Err = TxManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(Self::Shared),
            "X" => Ok(Self::Exclusive),
            other => Err(TxManagerError::BadLockType(other.to_string())),
        }
    }
}

/// One element of `tx_manager_locks`: a JSON object tying a lock mode to the
/// transaction holding it, serialised as a plain string so it can live in a
/// string-set (`SS`) attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub tx_uuid: String,
    pub lock: String,
}

impl LockEntry {
    #[must_use]
    pub fn new(tx_uuid: impl Into<String>, lock_type: LockType) -> Self {
        Self { tx_uuid: tx_uuid.into(), lock: lock_type.to_string() }
    }

    pub fn lock_type(&self) -> Result<LockType, TxManagerError> {
        self.lock.parse()
    }

    pub fn to_json(&self) -> Result<String, TxManagerError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn from_json(raw: &str) -> Result<Self, TxManagerError> {
        serde_json::from_str(raw).map_err(Into::into)
    }
}
