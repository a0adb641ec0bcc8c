//! Isolation level tokens. Represented as an ordered enum whose declaration
//! order matches the wire tokens' lexicographic order, so row-level
//! comparisons (and `derive(Ord)`) reflect strictness directly.

use crate::core::common::error::TxManagerError;
use std::str::FromStr;

/// How aggressively a transaction's reads lock the items they touch.
///
/// The original source never varied read-time locking by level — every
/// `get` took a shared lock regardless. This crate makes the three levels
/// behave distinctly instead (an open question the source left to
/// implementers): `FullLock` upgrades reads to an exclusive lock,
/// `ReadCommitted` takes the default shared lock, and `ReadUncommitted`
/// skips locking reads entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsolationLevel {
    FullLock,
    ReadCommitted,
    ReadUncommitted,
}

impl IsolationLevel {
    /// The wire token, chosen so lexicographic order matches strictness.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::FullLock => "000 full lock",
            Self::ReadCommitted => "100 read committed",
            Self::ReadUncommitted => "200 read uncommitted",
        }
    }

    /// Whether a plain read under this level acquires a shared lock at all.
    #[must_use]
    pub fn reads_take_lock(self) -> bool {
        !matches!(self, Self::ReadUncommitted)
    }

    /// Whether a plain read under this level should acquire an exclusive
    /// lock instead of a shared one.
    #[must_use]
    pub fn reads_require_exclusive(self) -> bool {
        matches!(self, Self::FullLock)
    }
}

impl FromStr for IsolationLevel {
    type Err = TxManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "000 full lock" => Ok(Self::FullLock),
            "100 read committed" => Ok(Self::ReadCommitted),
            "200 read uncommitted" => Ok(Self::ReadUncommitted),
            other => Err(TxManagerError::Internal(format!("unknown isolation level token {other}"))),
        }
    }
}
