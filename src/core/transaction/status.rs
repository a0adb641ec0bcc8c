//! The transaction status field stored on the `tx-info` row. Advances
//! monotonically `START -> IN-FLIGHT -> {COMMIT, ROLLBACK}`.

use crate::core::common::error::TxManagerError;
use std::str::FromStr;

/// A transaction's lifecycle state, as stored in `tx-info.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Start,
    InFlight,
    Commit,
    Rollback,
}

impl TxStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::InFlight => "IN-FLIGHT",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }

    /// Whether this status is one of the two terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Commit | Self::Rollback)
    }
}

impl FromStr for TxStatus {
    type Err = TxManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(Self::Start),
            "IN-FLIGHT" => Ok(Self::InFlight),
            "COMMIT" => Ok(Self::Commit),
            "ROLLBACK" => Ok(Self::Rollback),
            other => Err(TxManagerError::Internal(format!("unknown tx status {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_commit_and_rollback() {
        assert!(!TxStatus::Start.is_terminal());
        assert!(!TxStatus::InFlight.is_terminal());
        assert!(TxStatus::Commit.is_terminal());
        assert!(TxStatus::Rollback.is_terminal());
    }

    #[test]
    fn round_trips_through_as_str_and_from_str() {
        for status in [TxStatus::Start, TxStatus::InFlight, TxStatus::Commit, TxStatus::Rollback] {
            assert_eq!(TxStatus::from_str(status.as_str()).expect("parse"), status);
        }
    }
}
