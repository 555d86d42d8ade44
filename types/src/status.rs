//! Decision status of a transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a transaction stands in consensus.
///
/// `Accepted` and `Rejected` are terminal: once a transaction reaches either,
/// its status never changes again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Not known to the engine.
    Unknown,
    /// Registered and collecting votes.
    Processing,
    /// Permanently accepted.
    Accepted,
    /// Permanently rejected.
    Rejected,
}

impl Status {
    /// Whether the status is terminal.
    pub fn is_decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::Unknown, _) => next != Status::Unknown,
            (Status::Processing, Status::Accepted | Status::Rejected) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Processing => "processing",
            Status::Accepted => "accepted",
            Status::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
