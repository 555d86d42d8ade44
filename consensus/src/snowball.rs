//! Confidence counter — the per-conflict-set snowball state machine.
//!
//! Pure state, no I/O. A successful poll either reinforces the current
//! preference or flips it; an unsuccessful poll wipes the streak. Finalization
//! is decided by the caller against the threshold that fits the set's size.

use snowstorm_types::TxId;

/// Observable phase of a counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No streak: either never polled or the last poll failed.
    Unconfident,
    /// `confidence` consecutive successful polls for the current preference.
    Building(u32),
    /// Decided; further polls are ignored.
    Finalized,
}

/// Preference and consecutive-success streak of one conflict set.
#[derive(Clone, Debug, Default)]
pub struct Snowball {
    preference: Option<TxId>,
    confidence: u32,
    finalized: bool,
}

impl Snowball {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently favoured member, or `None` before the first successful poll.
    pub fn preference(&self) -> Option<TxId> {
        self.preference
    }

    pub fn confidence(&self) -> u32 {
        self.confidence
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn phase(&self) -> Phase {
        if self.finalized {
            Phase::Finalized
        } else if self.confidence == 0 {
            Phase::Unconfident
        } else {
            Phase::Building(self.confidence)
        }
    }

    /// `choice` reached alpha in this poll.
    ///
    /// Returns `true` when the preference flipped.
    pub fn record_successful_poll(&mut self, choice: TxId) -> bool {
        if self.finalized {
            return false;
        }
        if self.preference == Some(choice) {
            self.confidence = self.confidence.saturating_add(1);
            false
        } else {
            self.preference = Some(choice);
            self.confidence = 1;
            true
        }
    }

    /// No member reached alpha in this poll.
    pub fn record_unsuccessful_poll(&mut self) {
        if !self.finalized {
            self.confidence = 0;
        }
    }

    /// Finalize if the streak has reached `beta`.
    ///
    /// Returns the winner the first time the counter finalizes; `None` if it
    /// is not ready or was already finalized.
    pub fn try_finalize(&mut self, beta: u32) -> Option<TxId> {
        if self.finalized || self.confidence < beta {
            return None;
        }
        let winner = self.preference?;
        self.finalized = true;
        Some(winner)
    }

    /// Drop the streak after the conflict structure changed.
    pub fn reset_confidence(&mut self) {
        if !self.finalized {
            self.confidence = 0;
        }
    }

    /// Forget the preference because that member left the set.
    pub fn clear_preference(&mut self) {
        if !self.finalized {
            self.preference = None;
            self.confidence = 0;
        }
    }

    /// Adopt `preference` without a streak, if there is none yet.
    pub(crate) fn inherit_preference(&mut self, preference: Option<TxId>) {
        if self.preference.is_none() {
            self.preference = preference;
        }
    }
}
