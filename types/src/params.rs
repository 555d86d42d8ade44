//! Consensus parameters — sampling and confidence thresholds.

use crate::error::ParamsError;
use serde::{Deserialize, Serialize};

/// Thresholds that govern how polls turn into decisions.
///
/// A poll over a conflict set is successful when one member collects at least
/// `alpha` of the (up to) `k` sampled votes. A conflict set finalizes once its
/// preference has been confirmed by `beta_virtuous` consecutive successful
/// polls when it has a single member, or `beta_rogue` when it is contested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Number of peers sampled per poll.
    #[serde(default = "default_k")]
    pub k: u32,

    /// Votes a member needs within one poll for the poll to count as successful.
    #[serde(default = "default_alpha")]
    pub alpha: u32,

    /// Consecutive successes that finalize a singleton (virtuous) conflict set.
    #[serde(default = "default_beta_virtuous")]
    pub beta_virtuous: u32,

    /// Consecutive successes that finalize a contested (rogue) conflict set.
    #[serde(default = "default_beta_rogue")]
    pub beta_rogue: u32,

    /// Processing transactions above which the engine reports itself unhealthy.
    #[serde(default = "default_max_outstanding_items")]
    pub max_outstanding_items: usize,

    /// Age (seconds) of the oldest processing transaction above which the
    /// engine reports itself unhealthy.
    #[serde(default = "default_max_item_processing_secs")]
    pub max_item_processing_secs: u64,
}

fn default_k() -> u32 {
    20
}

fn default_alpha() -> u32 {
    15
}

fn default_beta_virtuous() -> u32 {
    15
}

fn default_beta_rogue() -> u32 {
    20
}

fn default_max_outstanding_items() -> usize {
    256
}

fn default_max_item_processing_secs() -> u64 {
    30
}

impl Parameters {
    /// Check the invariants the engine relies on.
    ///
    /// `alpha > k / 2` guarantees that at most one member of a conflict set can
    /// reach alpha in a single well-formed poll.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.k == 0 {
            return Err(ParamsError::ZeroSampleSize);
        }
        if self.alpha <= self.k / 2 || self.alpha > self.k {
            return Err(ParamsError::InvalidAlpha {
                alpha: self.alpha,
                k: self.k,
            });
        }
        if self.beta_virtuous == 0 {
            return Err(ParamsError::ZeroBetaVirtuous);
        }
        if self.beta_rogue < self.beta_virtuous {
            return Err(ParamsError::InvalidBetaRogue {
                beta_virtuous: self.beta_virtuous,
                beta_rogue: self.beta_rogue,
            });
        }
        if self.max_outstanding_items == 0 {
            return Err(ParamsError::ZeroMaxOutstanding);
        }
        Ok(())
    }

    /// Confidence needed to finalize a conflict set with `members` members.
    pub fn beta_for(&self, members: usize) -> u32 {
        if members <= 1 {
            self.beta_virtuous
        } else {
            self.beta_rogue
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: default_k(),
            alpha: default_alpha(),
            beta_virtuous: default_beta_virtuous(),
            beta_rogue: default_beta_rogue(),
            max_outstanding_items: default_max_outstanding_items(),
            max_item_processing_secs: default_max_item_processing_secs(),
        }
    }
}
