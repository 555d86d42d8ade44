//! Parameter validation errors.

use thiserror::Error;

/// Why a [`Parameters`](crate::Parameters) value was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("sample size k must be positive")]
    ZeroSampleSize,

    #[error("alpha {alpha} must be a strict majority of k {k} and at most k")]
    InvalidAlpha { alpha: u32, k: u32 },

    #[error("beta_virtuous must be positive")]
    ZeroBetaVirtuous,

    #[error("beta_rogue {beta_rogue} must be at least beta_virtuous {beta_virtuous}")]
    InvalidBetaRogue { beta_virtuous: u32, beta_rogue: u32 },

    #[error("max_outstanding_items must be positive")]
    ZeroMaxOutstanding,
}
