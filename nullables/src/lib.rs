//! Nullable infrastructure for deterministic testing.
//!
//! The consensus engine reaches the outside world through two seams: the
//! [`Tx`](snowstorm_types::Tx) capability and the
//! [`Clock`](snowstorm_types::Clock). This crate provides test-friendly
//! implementations of both that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record every decision the engine makes
//!
//! Usage: build transactions with [`NullTx::builder`] and drive time with
//! [`NullClock::advance`].

pub mod clock;
pub mod log;
pub mod tx;

pub use clock::NullClock;
pub use log::DecisionLog;
pub use tx::{NullTx, NullTxBuilder};
