//! Fundamental types for the snowstorm consensus engine.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! transaction identifiers, decision status, consensus parameters, timestamps,
//! and the [`Tx`] capability every consensable transaction implements.

pub mod error;
pub mod id;
pub mod params;
pub mod status;
pub mod time;
pub mod tx;

pub use error::ParamsError;
pub use id::TxId;
pub use params::Parameters;
pub use status::Status;
pub use time::{Clock, SystemClock, Timestamp};
pub use tx::{Dependency, Tx, TxError};
