//! The capability every consensable transaction provides.
//!
//! The engine is polymorphic over this one bundle of operations: a decidable
//! status, dependency enumeration, semantic verification and canonical bytes.

use crate::id::TxId;
use crate::status::Status;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a transaction implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// A referenced dependency cannot be located by the backing store.
    #[error("dependency {0} could not be resolved")]
    MissingDependency(TxId),

    /// The transaction's state transition is unsound.
    #[error("invalid transaction: {0}")]
    Invalid(String),

    #[error("{0}")]
    Other(String),
}

/// A dependency edge as reported by [`Tx::dependencies`].
///
/// Carries the dependency's status as seen by the caller's store, so the
/// engine can account for dependencies that were decided before it saw them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub id: TxId,
    pub status: Status,
}

impl Dependency {
    pub fn new(id: TxId, status: Status) -> Self {
        Self { id, status }
    }
}

/// A transaction that can take part in consensus.
///
/// `accept` and `reject` are invoked only by the engine, at most once each per
/// transaction and never both. `verify` is invoked only after every
/// dependency has itself been verified.
pub trait Tx: Send + Sync {
    /// Stable identifier, unique for the transaction's lifetime.
    fn id(&self) -> TxId;

    /// Current decision status.
    fn status(&self) -> Status;

    /// Mark the transaction accepted.
    fn accept(&self) -> Result<(), TxError>;

    /// Mark the transaction rejected.
    fn reject(&self) -> Result<(), TxError>;

    /// Transactions that must be accepted before this one may be.
    ///
    /// The list must not change once the engine has observed it.
    fn dependencies(&self) -> Result<Vec<Dependency>, TxError>;

    /// Check that the transaction's state transition is individually sound.
    fn verify(&self) -> Result<(), TxError>;

    /// Canonical serialization, deterministic for a given [`Tx::id`].
    fn bytes(&self) -> Vec<u8>;
}

impl<T: Tx + ?Sized> Tx for Arc<T> {
    fn id(&self) -> TxId {
        (**self).id()
    }

    fn status(&self) -> Status {
        (**self).status()
    }

    fn accept(&self) -> Result<(), TxError> {
        (**self).accept()
    }

    fn reject(&self) -> Result<(), TxError> {
        (**self).reject()
    }

    fn dependencies(&self) -> Result<Vec<Dependency>, TxError> {
        (**self).dependencies()
    }

    fn verify(&self) -> Result<(), TxError> {
        (**self).verify()
    }

    fn bytes(&self) -> Vec<u8> {
        (**self).bytes()
    }
}
