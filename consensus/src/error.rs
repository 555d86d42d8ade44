use crate::engine::StatusChange;
use snowstorm_types::{ParamsError, Status, TxError, TxId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("transaction {0} is already processing")]
    DuplicateTransaction(TxId),

    #[error("dependencies of {tx} could not be resolved: {source}")]
    DependencyResolution {
        tx: TxId,
        #[source]
        source: TxError,
    },

    #[error("transaction {tx} would close a dependency cycle through {dependency}")]
    CyclicDependency { tx: TxId, dependency: TxId },

    #[error("transaction {tx} failed verification: {source}")]
    Verification {
        tx: TxId,
        #[source]
        source: TxError,
    },

    #[error("transaction {tx} names unknown conflict {conflict}")]
    UnknownConflict { tx: TxId, conflict: TxId },

    #[error("marking {tx} {status} failed: {source}")]
    Decision {
        tx: TxId,
        status: Status,
        #[source]
        source: TxError,
        /// Changes the failed call had already applied before this one.
        applied: Vec<StatusChange>,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParamsError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),
}
