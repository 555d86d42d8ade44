//! Thread-safe handle to a [`Consensus`] engine.

use crate::conflict_set::ConflictSet;
use crate::engine::{Consensus, StatusChange};
use crate::error::ConsensusError;
use crate::health::HealthReport;
use crate::tally::VoteBag;
use parking_lot::RwLock;
use snowstorm_types::{Parameters, Status, Tx, TxId};
use std::sync::Arc;

/// Clonable handle that serializes mutations and lets queries run
/// concurrently.
///
/// `add` and `record_poll` take the write lock for their whole duration, so
/// every call observes the effects of all calls that completed before it.
pub struct SharedConsensus<T: Tx> {
    inner: Arc<RwLock<Consensus<T>>>,
}

impl<T: Tx> Clone for SharedConsensus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Tx> SharedConsensus<T> {
    pub fn new(engine: Consensus<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn add(&self, tx: T, conflicts: &[TxId]) -> Result<Status, ConsensusError> {
        self.inner.write().add(tx, conflicts)
    }

    pub fn record_poll(&self, votes: &VoteBag) -> Result<Vec<StatusChange>, ConsensusError> {
        self.inner.write().record_poll(votes)
    }

    pub fn status(&self, id: &TxId) -> Status {
        self.inner.read().status(id)
    }

    pub fn processing(&self, id: &TxId) -> bool {
        self.inner.read().processing(id)
    }

    pub fn num_processing(&self) -> usize {
        self.inner.read().num_processing()
    }

    pub fn finalized(&self) -> bool {
        self.inner.read().finalized()
    }

    pub fn is_virtuous(&self, id: &TxId) -> bool {
        self.inner.read().is_virtuous(id)
    }

    pub fn conflicts(&self, id: &TxId) -> Vec<TxId> {
        self.inner.read().conflicts(id)
    }

    pub fn preference(&self, id: &TxId) -> Option<TxId> {
        self.inner.read().preference(id)
    }

    /// Snapshot of `id`'s conflict set.
    pub fn conflict_set(&self, id: &TxId) -> Option<ConflictSet> {
        self.inner.read().conflict_set(id).cloned()
    }

    pub fn preferences(&self) -> Vec<TxId> {
        self.inner.read().preferences()
    }

    pub fn virtuous(&self) -> Vec<TxId> {
        self.inner.read().virtuous()
    }

    pub fn health_check(&self) -> HealthReport {
        self.inner.read().health_check()
    }

    pub fn parameters(&self) -> Parameters {
        self.inner.read().parameters().clone()
    }

    /// Prometheus text exposition of the engine's metrics.
    pub fn encode_metrics(&self) -> Result<String, ConsensusError> {
        Ok(self.inner.read().metrics().encode_text()?)
    }
}
