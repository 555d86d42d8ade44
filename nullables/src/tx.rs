//! Nullable transaction — a scriptable [`Tx`] for driving the engine in tests.

use crate::log::DecisionLog;
use parking_lot::Mutex;
use serde::Serialize;
use snowstorm_types::{Dependency, Status, Tx, TxError, TxId};
use std::fmt;
use std::sync::Arc;

/// Everything that contributes to a test transaction's identity.
#[derive(Serialize)]
struct Body {
    seed: u64,
    dependencies: Vec<TxId>,
    missing: Option<TxId>,
    self_dependent: bool,
}

/// An in-memory transaction.
///
/// The id is the digest of the seed and the dependency ids, so two
/// transactions built from the same inputs are the same transaction.
pub struct NullTx {
    id: TxId,
    bytes: Vec<u8>,
    status: Mutex<Status>,
    dependencies: Vec<Arc<NullTx>>,
    missing: Option<TxId>,
    self_dependent: bool,
    invalid: Option<String>,
    failing_decisions: bool,
    log: Option<DecisionLog>,
}

impl NullTx {
    /// A processing transaction with no dependencies.
    pub fn new(seed: u64) -> Self {
        NullTxBuilder::new(seed).finish()
    }

    /// Shorthand for `Arc::new(NullTx::new(seed))`.
    pub fn arc(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn builder(seed: u64) -> NullTxBuilder {
        NullTxBuilder::new(seed)
    }

    /// The transactions this one depends on.
    pub fn parents(&self) -> &[Arc<NullTx>] {
        &self.dependencies
    }

    fn decide(&self, decision: Status) -> Result<(), TxError> {
        if self.failing_decisions {
            return Err(TxError::Other(format!("{} refused to be {decision}", self.id)));
        }
        let mut status = self.status.lock();
        if !status.can_transition_to(decision) {
            return Err(TxError::Invalid(format!(
                "{} cannot move from {} to {decision}",
                self.id, *status
            )));
        }
        *status = decision;
        drop(status);
        if let Some(log) = &self.log {
            log.record(self.id, decision);
        }
        Ok(())
    }
}

impl fmt::Debug for NullTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullTx")
            .field("id", &self.id)
            .field("status", &*self.status.lock())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

impl Tx for NullTx {
    fn id(&self) -> TxId {
        self.id
    }

    fn status(&self) -> Status {
        *self.status.lock()
    }

    fn accept(&self) -> Result<(), TxError> {
        self.decide(Status::Accepted)
    }

    fn reject(&self) -> Result<(), TxError> {
        self.decide(Status::Rejected)
    }

    fn dependencies(&self) -> Result<Vec<Dependency>, TxError> {
        if let Some(missing) = self.missing {
            return Err(TxError::MissingDependency(missing));
        }
        let mut deps: Vec<Dependency> = self
            .dependencies
            .iter()
            .map(|dep| Dependency::new(dep.id(), dep.status()))
            .collect();
        if self.self_dependent {
            deps.push(Dependency::new(self.id, self.status()));
        }
        Ok(deps)
    }

    fn verify(&self) -> Result<(), TxError> {
        match &self.invalid {
            Some(reason) => Err(TxError::Invalid(reason.clone())),
            None => Ok(()),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// Builder for [`NullTx`] with scripted behaviour.
#[derive(Clone)]
pub struct NullTxBuilder {
    seed: u64,
    status: Status,
    dependencies: Vec<Arc<NullTx>>,
    missing: Option<TxId>,
    self_dependent: bool,
    invalid: Option<String>,
    failing_decisions: bool,
    log: Option<DecisionLog>,
}

impl NullTxBuilder {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            status: Status::Processing,
            dependencies: Vec::new(),
            missing: None,
            self_dependent: false,
            invalid: None,
            failing_decisions: false,
            log: None,
        }
    }

    /// Depend on `parent`; its live status is reported to the engine.
    pub fn depends_on(mut self, parent: &Arc<NullTx>) -> Self {
        self.dependencies.push(Arc::clone(parent));
        self
    }

    /// Report the transaction itself as one of its dependencies.
    pub fn depends_on_self(mut self) -> Self {
        self.self_dependent = true;
        self
    }

    /// Fail dependency enumeration as if `id` were absent from the store.
    pub fn missing_dependency(mut self, id: TxId) -> Self {
        self.missing = Some(id);
        self
    }

    /// Fail verification with `reason`.
    pub fn invalid(mut self, reason: impl Into<String>) -> Self {
        self.invalid = Some(reason.into());
        self
    }

    /// Make `accept` and `reject` return an error.
    pub fn failing_decisions(mut self) -> Self {
        self.failing_decisions = true;
        self
    }

    /// Start in `status` instead of Processing.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Record accept/reject callbacks in `log`.
    pub fn log(mut self, log: &DecisionLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn build(self) -> Arc<NullTx> {
        Arc::new(self.finish())
    }

    fn finish(self) -> NullTx {
        let body = Body {
            seed: self.seed,
            dependencies: self.dependencies.iter().map(|d| d.id()).collect(),
            missing: self.missing,
            self_dependent: self.self_dependent,
        };
        let bytes = bincode::serialize(&body).unwrap_or_else(|_| self.seed.to_le_bytes().to_vec());
        NullTx {
            id: TxId::digest(&bytes),
            bytes,
            status: Mutex::new(self.status),
            dependencies: self.dependencies,
            missing: self.missing,
            self_dependent: self.self_dependent,
            invalid: self.invalid,
            failing_decisions: self.failing_decisions,
            log: self.log,
        }
    }
}
