//! Transactions as seen by one simulated node.

use parking_lot::Mutex;
use snowstorm_types::{Dependency, Status, Tx, TxError, TxId};
use std::sync::Arc;

/// A transaction held by one node.
///
/// Every node builds its own copy from the same label, so ids agree across
/// the network while statuses stay per node.
#[derive(Debug)]
pub struct SimTx {
    id: TxId,
    label: String,
    status: Mutex<Status>,
    parent: Option<Arc<SimTx>>,
}

impl SimTx {
    pub fn new(label: impl Into<String>, parent: Option<Arc<SimTx>>) -> Arc<Self> {
        let label = label.into();
        let mut bytes = label.clone().into_bytes();
        if let Some(parent) = &parent {
            bytes.extend_from_slice(parent.id.as_bytes());
        }
        Arc::new(Self {
            id: TxId::digest(&bytes),
            label,
            status: Mutex::new(Status::Processing),
            parent,
        })
    }

    fn decide(&self, next: Status) -> Result<(), TxError> {
        let mut status = self.status.lock();
        if !status.can_transition_to(next) {
            return Err(TxError::Invalid(format!(
                "{} is already {}",
                self.label, *status
            )));
        }
        *status = next;
        Ok(())
    }
}

impl Tx for SimTx {
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
        Ok(self
            .parent
            .iter()
            .map(|p| Dependency::new(p.id(), p.status()))
            .collect())
    }

    fn verify(&self) -> Result<(), TxError> {
        Ok(())
    }

    fn bytes(&self) -> Vec<u8> {
        let mut bytes = self.label.clone().into_bytes();
        if let Some(parent) = &self.parent {
            bytes.extend_from_slice(parent.id.as_bytes());
        }
        bytes
    }
}
