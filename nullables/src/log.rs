//! Decision log — the order in which transactions were decided.

use parking_lot::Mutex;
use snowstorm_types::{Status, TxId};
use std::sync::Arc;

/// Shared, append-only record of accept/reject callbacks.
///
/// Clones share the same underlying log, so one log can be handed to every
/// transaction of a test.
#[derive(Clone, Debug, Default)]
pub struct DecisionLog {
    entries: Arc<Mutex<Vec<(TxId, Status)>>>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: TxId, status: Status) {
        self.entries.lock().push((id, status));
    }

    /// Every decision so far, oldest first.
    pub fn entries(&self) -> Vec<(TxId, Status)> {
        self.entries.lock().clone()
    }

    /// Position of `id`'s decision in the log.
    pub fn position(&self, id: &TxId) -> Option<usize> {
        self.entries.lock().iter().position(|(t, _)| t == id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
