//! Vote tallies handed to the engine by the external sampler.

use snowstorm_types::TxId;
use std::collections::BTreeMap;

/// Support per transaction collected in one polling round.
///
/// Weights are summed per id; iteration is in id order so that tallies feed
/// the engine deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteBag {
    votes: BTreeMap<TxId, u64>,
}

impl VoteBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` votes for `tx`.
    pub fn add(&mut self, tx: TxId, weight: u64) {
        if weight == 0 {
            return;
        }
        let entry = self.votes.entry(tx).or_insert(0);
        *entry = entry.saturating_add(weight);
    }

    /// Add a single vote for `tx`.
    pub fn vote(&mut self, tx: TxId) {
        self.add(tx, 1);
    }

    pub fn count(&self, tx: &TxId) -> u64 {
        self.votes.get(tx).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TxId, u64)> + '_ {
        self.votes.iter().map(|(id, w)| (*id, *w))
    }
}

impl FromIterator<(TxId, u64)> for VoteBag {
    fn from_iter<I: IntoIterator<Item = (TxId, u64)>>(iter: I) -> Self {
        let mut bag = VoteBag::new();
        for (tx, weight) in iter {
            bag.add(tx, weight);
        }
        bag
    }
}

impl Extend<TxId> for VoteBag {
    fn extend<I: IntoIterator<Item = TxId>>(&mut self, iter: I) {
        for tx in iter {
            self.vote(tx);
        }
    }
}

/// Running tally of the members of one conflict set within one poll.
#[derive(Clone, Debug, Default)]
pub(crate) struct SetTally {
    support: BTreeMap<TxId, u64>,
}

impl SetTally {
    pub(crate) fn add(&mut self, tx: TxId, weight: u64) {
        let entry = self.support.entry(tx).or_insert(0);
        *entry = entry.saturating_add(weight);
    }

    /// Members whose support reached `alpha`, strongest first (ties by id).
    pub(crate) fn reaching(&self, alpha: u64) -> Vec<(TxId, u64)> {
        let mut winners: Vec<(TxId, u64)> = self
            .support
            .iter()
            .filter(|(_, w)| **w >= alpha)
            .map(|(id, w)| (*id, *w))
            .collect();
        winners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        winners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> TxId {
        TxId::new([byte; 32])
    }

    #[test]
    fn votes_accumulate_per_id() {
        let mut bag = VoteBag::new();
        bag.vote(id(1));
        bag.add(id(1), 2);
        bag.vote(id(2));
        assert_eq!(bag.count(&id(1)), 3);
        assert_eq!(bag.count(&id(2)), 1);
        assert_eq!(bag.count(&id(3)), 0);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn zero_weight_is_not_recorded() {
        let mut bag = VoteBag::new();
        bag.add(id(1), 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn iteration_is_in_id_order() {
        let bag: VoteBag = [(id(9), 1), (id(3), 1), (id(5), 1)].into_iter().collect();
        let order: Vec<TxId> = bag.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![id(3), id(5), id(9)]);
    }

    #[test]
    fn extend_counts_each_occurrence() {
        let mut bag = VoteBag::new();
        bag.extend([id(1), id(1), id(2)]);
        assert_eq!(bag.count(&id(1)), 2);
    }

    #[test]
    fn set_tally_orders_winners_by_strength() {
        let mut tally = SetTally::default();
        tally.add(id(2), 3);
        tally.add(id(1), 3);
        tally.add(id(3), 4);
        tally.add(id(4), 1);
        let reaching = tally.reaching(3);
        assert_eq!(reaching, vec![(id(3), 4), (id(1), 3), (id(2), 3)]);
        assert!(tally.reaching(5).is_empty());
    }
}
