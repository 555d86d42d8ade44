//! Simulated network of consensus instances.
//!
//! Every node runs its own [`Consensus`] engine over its own copy of the same
//! workload. In each round every node samples `k` peers (with replacement)
//! and asks each one for the transactions it currently prefers; the answers
//! form the node's vote bag for that round.

use crate::tx::SimTx;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use snowstorm_consensus::{Consensus, Parameters, Status, Tx, TxId, VoteBag};
use std::sync::Arc;

/// Shape of the workload every node is seeded with.
#[derive(Clone, Debug)]
pub struct Workload {
    /// Number of two-member conflict sets.
    pub conflict_sets: usize,
    /// Length of a dependency chain hanging off the first member of the
    /// first conflict set.
    pub chain_length: usize,
}

/// One simulated participant.
struct Node {
    engine: Consensus<Arc<SimTx>>,
    /// Both members of every conflict set, in workload order.
    pairs: Vec<(TxId, TxId)>,
    chain: Vec<TxId>,
    /// The member of each pair this node saw first.
    first_seen: Vec<TxId>,
}

impl Node {
    fn new(index: usize, params: &Parameters, workload: &Workload, rng: &mut StdRng) -> Result<Self> {
        let mut engine = Consensus::new(params.clone())
            .with_context(|| format!("node {index}: invalid parameters"))?;
        let mut pairs = Vec::with_capacity(workload.conflict_sets);
        let mut first_seen = Vec::with_capacity(workload.conflict_sets);
        let mut anchor = None;

        for j in 0..workload.conflict_sets {
            let a = SimTx::new(format!("pair-{j}-a"), None);
            let b = SimTx::new(format!("pair-{j}-b"), None);
            pairs.push((a.id(), b.id()));
            if j == 0 {
                anchor = Some(Arc::clone(&a));
            }

            let (first, second) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
            first_seen.push(first.id());
            let first_id = first.id();
            engine.add(first, &[])?;
            engine.add(second, &[first_id])?;
        }

        let mut chain = Vec::with_capacity(workload.chain_length);
        let mut parent = anchor;
        for i in 0..workload.chain_length {
            let tx = SimTx::new(format!("chain-{i}"), parent.take());
            chain.push(tx.id());
            engine.add(Arc::clone(&tx), &[])?;
            parent = Some(tx);
        }

        Ok(Self {
            engine,
            pairs,
            chain,
            first_seen,
        })
    }

    /// The transactions this node would vote for if queried now.
    fn answer(&self) -> Vec<TxId> {
        let mut votes = Vec::with_capacity(self.pairs.len() + self.chain.len());
        for ((a, b), first) in self.pairs.iter().zip(&self.first_seen) {
            let choice = match (self.engine.status(a), self.engine.status(b)) {
                (Status::Accepted, _) => *a,
                (_, Status::Accepted) => *b,
                _ => self.engine.preference(a).unwrap_or(*first),
            };
            votes.push(choice);
        }
        votes.extend(
            self.chain
                .iter()
                .filter(|id| self.engine.status(id) != Status::Rejected),
        );
        votes
    }

    fn ids(&self) -> impl Iterator<Item = TxId> + '_ {
        self.pairs
            .iter()
            .flat_map(|(a, b)| [*a, *b])
            .chain(self.chain.iter().copied())
    }
}

/// Outcome of a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub nodes: usize,
    pub rounds: u64,
    /// Nodes with nothing left processing.
    pub finalized_nodes: usize,
    /// Transactions every node accepted.
    pub accepted: usize,
    /// Transactions every node rejected.
    pub rejected: usize,
    /// Transactions still processing on at least one node and decided the
    /// same way everywhere else.
    pub undecided: usize,
    /// Transactions accepted by some nodes and rejected by others.
    pub disagreements: Vec<String>,
}

impl Report {
    pub fn is_consistent(&self) -> bool {
        self.disagreements.is_empty()
    }
}

pub struct Simulation {
    nodes: Vec<Node>,
    sample_size: usize,
    rng: StdRng,
    rounds: u64,
}

impl Simulation {
    pub fn new(nodes: usize, params: &Parameters, workload: &Workload, seed: u64) -> Result<Self> {
        anyhow::ensure!(nodes > 0, "a simulation needs at least one node");
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = (0..nodes)
            .map(|i| Node::new(i, params, workload, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            nodes,
            sample_size: params.k as usize,
            rng,
            rounds: 0,
        })
    }

    /// Whether every node has decided everything.
    pub fn settled(&self) -> bool {
        self.nodes.iter().all(|n| n.engine.finalized())
    }

    /// Run one round: every node, in order, samples its peers and records
    /// the resulting poll. Returns the number of status changes.
    pub fn step(&mut self) -> Result<usize> {
        let count = self.nodes.len();
        let mut changed = 0;
        for i in 0..count {
            let mut bag = VoteBag::new();
            for _ in 0..self.sample_size {
                let peer = if count == 1 {
                    0
                } else {
                    let pick = self.rng.gen_range(0..count - 1);
                    if pick >= i {
                        pick + 1
                    } else {
                        pick
                    }
                };
                bag.extend(self.nodes[peer].answer());
            }
            let changes = self.nodes[i]
                .engine
                .record_poll(&bag)
                .with_context(|| format!("node {i}: poll failed in round {}", self.rounds))?;
            for change in &changes {
                tracing::debug!(node = i, tx = %change.id, status = %change.status, "decided");
            }
            changed += changes.len();
        }
        self.rounds += 1;
        Ok(changed)
    }

    /// Run until every node has settled or `max_rounds` rounds have passed.
    pub fn run(&mut self, max_rounds: u64) -> Result<Report> {
        while self.rounds < max_rounds && !self.settled() {
            let changed = self.step()?;
            if changed > 0 {
                tracing::info!(round = self.rounds, changed, "round complete");
            }
        }
        Ok(self.report())
    }

    pub fn report(&self) -> Report {
        let mut report = Report {
            nodes: self.nodes.len(),
            rounds: self.rounds,
            finalized_nodes: self.nodes.iter().filter(|n| n.engine.finalized()).count(),
            ..Report::default()
        };
        let Some(first) = self.nodes.first() else {
            return report;
        };

        for id in first.ids() {
            let statuses: Vec<Status> = self.nodes.iter().map(|n| n.engine.status(&id)).collect();
            let any_accepted = statuses.contains(&Status::Accepted);
            let any_rejected = statuses.contains(&Status::Rejected);
            let any_processing = statuses.contains(&Status::Processing);
            if any_accepted && any_rejected {
                report.disagreements.push(id.to_string());
            } else if any_processing {
                report.undecided += 1;
            } else if any_accepted {
                report.accepted += 1;
            } else {
                report.rejected += 1;
            }
        }
        report
    }
}
