//! Consensus engine — turns sampled votes into accept/reject decisions.
//!
//! The engine owns the decision state for every processing transaction: the
//! dependency graph, the conflict sets and their confidence counters. Each
//! [`Consensus::record_poll`] call tallies the votes per conflict set, updates
//! the counters, and then runs the cascade to a fixed point:
//!
//! - a finalized set rejects every member except its preference;
//! - a finalized preference is accepted once all of its dependencies are;
//! - an acceptance re-evaluates every dependent;
//! - a rejection rejects every dependent, transitively.
//!
//! Each id leaves Processing at most once and the dependency graph is acyclic,
//! so the cascade terminates.

use crate::config::ConsensusConfig;
use crate::conflict_set::{ConflictSet, ConflictSets, SetId};
use crate::decided::DecidedCache;
use crate::error::ConsensusError;
use crate::graph::DependencyGraph;
use crate::health::HealthReport;
use crate::metrics::ConsensusMetrics;
use crate::tally::{SetTally, VoteBag};
use snowstorm_types::{Clock, Parameters, Status, SystemClock, Timestamp, Tx, TxError, TxId};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

const DEFAULT_DECIDED_CACHE_CAPACITY: usize = 16_384;

/// A transaction whose status changed during a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub id: TxId,
    pub status: Status,
}

/// Why a transaction was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cause {
    /// Another member of its conflict set was finalized.
    LostTo(TxId),
    /// A dependency was rejected.
    Dependency(TxId),
    /// It conflicts with a transaction that was already accepted or finalized.
    Conflict(TxId),
    /// It conflicts with one of its own dependencies, directly or through
    /// the dependency's ancestors.
    ConflictsWithAncestor(TxId),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::LostTo(winner) => write!(f, "lost conflict to {winner}"),
            Cause::Dependency(dep) => write!(f, "dependency {dep} rejected"),
            Cause::Conflict(other) => write!(f, "conflicts with decided {other}"),
            Cause::ConflictsWithAncestor(ancestor) => {
                write!(f, "conflicts with its own dependency {ancestor}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Work {
    Finalize(SetId, TxId),
    Reject(TxId, Cause),
    TryAccept(TxId),
}

/// Result of the structural checks on an incoming transaction.
struct Admission {
    pending: BTreeSet<TxId>,
    conflict_sets: Vec<SetId>,
    doomed: Option<Cause>,
}

/// The conflict-set / dependency-graph consensus engine.
///
/// One instance is the single decision authority for its namespace. It is
/// not internally synchronized; wrap it in
/// [`SharedConsensus`](crate::SharedConsensus) to share it between threads.
pub struct Consensus<T: Tx> {
    params: Parameters,
    graph: DependencyGraph<T>,
    sets: ConflictSets,
    decided: DecidedCache,
    clock: Arc<dyn Clock>,
    metrics: ConsensusMetrics,
}

impl<T: Tx> Consensus<T> {
    /// Create an engine reading wall-clock time.
    pub fn new(params: Parameters) -> Result<Self, ConsensusError> {
        Self::with_clock(params, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`.
    pub fn with_clock(params: Parameters, clock: Arc<dyn Clock>) -> Result<Self, ConsensusError> {
        Self::build(params, DEFAULT_DECIDED_CACHE_CAPACITY, clock)
    }

    /// Create an engine from a loaded configuration.
    pub fn from_config(config: &ConsensusConfig) -> Result<Self, ConsensusError> {
        Self::build(
            config.params.clone(),
            config.decided_cache_capacity,
            Arc::new(SystemClock),
        )
    }

    fn build(
        params: Parameters,
        decided_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConsensusError> {
        params.validate()?;
        Ok(Self {
            params,
            graph: DependencyGraph::new(),
            sets: ConflictSets::new(),
            decided: DecidedCache::new(decided_capacity),
            clock,
            metrics: ConsensusMetrics::new()?,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn metrics(&self) -> &ConsensusMetrics {
        &self.metrics
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// Register a candidate transaction.
    ///
    /// `conflicts` names processing (or recently decided) transactions that
    /// are mutually exclusive with `tx`. With no live conflicts the
    /// transaction forms a new virtuous conflict set; otherwise it joins the
    /// union of the referenced sets.
    ///
    /// Returns the transaction's status after admission:
    /// - `Processing` when it was registered;
    /// - `Rejected` when it depends on a rejected transaction, conflicts
    ///   with an accepted or finalized one, or conflicts with one of its own
    ///   processing ancestors;
    /// - its own terminal status when it was already decided (no-op).
    ///
    /// Duplicate ids, unresolvable dependencies, self-dependencies and
    /// unknown conflicts fail without touching any state. A failed
    /// verification rejects the transaction and is reported as
    /// [`ConsensusError::Verification`].
    pub fn add(&mut self, tx: T, conflicts: &[TxId]) -> Result<Status, ConsensusError> {
        let id = tx.id();
        if self.graph.contains(&id) {
            return Err(ConsensusError::DuplicateTransaction(id));
        }
        let current = tx.status();
        if current.is_decided() {
            tracing::debug!(tx = %id, status = %current, "transaction already decided");
            self.decided.insert(id, current);
            return Ok(current);
        }

        let admission = self.check_admission(id, &tx, conflicts)?;

        if let Some(cause) = admission.doomed {
            self.reject_unregistered(id, &tx, cause)?;
            return Ok(Status::Rejected);
        }

        if let Err(source) = tx.verify() {
            tracing::info!(tx = %id, error = %source, "transaction failed verification");
            tx.reject().map_err(|source| decision_failed(id, Status::Rejected, source))?;
            self.decided.insert(id, Status::Rejected);
            self.metrics.rejected.inc();
            return Err(ConsensusError::Verification { tx: id, source });
        }

        self.register(id, tx, admission);
        Ok(Status::Processing)
    }

    fn check_admission(
        &self,
        id: TxId,
        tx: &T,
        conflicts: &[TxId],
    ) -> Result<Admission, ConsensusError> {
        let dependencies = tx
            .dependencies()
            .map_err(|source| ConsensusError::DependencyResolution { tx: id, source })?;

        let mut pending = BTreeSet::new();
        let mut doomed = None;

        for dep in dependencies {
            // Dependencies must already be registered or decided, so the only
            // cycle a newcomer can close runs through itself.
            if dep.id == id {
                return Err(ConsensusError::CyclicDependency {
                    tx: id,
                    dependency: dep.id,
                });
            }
            if self.graph.contains(&dep.id) {
                pending.insert(dep.id);
                continue;
            }
            let status = if dep.status.is_decided() {
                dep.status
            } else {
                self.decided.get(&dep.id).unwrap_or(dep.status)
            };
            match status {
                Status::Accepted => {}
                Status::Rejected => {
                    doomed.get_or_insert(Cause::Dependency(dep.id));
                }
                Status::Processing | Status::Unknown => {
                    return Err(ConsensusError::DependencyResolution {
                        tx: id,
                        source: TxError::MissingDependency(dep.id),
                    });
                }
            }
        }

        let mut conflict_sets = Vec::new();
        for conflict in conflicts {
            if *conflict == id {
                continue;
            }
            if let Some(vertex) = self.graph.get(conflict) {
                let finalized = self
                    .sets
                    .get(vertex.set())
                    .map(ConflictSet::is_finalized)
                    .unwrap_or(false);
                if finalized {
                    doomed.get_or_insert(Cause::Conflict(*conflict));
                } else {
                    conflict_sets.push(vertex.set());
                }
                continue;
            }
            match self.decided.get(conflict) {
                Some(Status::Accepted) => {
                    doomed.get_or_insert(Cause::Conflict(*conflict));
                }
                Some(Status::Rejected) => {}
                _ => {
                    return Err(ConsensusError::UnknownConflict {
                        tx: id,
                        conflict: *conflict,
                    });
                }
            }
        }

        if doomed.is_none() {
            doomed = self
                .ancestor_in_conflict(&pending, &conflict_sets)
                .map(Cause::ConflictsWithAncestor);
        }

        Ok(Admission {
            pending,
            conflict_sets,
            doomed,
        })
    }

    /// A member of one of `conflict_sets` that the newcomer depends on.
    ///
    /// Such a newcomer can never be accepted: winning its set rejects the
    /// ancestor, which rejects the newcomer in turn.
    fn ancestor_in_conflict(
        &self,
        pending: &BTreeSet<TxId>,
        conflict_sets: &[SetId],
    ) -> Option<TxId> {
        conflict_sets
            .iter()
            .filter_map(|handle| self.sets.get(*handle))
            .flat_map(|set| set.members().iter().copied())
            .find(|member| {
                pending.contains(member)
                    || pending.iter().any(|dep| self.graph.depends_on(dep, member))
            })
    }

    fn register(&mut self, id: TxId, tx: T, admission: Admission) {
        let set = match self.sets.join(id, &admission.conflict_sets) {
            Some(join) => {
                if join.merged {
                    self.metrics.merges.inc();
                    tracing::debug!(tx = %id, set = %join.set, "conflict sets merged");
                }
                join.set
            }
            None => self.sets.create(id),
        };
        tracing::debug!(
            tx = %id,
            set = %set,
            pending_dependencies = admission.pending.len(),
            "transaction admitted"
        );
        self.graph
            .insert(id, tx, set, admission.pending, self.clock.now());
        self.update_gauges();
    }

    fn reject_unregistered(&mut self, id: TxId, tx: &T, cause: Cause) -> Result<(), ConsensusError> {
        tx.reject().map_err(|source| decision_failed(id, Status::Rejected, source))?;
        self.decided.insert(id, Status::Rejected);
        self.metrics.rejected.inc();
        tracing::info!(tx = %id, cause = %cause, "transaction rejected on admission");
        Ok(())
    }

    // ── Polling ─────────────────────────────────────────────────────────

    /// Apply one round of sampled votes.
    ///
    /// Every conflict set touched by `votes` records a successful poll for the
    /// member that reached alpha, or an unsuccessful one if none did. Sets
    /// that reach their confidence threshold finalize and the cascade runs to
    /// a fixed point. Votes for ids that are not processing, or whose set is
    /// already finalized, are ignored.
    ///
    /// Returns every status change caused by this poll, in the order the
    /// changes happened. An error from a transaction's accept/reject
    /// callback aborts the cascade part-way and leaves the instance unusable;
    /// the changes applied before the failure are carried in
    /// [`ConsensusError::Decision::applied`](ConsensusError::Decision).
    pub fn record_poll(&mut self, votes: &VoteBag) -> Result<Vec<StatusChange>, ConsensusError> {
        self.metrics.polls.inc();

        let mut tallies: BTreeMap<SetId, SetTally> = BTreeMap::new();
        for (tx, weight) in votes.iter() {
            let root = self
                .graph
                .get(&tx)
                .and_then(|vertex| self.sets.find(vertex.set()));
            match root {
                Some(root) => tallies.entry(root).or_default().add(tx, weight),
                None => {
                    self.metrics.ignored_votes.inc_by(weight);
                    tracing::trace!(tx = %tx, weight, "vote for transaction that is not processing");
                }
            }
        }

        let alpha = u64::from(self.params.alpha);
        let mut work = VecDeque::new();
        for (root, tally) in tallies {
            let Some(set) = self.sets.get_mut(root) else {
                continue;
            };
            if set.is_finalized() {
                continue;
            }

            let reaching = tally.reaching(alpha);
            if reaching.len() > 1 {
                tracing::warn!(
                    set = %root,
                    candidates = reaching.len(),
                    "several members reached alpha in one poll; sampler returned more than k votes"
                );
            }
            match reaching.first() {
                Some((choice, support)) => {
                    let flipped = set.snowball_mut().record_successful_poll(*choice);
                    self.metrics.successful_set_polls.inc();
                    tracing::debug!(
                        set = %root,
                        preference = %choice,
                        support,
                        confidence = set.confidence(),
                        flipped,
                        "successful poll"
                    );
                }
                None => {
                    set.snowball_mut().record_unsuccessful_poll();
                    self.metrics.unsuccessful_set_polls.inc();
                    tracing::trace!(set = %root, "unsuccessful poll");
                }
            }

            let beta = self.params.beta_for(set.len());
            if let Some(winner) = set.snowball_mut().try_finalize(beta) {
                work.push_back(Work::Finalize(root, winner));
            }
        }

        let mut changes = Vec::new();
        let outcome = self.cascade(work, &mut changes);
        self.update_gauges();
        match outcome {
            Ok(()) => Ok(changes),
            Err(ConsensusError::Decision {
                tx, status, source, ..
            }) => Err(ConsensusError::Decision {
                tx,
                status,
                source,
                applied: changes,
            }),
            Err(other) => Err(other),
        }
    }

    // ── Cascade ─────────────────────────────────────────────────────────

    fn cascade(
        &mut self,
        mut work: VecDeque<Work>,
        changes: &mut Vec<StatusChange>,
    ) -> Result<(), ConsensusError> {
        while let Some(item) = work.pop_front() {
            match item {
                Work::Finalize(set, winner) => {
                    let losers: Vec<TxId> = self
                        .sets
                        .get(set)
                        .map(|s| {
                            s.members()
                                .iter()
                                .filter(|m| **m != winner)
                                .copied()
                                .collect()
                        })
                        .unwrap_or_default();
                    tracing::info!(
                        set = %set,
                        winner = %winner,
                        losers = losers.len(),
                        "conflict set finalized"
                    );
                    for loser in losers {
                        work.push_back(Work::Reject(loser, Cause::LostTo(winner)));
                    }
                    work.push_back(Work::TryAccept(winner));
                }
                Work::Reject(id, cause) => self.reject(id, cause, &mut work, changes)?,
                Work::TryAccept(id) => self.try_accept(id, &mut work, changes)?,
            }
        }
        Ok(())
    }

    fn reject(
        &mut self,
        id: TxId,
        cause: Cause,
        work: &mut VecDeque<Work>,
        changes: &mut Vec<StatusChange>,
    ) -> Result<(), ConsensusError> {
        let Some(vertex) = self.graph.get(&id) else {
            return Ok(());
        };
        vertex.tx().reject().map_err(|source| decision_failed(id, Status::Rejected, source))?;
        let Some(vertex) = self.graph.remove(&id) else {
            return Ok(());
        };

        if let Some(removal) = self.sets.remove_member(vertex.set(), &id) {
            if !removal.dissolved {
                self.refinalize(removal.set, work);
            }
        }
        for dependent in vertex.dependents() {
            work.push_back(Work::Reject(*dependent, Cause::Dependency(id)));
        }

        let now = self.clock.now();
        self.decided.insert(id, Status::Rejected);
        self.metrics.rejected.inc();
        self.metrics
            .reject_latency_secs
            .observe(vertex.added_at().elapsed_since(now) as f64);
        changes.push(StatusChange {
            id,
            status: Status::Rejected,
        });
        tracing::info!(tx = %id, cause = %cause, "transaction rejected");
        Ok(())
    }

    /// A set that lost a member may now be a singleton whose streak already
    /// meets the virtuous threshold.
    fn refinalize(&mut self, set: SetId, work: &mut VecDeque<Work>) {
        let Some(conflict_set) = self.sets.get_mut(set) else {
            return;
        };
        let beta = self.params.beta_for(conflict_set.len());
        if let Some(winner) = conflict_set.snowball_mut().try_finalize(beta) {
            work.push_back(Work::Finalize(set, winner));
        }
    }

    fn try_accept(
        &mut self,
        id: TxId,
        work: &mut VecDeque<Work>,
        changes: &mut Vec<StatusChange>,
    ) -> Result<(), ConsensusError> {
        let Some(vertex) = self.graph.get(&id) else {
            return Ok(());
        };
        let won = self
            .sets
            .get(vertex.set())
            .map(|s| s.is_finalized() && s.preference() == Some(id))
            .unwrap_or(false);
        if !won {
            return Ok(());
        }
        if !vertex.is_ready() {
            tracing::debug!(
                tx = %id,
                pending_dependencies = vertex.pending_dependencies().len(),
                "finalized transaction waiting on dependencies"
            );
            return Ok(());
        }

        vertex.tx().accept().map_err(|source| decision_failed(id, Status::Accepted, source))?;
        let Some(vertex) = self.graph.remove(&id) else {
            return Ok(());
        };
        self.sets.remove_member(vertex.set(), &id);

        for dependent in vertex.dependents() {
            if self.graph.resolve(dependent, &id) == Some(true) {
                work.push_back(Work::TryAccept(*dependent));
            }
        }

        let now = self.clock.now();
        self.decided.insert(id, Status::Accepted);
        self.metrics.accepted.inc();
        self.metrics
            .accept_latency_secs
            .observe(vertex.added_at().elapsed_since(now) as f64);
        changes.push(StatusChange {
            id,
            status: Status::Accepted,
        });
        tracing::info!(tx = %id, "transaction accepted");
        Ok(())
    }

    fn update_gauges(&self) {
        self.metrics.processing.set(self.graph.len() as i64);
        self.metrics.conflict_sets.set(self.sets.len() as i64);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Status of `id` as far as this engine knows.
    pub fn status(&self, id: &TxId) -> Status {
        if self.graph.contains(id) {
            Status::Processing
        } else {
            self.decided.get(id).unwrap_or(Status::Unknown)
        }
    }

    /// Whether `id` is registered and undecided.
    pub fn processing(&self, id: &TxId) -> bool {
        self.graph.contains(id)
    }

    pub fn num_processing(&self) -> usize {
        self.graph.len()
    }

    /// Nothing is left processing.
    pub fn finalized(&self) -> bool {
        self.graph.is_empty()
    }

    /// The conflict set `id` belongs to.
    pub fn conflict_set(&self, id: &TxId) -> Option<&ConflictSet> {
        self.graph
            .get(id)
            .and_then(|vertex| self.sets.get(vertex.set()))
    }

    /// Whether `id`'s conflict set currently has no other member.
    pub fn is_virtuous(&self, id: &TxId) -> bool {
        self.conflict_set(id)
            .map(ConflictSet::is_virtuous)
            .unwrap_or(false)
    }

    /// Processing transactions that conflict with `id`.
    pub fn conflicts(&self, id: &TxId) -> Vec<TxId> {
        self.conflict_set(id)
            .map(|s| s.members().iter().filter(|m| *m != id).copied().collect())
            .unwrap_or_default()
    }

    /// Preference of `id`'s conflict set.
    pub fn preference(&self, id: &TxId) -> Option<TxId> {
        self.conflict_set(id).and_then(ConflictSet::preference)
    }

    /// Preferred members of every conflict set that has not finalized yet.
    pub fn preferences(&self) -> Vec<TxId> {
        self.sets
            .iter()
            .filter(|(_, set)| !set.is_finalized())
            .filter_map(|(_, set)| set.preference())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Members of unfinalized conflict sets that have no conflicts.
    pub fn virtuous(&self) -> Vec<TxId> {
        self.sets
            .iter()
            .filter(|(_, set)| set.is_virtuous() && !set.is_finalized())
            .flat_map(|(_, set)| set.members().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Report whether the backlog is within the configured limits.
    pub fn health_check(&self) -> HealthReport {
        self.health_check_at(self.clock.now())
    }

    fn health_check_at(&self, now: Timestamp) -> HealthReport {
        let report = HealthReport::assess(&self.params, self.graph.len(), self.graph.oldest(), now);
        if !report.is_healthy() {
            tracing::warn!(issues = ?report.issues, "consensus engine unhealthy");
        }
        report
    }
}

fn decision_failed(tx: TxId, status: Status, source: TxError) -> ConsensusError {
    ConsensusError::Decision {
        tx,
        status,
        source,
        applied: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snowstorm_nullables::{NullClock, NullTx};

    type Engine = Consensus<Arc<NullTx>>;

    /// k=5, alpha=3, beta_virtuous=2, beta_rogue=4.
    fn params() -> Parameters {
        Parameters {
            k: 5,
            alpha: 3,
            beta_virtuous: 2,
            beta_rogue: 4,
            max_outstanding_items: 8,
            max_item_processing_secs: 30,
        }
    }

    fn engine() -> Engine {
        Consensus::new(params()).unwrap()
    }

    fn votes(entries: &[(&Arc<NullTx>, u64)]) -> VoteBag {
        entries.iter().map(|(tx, w)| (tx.id(), *w)).collect()
    }

    fn change(tx: &Arc<NullTx>, status: Status) -> StatusChange {
        StatusChange {
            id: tx.id(),
            status,
        }
    }

    #[test]
    fn invalid_parameters_refused() {
        let bad = Parameters {
            alpha: 2,
            ..params()
        };
        assert!(matches!(
            Engine::new(bad),
            Err(ConsensusError::InvalidParameters(_))
        ));
    }

    #[test]
    fn add_registers_virtuous_transaction() {
        let mut e = engine();
        let a = NullTx::arc(1);
        assert_eq!(e.add(a.clone(), &[]).unwrap(), Status::Processing);
        assert!(e.processing(&a.id()));
        assert!(e.is_virtuous(&a.id()));
        assert_eq!(e.preference(&a.id()), None);
        assert_eq!(e.virtuous(), vec![a.id()]);
        assert_eq!(a.status(), Status::Processing);
    }

    #[test]
    fn duplicate_add_fails_without_mutation() {
        let mut e = engine();
        let a = NullTx::arc(1);
        e.add(a.clone(), &[]).unwrap();
        let err = e.add(a.clone(), &[]).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateTransaction(id) if id == a.id()));
        assert_eq!(e.num_processing(), 1);
    }

    #[test]
    fn already_decided_transaction_is_noop() {
        let mut e = engine();
        let a = NullTx::builder(1).status(Status::Accepted).build();
        assert_eq!(e.add(a.clone(), &[]).unwrap(), Status::Accepted);
        assert_eq!(e.num_processing(), 0);
        assert_eq!(e.status(&a.id()), Status::Accepted);
    }

    #[test]
    fn virtuous_transaction_accepts_after_beta_virtuous() {
        let mut e = engine();
        let a = NullTx::arc(1);
        e.add(a.clone(), &[]).unwrap();

        assert!(e.record_poll(&votes(&[(&a, 5)])).unwrap().is_empty());
        let changes = e.record_poll(&votes(&[(&a, 5)])).unwrap();
        assert_eq!(changes, vec![change(&a, Status::Accepted)]);
        assert_eq!(a.status(), Status::Accepted);
        assert!(e.finalized());
        assert_eq!(e.status(&a.id()), Status::Accepted);
    }

    #[test]
    fn conflict_joins_existing_set() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        assert!(!e.is_virtuous(&a.id()));
        assert_eq!(e.conflicts(&a.id()), vec![b.id()]);
        assert_eq!(e.conflicts(&b.id()), vec![a.id()]);
        assert!(e.virtuous().is_empty());
    }

    #[test]
    fn contested_set_needs_beta_rogue() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();

        for round in 1..=3 {
            assert!(e.record_poll(&votes(&[(&a, 3), (&b, 2)])).unwrap().is_empty());
            assert_eq!(e.conflict_set(&a.id()).unwrap().confidence(), round);
        }
        let changes = e.record_poll(&votes(&[(&a, 3), (&b, 2)])).unwrap();
        assert_eq!(
            changes,
            vec![change(&b, Status::Rejected), change(&a, Status::Accepted)]
        );
        assert_eq!(b.status(), Status::Rejected);
    }

    #[test]
    fn preference_flip_restarts_confidence() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();

        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&b, 3)])).unwrap();
        let set = e.conflict_set(&a.id()).unwrap();
        assert_eq!(set.preference(), Some(b.id()));
        assert_eq!(set.confidence(), 1);
        assert_eq!(e.preferences(), vec![b.id()]);
    }

    #[test]
    fn split_vote_is_unsuccessful() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&a, 2), (&b, 2)])).unwrap();
        let set = e.conflict_set(&a.id()).unwrap();
        assert_eq!(set.confidence(), 0);
        assert_eq!(set.preference(), Some(a.id()));
    }

    #[test]
    fn untouched_sets_keep_their_streak() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        let c = NullTx::arc(3);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        e.add(c.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&c, 3)])).unwrap();
        assert_eq!(e.conflict_set(&a.id()).unwrap().confidence(), 1);
    }

    #[test]
    fn merging_sets_resets_confidence() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        let c = NullTx::arc(3);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 5)])).unwrap();
        assert_eq!(e.conflict_set(&a.id()).unwrap().confidence(), 1);

        e.add(c.clone(), &[a.id(), b.id()]).unwrap();
        let set = e.conflict_set(&c.id()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.confidence(), 0);
        assert_eq!(e.conflicts(&b.id()).len(), 2);
        assert_eq!(e.metrics().merges.get(), 1);
    }

    #[test]
    fn missing_dependency_fails_without_mutation() {
        let mut e = engine();
        let ghost = NullTx::arc(9);
        let d = NullTx::builder(2).depends_on(&ghost).build();
        let err = e.add(d.clone(), &[]).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::DependencyResolution {
                source: TxError::MissingDependency(missing),
                ..
            } if missing == ghost.id()
        ));
        assert_eq!(e.num_processing(), 0);
        assert_eq!(d.status(), Status::Processing);
    }

    #[test]
    fn store_resolution_failure_is_propagated() {
        let mut e = engine();
        let missing = TxId::new([7; 32]);
        let d = NullTx::builder(2).missing_dependency(missing).build();
        assert!(matches!(
            e.add(d, &[]),
            Err(ConsensusError::DependencyResolution { .. })
        ));
        assert_eq!(e.num_processing(), 0);
    }

    #[test]
    fn self_dependency_is_cyclic() {
        let mut e = engine();
        let d = NullTx::builder(2).depends_on_self().build();
        let err = e.add(d.clone(), &[]).unwrap_err();
        assert!(matches!(err, ConsensusError::CyclicDependency { tx, dependency } if tx == d.id() && dependency == d.id()));
        assert_eq!(e.num_processing(), 0);
    }

    #[test]
    fn unknown_conflict_fails_without_mutation() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let err = e.add(a.clone(), &[TxId::new([3; 32])]).unwrap_err();
        assert!(matches!(err, ConsensusError::UnknownConflict { .. }));
        assert_eq!(e.num_processing(), 0);
        assert_eq!(a.status(), Status::Processing);
    }

    #[test]
    fn verification_failure_rejects() {
        let mut e = engine();
        let a = NullTx::builder(1).invalid("double spend").build();
        let err = e.add(a.clone(), &[]).unwrap_err();
        assert!(matches!(err, ConsensusError::Verification { tx, .. } if tx == a.id()));
        assert_eq!(a.status(), Status::Rejected);
        assert_eq!(e.status(&a.id()), Status::Rejected);
        assert_eq!(e.num_processing(), 0);
        assert_eq!(e.metrics().rejected.get(), 1);
    }

    #[test]
    fn depending_on_rejected_transaction_rejects_on_admission() {
        let mut e = engine();
        let bad = NullTx::builder(1).status(Status::Rejected).build();
        let d = NullTx::builder(2).depends_on(&bad).build();
        assert_eq!(e.add(d.clone(), &[]).unwrap(), Status::Rejected);
        assert_eq!(d.status(), Status::Rejected);
        assert_eq!(e.num_processing(), 0);
    }

    #[test]
    fn depending_on_accepted_transaction_is_satisfied() {
        let mut e = engine();
        let done = NullTx::builder(1).status(Status::Accepted).build();
        let d = NullTx::builder(2).depends_on(&done).build();
        e.add(d.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&d, 3)])).unwrap();
        let changes = e.record_poll(&votes(&[(&d, 3)])).unwrap();
        assert_eq!(changes, vec![change(&d, Status::Accepted)]);
    }

    #[test]
    fn conflict_with_accepted_transaction_rejects_on_admission() {
        let mut e = engine();
        let a = NullTx::arc(1);
        e.add(a.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        assert_eq!(a.status(), Status::Accepted);

        let b = NullTx::arc(2);
        assert_eq!(e.add(b.clone(), &[a.id()]).unwrap(), Status::Rejected);
        assert_eq!(b.status(), Status::Rejected);
    }

    #[test]
    fn conflict_with_rejected_transaction_is_ignored() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        for _ in 0..4 {
            e.record_poll(&votes(&[(&a, 3)])).unwrap();
        }
        assert_eq!(b.status(), Status::Rejected);

        let c = NullTx::arc(3);
        assert_eq!(e.add(c.clone(), &[b.id()]).unwrap(), Status::Processing);
        assert!(e.is_virtuous(&c.id()));
    }

    #[test]
    fn conflict_with_finalized_pending_winner_rejects_on_admission() {
        let mut e = engine();
        let root = NullTx::arc(1);
        let a = NullTx::builder(2).depends_on(&root).build();
        e.add(root.clone(), &[]).unwrap();
        e.add(a.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        // a is finalized but waits for root
        assert_eq!(a.status(), Status::Processing);
        assert!(e.conflict_set(&a.id()).unwrap().is_finalized());

        let b = NullTx::arc(3);
        assert_eq!(e.add(b.clone(), &[a.id()]).unwrap(), Status::Rejected);
        assert!(e.is_virtuous(&a.id()));
    }

    #[test]
    fn conflicting_with_own_dependency_rejects_on_admission() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::builder(2).depends_on(&a).build();
        e.add(a.clone(), &[]).unwrap();
        assert_eq!(e.add(b.clone(), &[a.id()]).unwrap(), Status::Rejected);
        assert_eq!(b.status(), Status::Rejected);
        assert_eq!(e.num_processing(), 1);
        assert!(e.is_virtuous(&a.id()));

        for _ in 0..3 {
            e.record_poll(&votes(&[(&b, 5)])).unwrap();
        }
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        let changes = e.record_poll(&votes(&[(&a, 3)])).unwrap();
        assert_eq!(changes, vec![change(&a, Status::Accepted)]);
    }

    #[test]
    fn conflicting_with_transitive_dependency_rejects_on_admission() {
        let mut e = engine();
        let root = NullTx::arc(1);
        let child = NullTx::builder(2).depends_on(&root).build();
        let grandchild = NullTx::builder(3).depends_on(&child).build();
        e.add(root.clone(), &[]).unwrap();
        e.add(child.clone(), &[]).unwrap();
        assert_eq!(
            e.add(grandchild.clone(), &[root.id()]).unwrap(),
            Status::Rejected
        );
        assert_eq!(e.status(&grandchild.id()), Status::Rejected);
        assert_eq!(e.num_processing(), 2);
        assert!(e.is_virtuous(&root.id()));
    }

    #[test]
    fn conflicting_with_unrelated_member_is_admitted() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        let c = NullTx::builder(3).depends_on(&b).build();
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[]).unwrap();
        assert_eq!(e.add(c.clone(), &[a.id()]).unwrap(), Status::Processing);
        assert!(!e.is_virtuous(&a.id()));
    }

    #[test]
    fn finalized_transaction_waits_for_dependency() {
        let mut e = engine();
        let parent = NullTx::arc(1);
        let child = NullTx::builder(2).depends_on(&parent).build();
        e.add(parent.clone(), &[]).unwrap();
        e.add(child.clone(), &[]).unwrap();

        e.record_poll(&votes(&[(&child, 3)])).unwrap();
        assert!(e.record_poll(&votes(&[(&child, 3)])).unwrap().is_empty());
        assert_eq!(child.status(), Status::Processing);
        assert!(e.preferences().is_empty());

        e.record_poll(&votes(&[(&parent, 3)])).unwrap();
        let changes = e.record_poll(&votes(&[(&parent, 3)])).unwrap();
        assert_eq!(
            changes,
            vec![change(&parent, Status::Accepted), change(&child, Status::Accepted)]
        );
    }

    #[test]
    fn votes_on_finalized_set_are_ignored() {
        let mut e = engine();
        let parent = NullTx::arc(1);
        let child = NullTx::builder(2).depends_on(&parent).build();
        e.add(parent.clone(), &[]).unwrap();
        e.add(child.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&child, 3)])).unwrap();
        e.record_poll(&votes(&[(&child, 3)])).unwrap();
        let before = e.metrics().successful_set_polls.get();
        e.record_poll(&votes(&[(&child, 3)])).unwrap();
        assert_eq!(e.metrics().successful_set_polls.get(), before);
    }

    #[test]
    fn rejection_cascades_to_dependents_in_same_poll() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let c = NullTx::arc(2);
        let d = NullTx::builder(3).depends_on(&c).build();
        let f = NullTx::builder(4).depends_on(&d).build();
        e.add(a.clone(), &[]).unwrap();
        e.add(c.clone(), &[a.id()]).unwrap();
        e.add(d.clone(), &[]).unwrap();
        e.add(f.clone(), &[]).unwrap();

        let mut last = Vec::new();
        for _ in 0..4 {
            last = e.record_poll(&votes(&[(&a, 4)])).unwrap();
        }
        assert_eq!(
            last,
            vec![
                change(&c, Status::Rejected),
                change(&a, Status::Accepted),
                change(&d, Status::Rejected),
                change(&f, Status::Rejected),
            ]
        );
        assert!(e.finalized());
    }

    #[test]
    fn dependency_rejection_can_finalize_remaining_member() {
        let mut e = engine();
        let parent = NullTx::arc(1);
        let rival = NullTx::arc(2);
        let a = NullTx::arc(3);
        let b = NullTx::builder(4).depends_on(&rival).build();
        e.add(parent.clone(), &[]).unwrap();
        e.add(rival.clone(), &[parent.id()]).unwrap();
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();

        // a builds a streak of 3 while contested (needs 4)
        for _ in 0..3 {
            e.record_poll(&votes(&[(&a, 3)])).unwrap();
        }
        // parent wins; rival and therefore b are rejected, leaving a alone
        let mut changes = Vec::new();
        for _ in 0..4 {
            changes = e.record_poll(&votes(&[(&parent, 3)])).unwrap();
        }
        assert!(changes.contains(&change(&b, Status::Rejected)));
        assert!(changes.contains(&change(&a, Status::Accepted)));
        assert!(e.finalized());
    }

    #[test]
    fn unknown_votes_are_counted_and_ignored() {
        let mut e = engine();
        let mut bag = VoteBag::new();
        bag.add(TxId::new([5; 32]), 4);
        assert!(e.record_poll(&bag).unwrap().is_empty());
        assert_eq!(e.metrics().ignored_votes.get(), 4);
        assert_eq!(e.metrics().polls.get(), 1);
    }

    #[test]
    fn over_weighted_poll_picks_strongest_member() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        e.record_poll(&votes(&[(&a, 3), (&b, 4)])).unwrap();
        assert_eq!(e.preference(&a.id()), Some(b.id()));
    }

    #[test]
    fn accept_callback_failure_is_reported() {
        let mut e = engine();
        let a = NullTx::builder(1).failing_decisions().build();
        e.add(a.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 3)])).unwrap();
        let err = e.record_poll(&votes(&[(&a, 3)])).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Decision {
                status: Status::Accepted,
                ..
            }
        ));
    }

    #[test]
    fn callback_failure_carries_changes_already_applied() {
        let mut e = engine();
        let a = NullTx::arc(1);
        let b = NullTx::builder(2).failing_decisions().build();
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[]).unwrap();
        e.record_poll(&votes(&[(&a, 3), (&b, 3)])).unwrap();
        let err = e.record_poll(&votes(&[(&a, 3), (&b, 3)])).unwrap_err();
        match err {
            ConsensusError::Decision {
                tx, status, applied, ..
            } => {
                assert_eq!(tx, b.id());
                assert_eq!(status, Status::Accepted);
                assert_eq!(applied, vec![change(&a, Status::Accepted)]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.status(), Status::Accepted);
    }

    #[test]
    fn health_check_tracks_oldest_transaction() {
        let clock = Arc::new(NullClock::new(1_000));
        let mut e = Engine::with_clock(params(), clock.clone()).unwrap();
        let a = NullTx::arc(1);
        e.add(a, &[]).unwrap();

        clock.advance(10);
        let report = e.health_check();
        assert!(report.is_healthy());
        assert_eq!(report.oldest_processing_secs, Some(10));

        clock.advance(25);
        assert!(!e.health_check().is_healthy());
    }

    #[test]
    fn metrics_follow_decisions() {
        let clock = Arc::new(NullClock::new(0));
        let mut e = Engine::with_clock(params(), clock.clone()).unwrap();
        let a = NullTx::arc(1);
        let b = NullTx::arc(2);
        e.add(a.clone(), &[]).unwrap();
        e.add(b.clone(), &[a.id()]).unwrap();
        assert_eq!(e.metrics().processing.get(), 2);
        assert_eq!(e.metrics().conflict_sets.get(), 1);

        clock.advance(3);
        for _ in 0..4 {
            e.record_poll(&votes(&[(&a, 3)])).unwrap();
        }
        assert_eq!(e.metrics().accepted.get(), 1);
        assert_eq!(e.metrics().rejected.get(), 1);
        assert_eq!(e.metrics().processing.get(), 0);
        assert_eq!(e.metrics().conflict_sets.get(), 0);
        assert_eq!(e.metrics().accept_latency_secs.get_sample_count(), 1);
        assert_eq!(e.metrics().accept_latency_secs.get_sample_sum(), 3.0);
    }
}
