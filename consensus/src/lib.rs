//! Consensus — conflict-set / dependency-graph decision engine.
//!
//! Transactions that spend the same input are grouped into conflict sets.
//! Repeated sampled polls feed a per-set confidence counter; once a set's
//! preferred member has been chosen by enough consecutive successful polls
//! the set is finalized. A finalized preference is accepted as soon as every
//! transaction it depends on is accepted, and rejection of any transaction
//! propagates to everything that depends on it.
//!
//! ## Module overview
//!
//! - [`engine`] — The [`Consensus`] engine: admission, polling, cascade, queries.
//! - [`shared`] — [`SharedConsensus`], a lock-guarded handle for multi-threaded hosts.
//! - [`conflict_set`] — Union-find registry of conflict sets.
//! - [`snowball`] — Per-set preference and confidence counter.
//! - [`graph`] — Dependency graph between processing transactions.
//! - [`tally`] — Vote bags and per-set tallies.
//! - [`decided`] — Bounded memory of recently decided transactions.
//! - [`health`] — Backlog health reporting.
//! - [`metrics`] — Prometheus metrics.
//! - [`config`] — TOML configuration.
//! - [`error`] — Consensus error types.

pub mod config;
pub mod conflict_set;
pub mod decided;
pub mod engine;
pub mod error;
pub mod graph;
pub mod health;
pub mod metrics;
pub mod shared;
pub mod snowball;
pub mod tally;

pub use config::ConsensusConfig;
pub use conflict_set::{ConflictSet, ConflictSets, SetId};
pub use decided::DecidedCache;
pub use engine::{Consensus, StatusChange};
pub use error::ConsensusError;
pub use graph::{DependencyGraph, Vertex};
pub use health::HealthReport;
pub use metrics::ConsensusMetrics;
pub use shared::SharedConsensus;
pub use snowball::{Phase, Snowball};
pub use tally::VoteBag;

pub use snowstorm_types::{Dependency, Parameters, Status, Tx, TxError, TxId};
