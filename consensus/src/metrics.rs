//! Prometheus metrics for the consensus engine.
//!
//! Every engine owns a dedicated [`Registry`] so several instances (one per
//! chain, or one per simulated node) never collide on metric names.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct ConsensusMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Transactions that reached Accepted.
    pub accepted: IntCounter,
    /// Transactions that reached Rejected, for any reason.
    pub rejected: IntCounter,
    /// Calls to `record_poll`.
    pub polls: IntCounter,
    /// Conflict-set polls where some member reached alpha.
    pub successful_set_polls: IntCounter,
    /// Conflict-set polls where no member reached alpha.
    pub unsuccessful_set_polls: IntCounter,
    /// Conflict sets unioned by an admission.
    pub merges: IntCounter,
    /// Votes naming ids that are not processing.
    pub ignored_votes: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Transactions currently in the registry.
    pub processing: IntGauge,
    /// Live conflict sets.
    pub conflict_sets: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Seconds from admission to acceptance.
    pub accept_latency_secs: Histogram,
    /// Seconds from admission to rejection.
    pub reject_latency_secs: Histogram,
}

impl ConsensusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let accepted = register_int_counter_with_registry!(
            Opts::new("snowstorm_accepted_total", "Transactions accepted"),
            registry
        )?;
        let rejected = register_int_counter_with_registry!(
            Opts::new("snowstorm_rejected_total", "Transactions rejected"),
            registry
        )?;
        let polls = register_int_counter_with_registry!(
            Opts::new("snowstorm_polls_total", "Polls recorded"),
            registry
        )?;
        let successful_set_polls = register_int_counter_with_registry!(
            Opts::new(
                "snowstorm_set_polls_successful_total",
                "Conflict-set polls in which a member reached alpha"
            ),
            registry
        )?;
        let unsuccessful_set_polls = register_int_counter_with_registry!(
            Opts::new(
                "snowstorm_set_polls_unsuccessful_total",
                "Conflict-set polls in which no member reached alpha"
            ),
            registry
        )?;
        let merges = register_int_counter_with_registry!(
            Opts::new("snowstorm_set_merges_total", "Conflict sets unioned on admission"),
            registry
        )?;
        let ignored_votes = register_int_counter_with_registry!(
            Opts::new(
                "snowstorm_ignored_votes_total",
                "Votes naming transactions that are not processing"
            ),
            registry
        )?;

        let processing = register_int_gauge_with_registry!(
            Opts::new("snowstorm_processing", "Transactions currently processing"),
            registry
        )?;
        let conflict_sets = register_int_gauge_with_registry!(
            Opts::new("snowstorm_conflict_sets", "Live conflict sets"),
            registry
        )?;

        // 1 s → ~17 min
        let accept_latency_secs = register_histogram_with_registry!(
            HistogramOpts::new(
                "snowstorm_accept_latency_seconds",
                "Seconds from admission to acceptance"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 11)?),
            registry
        )?;
        let reject_latency_secs = register_histogram_with_registry!(
            HistogramOpts::new(
                "snowstorm_reject_latency_seconds",
                "Seconds from admission to rejection"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 11)?),
            registry
        )?;

        Ok(Self {
            registry,
            accepted,
            rejected,
            polls,
            successful_set_polls,
            unsuccessful_set_polls,
            merges,
            ignored_votes,
            processing,
            conflict_sets,
            accept_latency_secs,
            reject_latency_secs,
        })
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
