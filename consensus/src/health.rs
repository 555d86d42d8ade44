//! Health reporting — flags an engine that is falling behind.

use snowstorm_types::{Parameters, Timestamp};
use snowstorm_utils::format_duration;
use std::time::Duration;

/// Snapshot of the engine's backlog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    /// Transactions currently processing.
    pub processing: usize,
    /// Age of the longest-processing transaction, in seconds.
    pub oldest_processing_secs: Option<u64>,
    /// Reasons the engine is unhealthy; empty when healthy.
    pub issues: Vec<String>,
}

impl HealthReport {
    pub(crate) fn assess(
        params: &Parameters,
        processing: usize,
        oldest: Option<Timestamp>,
        now: Timestamp,
    ) -> Self {
        let oldest_processing_secs = oldest.map(|t| t.elapsed_since(now));
        let mut issues = Vec::new();

        if processing > params.max_outstanding_items {
            issues.push(format!(
                "{processing} transactions processing, limit is {}",
                params.max_outstanding_items
            ));
        }
        if let Some(age) = oldest_processing_secs {
            if age > params.max_item_processing_secs {
                issues.push(format!(
                    "oldest transaction has been processing for {}, limit is {}",
                    format_duration(Duration::from_secs(age)),
                    format_duration(Duration::from_secs(params.max_item_processing_secs)),
                ));
            }
        }

        Self {
            processing,
            oldest_processing_secs,
            issues,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}
