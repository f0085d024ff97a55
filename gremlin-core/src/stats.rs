//! Per-service success-rate summaries over a trace window.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::InvalidInputError;
use crate::types::{ServiceNode, TraceOutcome};

/// Observation counts for one service.
///
/// Instances only exist for services with at least one observation, so
/// `total` is never zero inside a [`StatsSummary`]. Serialized output also
/// carries the derived `rate`, which is ignored on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NodeStats {
    pub total: u64,
    pub success: u64,
}

impl NodeStats {
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.success += 1;
        }
    }

    pub fn failures(&self) -> u64 {
        self.total.saturating_sub(self.success)
    }

    /// `success / total`, or `0.0` for an empty counter.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }

    pub fn merge(&mut self, other: &NodeStats) {
        self.total += other.total;
        self.success += other.success;
    }
}

impl Serialize for NodeStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NodeStats", 3)?;
        state.serialize_field("total", &self.total)?;
        state.serialize_field("success", &self.success)?;
        state.serialize_field("rate", &self.rate())?;
        state.end()
    }
}

/// Service → stats for one measurement window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsSummary {
    nodes: BTreeMap<ServiceNode, NodeStats>,
}

impl StatsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for `service`, or `None` when nothing was observed for it.
    pub fn get(&self, service: &str) -> Option<&NodeStats> {
        self.nodes.get(service)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceNode, &NodeStats)> {
        self.nodes.iter()
    }

    /// Total observations across every service.
    pub fn total_observations(&self) -> u64 {
        self.nodes.values().map(|s| s.total).sum()
    }

    /// Fold another partial summary into this one.
    ///
    /// Grouping is associative and commutative, so summaries built from
    /// disjoint slices of the same outcomes merge to the same result as one
    /// pass over all of them.
    pub fn merge(&mut self, other: StatsSummary) {
        for (service, stats) in other.nodes {
            self.nodes.entry(service).or_default().merge(&stats);
        }
    }
}

/// Group outcomes by service and count successes.
///
/// Services with no outcomes do not appear in the result. An outcome with a
/// blank service identifier is rejected.
pub fn summarize<'a, I>(outcomes: I) -> Result<StatsSummary, InvalidInputError>
where
    I: IntoIterator<Item = &'a TraceOutcome>,
{
    let mut summary = StatsSummary::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        if outcome.service.trim().is_empty() {
            return Err(InvalidInputError::EmptyService { index });
        }
        summary
            .nodes
            .entry(outcome.service.clone())
            .or_default()
            .record(outcome.success);
    }
    Ok(summary)
}
