//! Fault-target selection strategies.

use crate::config::SelectionPolicy;
use crate::error::ConfigError;
use crate::types::{ServiceNode, ServiceRecord};

/// Picks the service that will have a fault injected.
pub trait TargetSelector: Send + Sync {
    fn name(&self) -> &str;

    fn select(&self, records: &[ServiceRecord]) -> Result<ServiceNode, ConfigError>;
}

fn no_records() -> ConfigError {
    ConfigError::NoTarget {
        reason: "service source returned no records".into(),
    }
}

/// Uses the first record. Frequency sources are written most-called first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstRecordSelector;

impl TargetSelector for FirstRecordSelector {
    fn name(&self) -> &str {
        "first_record"
    }

    fn select(&self, records: &[ServiceRecord]) -> Result<ServiceNode, ConfigError> {
        records
            .first()
            .map(|r| r.service.clone())
            .ok_or_else(no_records)
    }
}

/// Uses the record with the highest `count`; ties go to the earlier record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostFrequentSelector;

impl TargetSelector for MostFrequentSelector {
    fn name(&self) -> &str {
        "most_frequent"
    }

    fn select(&self, records: &[ServiceRecord]) -> Result<ServiceNode, ConfigError> {
        if records.is_empty() {
            return Err(no_records());
        }
        let mut best: Option<(&ServiceRecord, u64)> = None;
        for record in records {
            let Some(count) = record.count else {
                continue;
            };
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((record, count));
            }
        }
        best.map(|(r, _)| r.service.clone())
            .ok_or_else(|| ConfigError::NoTarget {
                reason: "no service record carries a count".into(),
            })
    }
}

/// Always returns the configured service, regardless of the records.
#[derive(Debug, Clone)]
pub struct FixedTargetSelector {
    target: ServiceNode,
}

impl FixedTargetSelector {
    pub fn new(target: impl Into<ServiceNode>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl TargetSelector for FixedTargetSelector {
    fn name(&self) -> &str {
        "fixed"
    }

    fn select(&self, _records: &[ServiceRecord]) -> Result<ServiceNode, ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::NoTarget {
                reason: "fixed target is empty".into(),
            });
        }
        Ok(self.target.clone())
    }
}

/// The selector matching a configured policy.
pub fn selector_for(policy: SelectionPolicy) -> Box<dyn TargetSelector> {
    match policy {
        SelectionPolicy::FirstRecord => Box::new(FirstRecordSelector),
        SelectionPolicy::MostFrequent => Box::new(MostFrequentSelector),
    }
}
