//! Fundamental types shared across the experiment core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of a microservice in the mesh. Case-sensitive, compared by value.
pub type ServiceNode = String;

/// A directed call edge: `start` calls `end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub start: ServiceNode,
    pub end: ServiceNode,
}

impl Edge {
    pub fn new(start: impl Into<ServiceNode>, end: impl Into<ServiceNode>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// One row of the service-frequency source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service: ServiceNode,
    /// Observed call count, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ServiceRecord {
    pub fn new(service: impl Into<ServiceNode>) -> Self {
        Self {
            service: service.into(),
            count: None,
        }
    }

    pub fn with_count(service: impl Into<ServiceNode>, count: u64) -> Self {
        Self {
            service: service.into(),
            count: Some(count),
        }
    }
}

/// One recorded call attributed to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceOutcome {
    pub service: ServiceNode,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl TraceOutcome {
    pub fn success(service: impl Into<ServiceNode>) -> Self {
        Self {
            service: service.into(),
            success: true,
            operation: None,
        }
    }

    pub fn failure(service: impl Into<ServiceNode>) -> Self {
        Self {
            service: service.into(),
            success: false,
            operation: None,
        }
    }
}

/// Which measurement window a trace query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Before => write!(f, "before"),
            Phase::After => write!(f, "after"),
        }
    }
}

/// A half-open measurement interval `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub duration: Duration,
}

impl TimeWindow {
    /// The window of length `duration` that ends at `end`.
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Self {
        let span = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self {
            start: end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            duration,
        }
    }

    /// The window of length `duration` that ends now.
    pub fn trailing(duration: Duration) -> Self {
        Self::ending_at(Utc::now(), duration)
    }

    pub fn end(&self) -> DateTime<Utc> {
        let span = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::MAX);
        self.start.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
