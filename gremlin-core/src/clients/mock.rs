//! In-memory clients for tests and dry runs.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use super::{FaultClient, TraceClient};
use crate::error::UpstreamServiceError;
use crate::experiment::ExperimentId;
use crate::types::{Phase, ServiceNode, TimeWindow, TraceOutcome};

/// A recorded trace query.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceQuery {
    pub experiment: ExperimentId,
    pub phase: Phase,
    pub nodes: BTreeSet<ServiceNode>,
    pub window: TimeWindow,
}

/// Trace client serving canned outcomes per phase.
///
/// Like a real backend, a query only returns outcomes for the services it
/// asked about.
#[derive(Default)]
pub struct MockTraceClient {
    outcomes: Mutex<HashMap<Phase, Vec<TraceOutcome>>>,
    failing: Mutex<HashMap<Phase, String>>,
    queries: Mutex<Vec<TraceQuery>>,
}

impl MockTraceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `outcomes` for queries in `phase`.
    pub fn with_outcomes(self, phase: Phase, outcomes: Vec<TraceOutcome>) -> Self {
        self.outcomes.lock().unwrap().insert(phase, outcomes);
        self
    }

    /// Fail every query in `phase` with a transport error.
    pub fn failing(self, phase: Phase, message: &str) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(phase, message.to_string());
        self
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<TraceQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TraceClient for MockTraceClient {
    async fn query_outcomes(
        &self,
        experiment: &ExperimentId,
        phase: Phase,
        nodes: &BTreeSet<ServiceNode>,
        window: &TimeWindow,
    ) -> Result<Vec<TraceOutcome>, UpstreamServiceError> {
        self.queries.lock().unwrap().push(TraceQuery {
            experiment: experiment.clone(),
            phase,
            nodes: nodes.clone(),
            window: *window,
        });

        if let Some(message) = self.failing.lock().unwrap().get(&phase) {
            return Err(UpstreamServiceError::Transport {
                service: "mock-trace".into(),
                message: message.clone(),
            });
        }

        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .get(&phase)
            .map(|all| {
                all.iter()
                    .filter(|o| nodes.contains(&o.service))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// A recorded fault-service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCall {
    Activate(ServiceNode),
    Deactivate(ServiceNode),
}

/// Fault client that tracks which targets are faulted.
#[derive(Default)]
pub struct MockFaultClient {
    calls: Mutex<Vec<FaultCall>>,
    active: Mutex<HashSet<ServiceNode>>,
    fail_activate: Option<String>,
    fail_deactivate: Option<String>,
}

impl MockFaultClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_activate(mut self, message: &str) -> Self {
        self.fail_activate = Some(message.to_string());
        self
    }

    pub fn failing_deactivate(mut self, message: &str) -> Self {
        self.fail_deactivate = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FaultCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether a fault is currently active on `target`.
    pub fn is_active(&self, target: &str) -> bool {
        self.active.lock().unwrap().contains(target)
    }

    fn failure(message: &str) -> UpstreamServiceError {
        UpstreamServiceError::Transport {
            service: "mock-fault".into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl FaultClient for MockFaultClient {
    async fn activate(&self, target: &str) -> Result<(), UpstreamServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(FaultCall::Activate(target.to_string()));
        if let Some(message) = &self.fail_activate {
            return Err(Self::failure(message));
        }
        self.active.lock().unwrap().insert(target.to_string());
        Ok(())
    }

    async fn deactivate(&self, target: &str) -> Result<(), UpstreamServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(FaultCall::Deactivate(target.to_string()));
        if let Some(message) = &self.fail_deactivate {
            return Err(Self::failure(message));
        }
        self.active.lock().unwrap().remove(target);
        Ok(())
    }
}
