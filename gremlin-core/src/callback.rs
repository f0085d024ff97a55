//! Diagnostics sink for experiment progress.
//!
//! The controller reports through an [`ExperimentCallback`] handed to it at
//! construction instead of writing to process-wide state. The CLI renders
//! these events for the operator; tests record them.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::experiment::{ExperimentId, ExperimentState};
use crate::stats::StatsSummary;
use crate::types::Phase;

/// Receives experiment lifecycle events.
#[async_trait]
pub trait ExperimentCallback: Send + Sync {
    /// The controller entered `state`.
    async fn on_state_change(&self, experiment: &ExperimentId, state: ExperimentState);

    /// A before/after summary has been computed.
    async fn on_summary(&self, experiment: &ExperimentId, phase: Phase, summary: &StatsSummary);

    /// Something worth the operator's attention that does not stop the run.
    async fn on_warning(&self, _experiment: &ExperimentId, _message: &str) {}
}

/// Discards every event.
pub struct NoOpCallback;

#[async_trait]
impl ExperimentCallback for NoOpCallback {
    async fn on_state_change(&self, _experiment: &ExperimentId, _state: ExperimentState) {}
    async fn on_summary(&self, _experiment: &ExperimentId, _phase: Phase, _summary: &StatsSummary) {
    }
}

/// Forwards events to `tracing`.
pub struct TracingCallback;

#[async_trait]
impl ExperimentCallback for TracingCallback {
    async fn on_state_change(&self, experiment: &ExperimentId, state: ExperimentState) {
        info!(experiment_id = %experiment, %state, "Experiment state changed");
    }

    async fn on_summary(&self, experiment: &ExperimentId, phase: Phase, summary: &StatsSummary) {
        info!(
            experiment_id = %experiment,
            %phase,
            services = summary.len(),
            observations = summary.total_observations(),
            "Trace summary captured"
        );
    }

    async fn on_warning(&self, experiment: &ExperimentId, message: &str) {
        warn!(experiment_id = %experiment, "{}", message);
    }
}

/// A callback that records all events for test assertions.
#[derive(Default)]
pub struct RecordingCallback {
    states: tokio::sync::Mutex<Vec<ExperimentState>>,
    summaries: tokio::sync::Mutex<Vec<(Phase, StatsSummary)>>,
    warnings: tokio::sync::Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn states(&self) -> Vec<ExperimentState> {
        self.states.lock().await.clone()
    }

    pub async fn summaries(&self) -> Vec<(Phase, StatsSummary)> {
        self.summaries.lock().await.clone()
    }

    pub async fn warnings(&self) -> Vec<String> {
        self.warnings.lock().await.clone()
    }
}

#[async_trait]
impl ExperimentCallback for RecordingCallback {
    async fn on_state_change(&self, _experiment: &ExperimentId, state: ExperimentState) {
        self.states.lock().await.push(state);
    }

    async fn on_summary(&self, _experiment: &ExperimentId, phase: Phase, summary: &StatsSummary) {
        self.summaries.lock().await.push((phase, summary.clone()));
    }

    async fn on_warning(&self, _experiment: &ExperimentId, message: &str) {
        self.warnings.lock().await.push(message.to_string());
    }
}
