//! The experiment controller: one run from target selection to fault cleanup.
//!
//! The controller walks the [`ExperimentState`] machine in order. Every step
//! after target selection may fail; a failure moves the run to `Aborted` and
//! is returned as an [`ExperimentAborted`] carrying whatever was measured so
//! far. Once the fault is active it is held by a [`FaultGuard`], and the guard
//! is released before the controller returns on every path, including
//! observation failure and cancellation. A panic while the fault is active is
//! caught long enough to release the guard and then resumed.

use futures::FutureExt;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::callback::ExperimentCallback;
use crate::clients::{FaultClient, TraceClient};
use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::experiment::{Experiment, ExperimentId, ExperimentState};
use crate::graph::{DependencyGraph, UpstreamSet, resolve_transitive_upstream};
use crate::guard::FaultGuard;
use crate::selection::{TargetSelector, selector_for};
use crate::sources::{EdgeSource, ServiceSource};
use crate::stats::{StatsSummary, summarize};
use crate::types::{Phase, ServiceNode, TimeWindow};

/// The external systems one experiment talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub edges: Arc<dyn EdgeSource>,
    pub services: Arc<dyn ServiceSource>,
    pub traces: Arc<dyn TraceClient>,
    pub faults: Arc<dyn FaultClient>,
}

/// Result of a completed experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: ExperimentId,
    pub target: ServiceNode,
    pub upstream: UpstreamSet,
    pub before: StatsSummary,
    pub after: StatsSummary,
    pub before_window: TimeWindow,
    pub after_window: TimeWindow,
}

/// What happened to the fault when a run aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The fault was never activated.
    NotRequired,
    Deactivated,
    /// Deactivation was attempted and failed. The fault may still be active.
    Failed(String),
}

impl std::fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupOutcome::NotRequired => write!(f, "not required"),
            CleanupOutcome::Deactivated => write!(f, "fault deactivated"),
            CleanupOutcome::Failed(message) => write!(f, "deactivation failed: {message}"),
        }
    }
}

/// Everything measured before an abort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ServiceNode>,
    #[serde(default)]
    pub upstream: UpstreamSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<StatsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<StatsSummary>,
}

/// A run that ended in `Aborted`.
#[derive(Debug, thiserror::Error)]
#[error("Experiment {experiment_id} aborted at '{phase}': {error}")]
pub struct ExperimentAborted {
    pub experiment_id: ExperimentId,
    /// The step that failed, named by the state it was trying to reach.
    pub phase: ExperimentState,
    #[source]
    pub error: ExperimentError,
    pub cleanup: CleanupOutcome,
    pub partial: PartialResults,
}

/// Target and upstream set, resolved without touching the trace or fault
/// services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub target: ServiceNode,
    pub upstream: UpstreamSet,
    /// True when nothing calls the target.
    pub isolated: bool,
    /// False when the target appears in no edge at all.
    pub in_mesh: bool,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// Resolve the target and its upstream set. Used for dry runs.
pub async fn plan(
    edges: &dyn EdgeSource,
    services: &dyn ServiceSource,
    selector: &dyn TargetSelector,
    include_target_when_isolated: bool,
) -> Result<ExperimentPlan, ExperimentError> {
    let target = select_target(services, selector).await?;
    let graph = load_graph(edges).await?;
    let (upstream, isolated) = upstream_for(&graph, &target, include_target_when_isolated);
    Ok(ExperimentPlan {
        in_mesh: graph.contains(&target),
        target,
        upstream,
        isolated,
        graph_nodes: graph.node_count(),
        graph_edges: graph.edge_count(),
    })
}

async fn select_target(
    services: &dyn ServiceSource,
    selector: &dyn TargetSelector,
) -> Result<ServiceNode, ExperimentError> {
    let records = services.load_services().await?;
    let target = selector.select(&records)?;
    debug!(selector = selector.name(), records = records.len(), %target, "Target selected");
    Ok(target)
}

async fn load_graph(edges: &dyn EdgeSource) -> Result<DependencyGraph, ExperimentError> {
    let edges = edges.load_edges().await?;
    let graph = DependencyGraph::build(&edges);
    debug!(
        edges = edges.len(),
        nodes = graph.node_count(),
        distinct_edges = graph.edge_count(),
        "Dependency graph built"
    );
    Ok(graph)
}

/// Upstream set of `target`, plus whether the target had no callers at all.
fn upstream_for(
    graph: &DependencyGraph,
    target: &str,
    include_target_when_isolated: bool,
) -> (UpstreamSet, bool) {
    let mut upstream = resolve_transitive_upstream(graph, target);
    let isolated = upstream.is_empty();
    if isolated && include_target_when_isolated {
        upstream.insert(target.to_string());
    }
    (upstream, isolated)
}

struct StepFailure {
    step: ExperimentState,
    error: ExperimentError,
}

fn at(step: ExperimentState) -> impl FnOnce(ExperimentError) -> StepFailure {
    move |error| StepFailure { step, error }
}

/// Runs a single experiment.
pub struct ExperimentController {
    config: ExperimentConfig,
    collaborators: Collaborators,
    selector: Arc<dyn TargetSelector>,
    callback: Arc<dyn ExperimentCallback>,
    cancellation: CancellationToken,
    experiment: Experiment,
}

impl ExperimentController {
    pub fn new(
        config: ExperimentConfig,
        collaborators: Collaborators,
        callback: Arc<dyn ExperimentCallback>,
    ) -> Self {
        let selector: Arc<dyn TargetSelector> = Arc::from(selector_for(config.selection));
        Self {
            config,
            collaborators,
            selector,
            callback,
            cancellation: CancellationToken::new(),
            experiment: Experiment::new(ExperimentId::generate()),
        }
    }

    /// Replace the configured selection policy.
    pub fn with_selector(mut self, selector: Arc<dyn TargetSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_id(mut self, id: ExperimentId) -> Self {
        self.experiment = Experiment::new(id);
        self
    }

    pub fn id(&self) -> &ExperimentId {
        &self.experiment.id
    }

    /// Run the experiment to `Done` or `Aborted`.
    pub async fn run(mut self) -> Result<ExperimentReport, ExperimentAborted> {
        info!(experiment_id = %self.experiment.id, "Starting experiment");
        let mut partial = PartialResults::default();
        let mut cleanup = CleanupOutcome::NotRequired;

        match self.execute(&mut partial, &mut cleanup).await {
            Ok(report) => {
                info!(
                    experiment_id = %report.experiment_id,
                    target = %report.target,
                    upstream = report.upstream.len(),
                    "Experiment complete"
                );
                Ok(report)
            }
            Err(StepFailure { step, error }) => {
                warn!(
                    experiment_id = %self.experiment.id,
                    phase = %step,
                    error = %error,
                    cleanup = %cleanup,
                    "Experiment aborted"
                );
                if self.experiment.transition(ExperimentState::Aborted).is_ok() {
                    self.callback
                        .on_state_change(&self.experiment.id, ExperimentState::Aborted)
                        .await;
                }
                Err(ExperimentAborted {
                    experiment_id: self.experiment.id.clone(),
                    phase: step,
                    error,
                    cleanup,
                    partial,
                })
            }
        }
    }

    async fn execute(
        &mut self,
        partial: &mut PartialResults,
        cleanup: &mut CleanupOutcome,
    ) -> Result<ExperimentReport, StepFailure> {
        use ExperimentState::*;

        let target = select_target(
            self.collaborators.services.as_ref(),
            self.selector.as_ref(),
        )
        .await
        .map_err(at(TargetSelected))?;
        self.experiment.target = Some(target.clone());
        partial.target = Some(target.clone());
        self.advance(TargetSelected).await?;

        let graph = load_graph(self.collaborators.edges.as_ref())
            .await
            .map_err(at(GraphBuilt))?;
        self.advance(GraphBuilt).await?;
        if !graph.contains(&target) {
            self.warn(&format!("'{target}' does not appear in the edge data"))
                .await;
        }

        let (upstream, isolated) =
            upstream_for(&graph, &target, self.config.include_target_when_isolated);
        if isolated {
            let message = if self.config.include_target_when_isolated {
                format!("No service calls '{target}'; measuring the target itself")
            } else {
                format!("No service calls '{target}'; trace windows will be empty")
            };
            self.warn(&message).await;
        }
        info!(
            experiment_id = %self.experiment.id,
            target = %target,
            nodes = upstream.len(),
            "Upstream set resolved"
        );
        self.experiment.upstream = upstream.clone();
        partial.upstream = upstream.clone();
        self.advance(UpstreamResolved).await?;

        let before_window = TimeWindow::trailing(self.config.window());
        self.experiment.before_window = Some(before_window);
        let before = self
            .capture(Phase::Before, &upstream, &before_window)
            .await
            .map_err(at(BaselineCaptured))?;
        partial.before = Some(before.clone());
        self.advance(BaselineCaptured).await?;

        if self.cancellation.is_cancelled() {
            return Err(StepFailure {
                step: FaultInjected,
                error: ExperimentError::Cancelled,
            });
        }
        let guard = FaultGuard::acquire(Arc::clone(&self.collaborators.faults), &target)
            .await
            .map_err(|e| StepFailure {
                step: FaultInjected,
                error: e.into(),
            })?;
        info!(experiment_id = %self.experiment.id, target = %target, "Fault injected");

        // Nothing between here and `release` may skip the release, panics included.
        let observed = AssertUnwindSafe(async {
            self.advance(FaultInjected).await?;
            self.observe(&upstream).await
        })
        .catch_unwind()
        .await;

        let released = guard.release().await;
        *cleanup = match &released {
            Ok(()) => CleanupOutcome::Deactivated,
            Err(e) => CleanupOutcome::Failed(e.to_string()),
        };
        let observed = match observed {
            Ok(observed) => observed,
            Err(panic) => {
                error!(
                    experiment_id = %self.experiment.id,
                    target = %target,
                    cleanup = %cleanup,
                    "Experiment panicked while the fault was active"
                );
                std::panic::resume_unwind(panic);
            }
        };
        let (after, after_window) = observed?;
        partial.after = Some(after.clone());
        released.map_err(|e| StepFailure {
            step: FaultCleaned,
            error: e.into(),
        })?;
        self.advance(FaultCleaned).await?;
        self.advance(Done).await?;

        Ok(ExperimentReport {
            experiment_id: self.experiment.id.clone(),
            target,
            upstream,
            before,
            after,
            before_window,
            after_window,
        })
    }

    /// `FaultInjected -> Waiting -> ObservationCaptured`.
    async fn observe(
        &mut self,
        upstream: &UpstreamSet,
    ) -> Result<(StatsSummary, TimeWindow), StepFailure> {
        use ExperimentState::*;

        self.advance(Waiting).await?;
        debug!(
            experiment_id = %self.experiment.id,
            secs = self.config.observation_secs,
            "Waiting for fault to take effect"
        );
        tokio::select! {
            _ = tokio::time::sleep(self.config.observation()) => {}
            _ = self.cancellation.cancelled() => {
                return Err(StepFailure { step: Waiting, error: ExperimentError::Cancelled });
            }
        }

        let after_window = TimeWindow::trailing(self.config.window());
        self.experiment.after_window = Some(after_window);
        let after = self
            .capture(Phase::After, upstream, &after_window)
            .await
            .map_err(at(ObservationCaptured))?;
        self.advance(ObservationCaptured).await?;
        Ok((after, after_window))
    }

    /// Query and summarize one window.
    async fn capture(
        &self,
        phase: Phase,
        nodes: &UpstreamSet,
        window: &TimeWindow,
    ) -> Result<StatsSummary, ExperimentError> {
        let id = &self.experiment.id;
        if nodes.is_empty() {
            debug!(experiment_id = %id, %phase, "No services to query");
            let summary = StatsSummary::new();
            self.callback.on_summary(id, phase, &summary).await;
            return Ok(summary);
        }

        let traces = self.collaborators.traces.as_ref();
        let summary = if self.config.parallel_queries {
            let queries = nodes.iter().map(|node| async move {
                let single = BTreeSet::from([node.clone()]);
                let outcomes = traces.query_outcomes(id, phase, &single, window).await?;
                Ok::<_, ExperimentError>(summarize(&outcomes)?)
            });
            let mut merged = StatsSummary::new();
            for part in try_join_all(queries).await? {
                merged.merge(part);
            }
            merged
        } else {
            let outcomes = traces.query_outcomes(id, phase, nodes, window).await?;
            summarize(&outcomes)?
        };

        self.callback.on_summary(id, phase, &summary).await;
        Ok(summary)
    }

    async fn advance(&mut self, to: ExperimentState) -> Result<(), StepFailure> {
        self.experiment.transition(to).map_err(at(to))?;
        self.callback.on_state_change(&self.experiment.id, to).await;
        Ok(())
    }

    async fn warn(&self, message: &str) {
        warn!(experiment_id = %self.experiment.id, "{}", message);
        self.callback.on_warning(&self.experiment.id, message).await;
    }
}
