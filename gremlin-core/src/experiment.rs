//! Experiment identity, lifecycle states, and run-scoped state.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;
use crate::graph::UpstreamSet;
use crate::types::{ServiceNode, TimeWindow};

/// Correlation id shared by every trace query of one run.
///
/// Formatted as `<unix seconds>-<12 hex chars>`: sortable by start time, with a
/// random suffix so two runs started within the same second do not collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn generate() -> Self {
        let secs = Utc::now().timestamp();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", secs, &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExperimentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a single experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    Init,
    TargetSelected,
    GraphBuilt,
    UpstreamResolved,
    BaselineCaptured,
    FaultInjected,
    Waiting,
    ObservationCaptured,
    FaultCleaned,
    Done,
    Aborted,
}

impl ExperimentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExperimentState::Done | ExperimentState::Aborted)
    }

    /// The state that follows this one on the happy path.
    pub fn successor(self) -> Option<ExperimentState> {
        use ExperimentState::*;
        match self {
            Init => Some(TargetSelected),
            TargetSelected => Some(GraphBuilt),
            GraphBuilt => Some(UpstreamResolved),
            UpstreamResolved => Some(BaselineCaptured),
            BaselineCaptured => Some(FaultInjected),
            FaultInjected => Some(Waiting),
            Waiting => Some(ObservationCaptured),
            ObservationCaptured => Some(FaultCleaned),
            FaultCleaned => Some(Done),
            Done | Aborted => None,
        }
    }

    /// Whether `self -> to` is a legal move.
    ///
    /// Only the next happy-path state is reachable, plus `Aborted` from any
    /// non-terminal state.
    pub fn can_transition_to(self, to: ExperimentState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == ExperimentState::Aborted || self.successor() == Some(to)
    }
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentState::Init => write!(f, "init"),
            ExperimentState::TargetSelected => write!(f, "target selected"),
            ExperimentState::GraphBuilt => write!(f, "graph built"),
            ExperimentState::UpstreamResolved => write!(f, "upstream resolved"),
            ExperimentState::BaselineCaptured => write!(f, "baseline captured"),
            ExperimentState::FaultInjected => write!(f, "fault injected"),
            ExperimentState::Waiting => write!(f, "waiting"),
            ExperimentState::ObservationCaptured => write!(f, "observation captured"),
            ExperimentState::FaultCleaned => write!(f, "fault cleaned"),
            ExperimentState::Done => write!(f, "done"),
            ExperimentState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Run-scoped experiment state. Lives for one process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub state: ExperimentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ServiceNode>,
    #[serde(default)]
    pub upstream: UpstreamSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_window: Option<TimeWindow>,
}

impl Experiment {
    pub fn new(id: ExperimentId) -> Self {
        Self {
            id,
            state: ExperimentState::Init,
            target: None,
            upstream: UpstreamSet::new(),
            before_window: None,
            after_window: None,
        }
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn transition(&mut self, to: ExperimentState) -> Result<(), ExperimentError> {
        if !self.state.can_transition_to(to) {
            return Err(ExperimentError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
