//! Clients for the two external services an experiment talks to.
//!
//! - [`TraceClient`]: reads recorded call outcomes for a set of services
//! - [`FaultClient`]: turns a fault on or off for one service
//!
//! [`JaegerTraceClient`] and [`HttpFaultClient`] speak JSON over HTTP;
//! [`MockTraceClient`] and [`MockFaultClient`] record calls in memory.

pub mod fault;
pub mod jaeger;
pub mod mock;

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::UpstreamServiceError;
use crate::experiment::ExperimentId;
use crate::types::{Phase, ServiceNode, TimeWindow, TraceOutcome};

pub use fault::HttpFaultClient;
pub use jaeger::JaegerTraceClient;
pub use mock::{FaultCall, MockFaultClient, MockTraceClient, TraceQuery};

/// Source of recorded call outcomes.
#[async_trait]
pub trait TraceClient: Send + Sync {
    /// All outcomes attributed to `nodes` inside `window`.
    async fn query_outcomes(
        &self,
        experiment: &ExperimentId,
        phase: Phase,
        nodes: &BTreeSet<ServiceNode>,
        window: &TimeWindow,
    ) -> Result<Vec<TraceOutcome>, UpstreamServiceError>;
}

/// Fault-injection control.
///
/// `activate` and `deactivate` are independent requests of intent: either may
/// be called without the other having happened first.
#[async_trait]
pub trait FaultClient: Send + Sync {
    async fn activate(&self, target: &str) -> Result<(), UpstreamServiceError>;

    async fn deactivate(&self, target: &str) -> Result<(), UpstreamServiceError>;
}

/// Map a `reqwest` failure onto the upstream error taxonomy.
pub(crate) fn transport_error(
    service: &str,
    timeout_secs: u64,
    err: reqwest::Error,
) -> UpstreamServiceError {
    if err.is_timeout() {
        UpstreamServiceError::Timeout {
            service: service.to_string(),
            timeout_secs,
        }
    } else {
        UpstreamServiceError::Transport {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

/// Build a `reqwest` client with the given per-request timeout.
pub(crate) fn http_client(
    service: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, UpstreamServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gremlin/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpstreamServiceError::Transport {
            service: service.to_string(),
            message: format!("HTTP client error: {}", e),
        })
}

/// Turn a non-success response into a `Status` error, keeping a short body excerpt.
pub(crate) async fn check_status(
    service: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, UpstreamServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamServiceError::Status {
        service: service.to_string(),
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}
