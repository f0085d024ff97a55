//! HTTP trace-query client.
//!
//! `GET {endpoint}/api/experiments/{id}/outcomes?phase=..&services=a,b&start=..&duration_secs=..`
//! answered with `{"outcomes": [{"service": "cart", "success": true}, ...]}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

use super::{TraceClient, check_status, http_client, transport_error};
use crate::config::ServiceEndpointConfig;
use crate::error::UpstreamServiceError;
use crate::experiment::ExperimentId;
use crate::types::{Phase, ServiceNode, TimeWindow, TraceOutcome};

const SERVICE: &str = "jaeger";

#[derive(Debug, Deserialize)]
struct OutcomesResponse {
    #[serde(default)]
    outcomes: Vec<TraceOutcome>,
}

/// Trace-query client for the experiment trace service.
pub struct JaegerTraceClient {
    base_url: Url,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl JaegerTraceClient {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self, UpstreamServiceError> {
        let base_url =
            Url::parse(&config.base_url()).map_err(|e| UpstreamServiceError::Transport {
                service: SERVICE.into(),
                message: format!("invalid endpoint '{}': {}", config.endpoint, e),
            })?;
        Ok(Self {
            base_url,
            timeout_secs: config.timeout_secs,
            http: http_client(SERVICE, config.timeout())?,
        })
    }

    fn outcomes_url(
        &self,
        experiment: &ExperimentId,
        phase: Phase,
        nodes: &BTreeSet<ServiceNode>,
        window: &TimeWindow,
    ) -> Result<Url, UpstreamServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamServiceError::Transport {
                service: SERVICE.into(),
                message: format!("endpoint cannot be a base URL: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["api", "experiments", experiment.as_str(), "outcomes"]);

        let services = nodes.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        url.query_pairs_mut()
            .append_pair("phase", &phase.to_string())
            .append_pair("services", &services)
            .append_pair("start", &window.start.to_rfc3339())
            .append_pair("duration_secs", &window.duration.as_secs().to_string());
        Ok(url)
    }
}

fn parse_outcomes(body: &str) -> Result<Vec<TraceOutcome>, UpstreamServiceError> {
    serde_json::from_str::<OutcomesResponse>(body)
        .map(|r| r.outcomes)
        .map_err(|e| UpstreamServiceError::ResponseParse {
            service: SERVICE.into(),
            message: e.to_string(),
        })
}

#[async_trait]
impl TraceClient for JaegerTraceClient {
    async fn query_outcomes(
        &self,
        experiment: &ExperimentId,
        phase: Phase,
        nodes: &BTreeSet<ServiceNode>,
        window: &TimeWindow,
    ) -> Result<Vec<TraceOutcome>, UpstreamServiceError> {
        let url = self.outcomes_url(experiment, phase, nodes, window)?;
        debug!(%url, %phase, nodes = nodes.len(), "Querying trace outcomes");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout_secs, e))?;
        let resp = check_status(SERVICE, resp).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout_secs, e))?;

        let outcomes = parse_outcomes(&body)?;
        debug!(%phase, outcomes = outcomes.len(), "Trace outcomes received");
        Ok(outcomes)
    }
}
