//! HTTP fault-injection client.
//!
//! Activation is `POST {endpoint}/api/faults` with `{"service": ".."}`;
//! deactivation is `DELETE {endpoint}/api/faults/{service}`. A 404 on delete
//! means there is no fault to remove and counts as success.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::{FaultClient, check_status, http_client, transport_error};
use crate::config::ServiceEndpointConfig;
use crate::error::UpstreamServiceError;

const SERVICE: &str = "fault";

/// Fault-injection client for the mesh fault service.
pub struct HttpFaultClient {
    base_url: Url,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl HttpFaultClient {
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

    fn faults_url(&self, target: Option<&str>) -> Result<Url, UpstreamServiceError> {
        let mut url = self.base_url.clone();
        {
            let mut segments =
                url.path_segments_mut()
                    .map_err(|_| UpstreamServiceError::Transport {
                        service: SERVICE.into(),
                        message: format!("endpoint cannot be a base URL: {}", self.base_url),
                    })?;
            segments.pop_if_empty().extend(["api", "faults"]);
            if let Some(target) = target {
                segments.push(target);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl FaultClient for HttpFaultClient {
    async fn activate(&self, target: &str) -> Result<(), UpstreamServiceError> {
        let url = self.faults_url(None)?;
        debug!(%url, target, "Activating fault");
        let resp = self
            .http
            .post(url)
            .json(&json!({ "service": target }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout_secs, e))?;
        check_status(SERVICE, resp).await?;
        info!(target, "Fault activated");
        Ok(())
    }

    async fn deactivate(&self, target: &str) -> Result<(), UpstreamServiceError> {
        let url = self.faults_url(Some(target))?;
        debug!(%url, target, "Deactivating fault");
        let resp = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout_secs, e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            info!(target, "No active fault to remove");
            return Ok(());
        }
        check_status(SERVICE, resp).await?;
        info!(target, "Fault deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> HttpFaultClient {
        HttpFaultClient::new(&ServiceEndpointConfig {
            endpoint: endpoint.into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_activate_url() {
        let url = client("faults:5000").faults_url(None).unwrap();
        assert_eq!(url.as_str(), "http://faults:5000/api/faults");
    }

    #[test]
    fn test_deactivate_url_escapes_target() {
        let url = client("http://faults:5000").faults_url(Some("cart service")).unwrap();
        assert_eq!(url.as_str(), "http://faults:5000/api/faults/cart%20service");
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = HttpFaultClient::new(&ServiceEndpointConfig {
            endpoint: "http://".into(),
            timeout_secs: 5,
        });
        assert!(result.is_err());
    }
}
