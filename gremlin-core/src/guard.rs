//! Scoped ownership of an active fault.
//!
//! A [`FaultGuard`] exists only after `activate` succeeded and carries the
//! obligation to deactivate. The normal path is [`FaultGuard::release`]. If the
//! guard is dropped unreleased (panic, cancelled future, early return) the
//! `Drop` impl spawns the deactivation on the current tokio runtime.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::FaultClient;
use crate::error::UpstreamServiceError;
use crate::types::ServiceNode;

/// An activated fault that must be removed.
pub struct FaultGuard {
    client: Arc<dyn FaultClient>,
    target: ServiceNode,
    released: bool,
}

impl FaultGuard {
    /// Activate a fault on `target`. No guard is returned if activation fails.
    pub async fn acquire(
        client: Arc<dyn FaultClient>,
        target: &str,
    ) -> Result<Self, UpstreamServiceError> {
        client.activate(target).await?;
        Ok(Self {
            client,
            target: target.to_string(),
            released: false,
        })
    }

    /// Deactivate the fault, consuming the guard.
    ///
    /// The deactivate call is made exactly once here and not retried on error.
    /// If this future is dropped before the call returns, the guard's `Drop`
    /// issues it again.
    pub async fn release(mut self) -> Result<(), UpstreamServiceError> {
        let result = self.client.deactivate(&self.target).await;
        self.released = true;
        result
    }
}

impl std::fmt::Debug for FaultGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultGuard")
            .field("target", &self.target)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let target = std::mem::take(&mut self.target);
        warn!(target = %target, "Fault guard dropped without release; deactivating in background");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = Arc::clone(&self.client);
                handle.spawn(async move {
                    match client.deactivate(&target).await {
                        Ok(()) => info!(target = %target, "Background fault cleanup succeeded"),
                        Err(e) => error!(
                            target = %target,
                            error = %e,
                            "Background fault cleanup failed; fault may still be active"
                        ),
                    }
                });
            }
            Err(_) => error!(
                target = %target,
                "No async runtime available for fault cleanup; fault may still be active"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{FaultCall, MockFaultClient};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    async fn wait_for_calls(client: &MockFaultClient, n: usize) {
        for _ in 0..100 {
            if client.calls().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_release_deactivates_once() {
        let client = Arc::new(MockFaultClient::new());
        let guard = FaultGuard::acquire(client.clone(), "cart").await.unwrap();
        assert!(client.is_active("cart"));
        assert_eq!(format!("{guard:?}"), r#"FaultGuard { target: "cart", released: false }"#);

        assert_ok!(guard.release().await);
        // Give any stray background task a chance to run
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            client.calls(),
            vec![
                FaultCall::Activate("cart".into()),
                FaultCall::Deactivate("cart".into())
            ]
        );
        assert!(!client.is_active("cart"));
    }

    #[tokio::test]
    async fn test_failed_activation_yields_no_guard() {
        let client = Arc::new(MockFaultClient::new().failing_activate("refused"));
        assert_err!(FaultGuard::acquire(client.clone(), "cart").await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.calls(), vec![FaultCall::Activate("cart".into())]);
    }

    #[tokio::test]
    async fn test_drop_without_release_cleans_up() {
        let client = Arc::new(MockFaultClient::new());
        {
            let _guard = FaultGuard::acquire(client.clone(), "payment").await.unwrap();
        }
        wait_for_calls(&client, 2).await;
        assert_eq!(client.calls()[1], FaultCall::Deactivate("payment".into()));
        assert!(!client.is_active("payment"));
    }

    #[tokio::test]
    async fn test_release_error_is_returned_not_retried() {
        let client = Arc::new(MockFaultClient::new().failing_deactivate("timeout"));
        let guard = FaultGuard::acquire(client.clone(), "cart").await.unwrap();
        assert_err!(guard.release().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.calls().len(), 2);
    }
}
