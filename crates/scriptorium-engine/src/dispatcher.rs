use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use scriptorium_core::traits::LlmProvider;
use scriptorium_core::types::{ErrorCode, LlmRequest, LlmResponse, ProviderError};

type CallResult = std::result::Result<LlmResponse, ProviderError>;

/// Bounded worker pool for provider calls.
///
/// Each call runs on its own spawned task once a permit is free, under a
/// timeout, and completes into a oneshot channel. The caller only awaits
/// the channel.
#[derive(Clone)]
pub struct LlmDispatcher {
    provider: Arc<dyn LlmProvider>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl LlmDispatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, workers: usize, timeout: Duration) -> Self {
        Self {
            provider,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Queue a call on the pool.
    pub fn dispatch(&self, request: LlmRequest) -> oneshot::Receiver<CallResult> {
        let (tx, rx) = oneshot::channel();
        let provider = Arc::clone(&self.provider);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    debug!(
                        provider = provider.name(),
                        operation = %request.operation,
                        target = %request.target,
                        "Dispatching provider call"
                    );
                    match tokio::time::timeout(timeout, provider.generate(request)).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(timeout_secs = timeout.as_secs(), "Provider call timed out");
                            Err(ProviderError::timeout(format!(
                                "no response within {}s",
                                timeout.as_secs()
                            )))
                        }
                    }
                }
                Err(_) => Err(ProviderError::new(ErrorCode::Unknown, "worker pool closed")),
            };
            // The caller may have gone away; the ledger still holds the attempt.
            let _ = tx.send(result);
        });

        rx
    }

    /// Dispatch and wait for the result.
    pub async fn call(&self, request: LlmRequest) -> CallResult {
        self.dispatch(request).await.unwrap_or_else(|_| {
            Err(ProviderError::new(
                ErrorCode::Unknown,
                "worker dropped the call",
            ))
        })
    }
}
