use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{EngineEvent, LlmRequest, LlmResponse, ProviderError};

/// Provider-agnostic LLM generation, injected by the host.
pub trait LlmProvider: Send + Sync + 'static {
    /// Provider name, used in logs only.
    fn name(&self) -> &str;

    /// Run one generation. Failures must be classified with an `ErrorCode`
    /// so the ledger can decide whether to retry.
    fn generate(
        &self,
        request: LlmRequest,
    ) -> BoxFuture<'_, std::result::Result<LlmResponse, ProviderError>>;
}

/// Push delivery of engine events to a UI layer.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: EngineEvent) -> BoxFuture<'_, Result<()>>;
}
