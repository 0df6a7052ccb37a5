use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use scriptorium_core::traits::LlmProvider;
use scriptorium_core::types::{ErrorCode, LlmRequest, LlmResponse, ProviderError};

type Scripted = Result<String, ProviderError>;

/// A provider that answers from per-target scripts.
///
/// Scripts are keyed by a target prefix (`"review#"` matches every visit of
/// `review`, `"review#2"` only the second). The first prefix with a queued
/// answer wins. Every request is recorded.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    fallback: Option<String>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer unscripted requests with `text` instead of failing them.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn reply(self, target_prefix: &str, text: impl Into<String>) -> Self {
        self.push(target_prefix, Ok(text.into()));
        self
    }

    pub fn fail(self, target_prefix: &str, error: ProviderError) -> Self {
        self.push(target_prefix, Err(error));
        self
    }

    fn push(&self, target_prefix: &str, answer: Scripted) {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.iter_mut().find(|(p, _)| p == target_prefix) {
            Some((_, queue)) => queue.push_back(answer),
            None => scripts.push((target_prefix.to_string(), VecDeque::from([answer]))),
        }
    }

    /// Every request seen so far, oldest first.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests whose target starts with `target_prefix`.
    pub fn call_count(&self, target_prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target.starts_with(target_prefix))
            .count()
    }

    fn answer(&self, request: &LlmRequest) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        let queued = scripts
            .iter_mut()
            .find(|(prefix, queue)| request.target.starts_with(prefix.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        match (queued, &self.fallback) {
            (Some(answer), _) => answer,
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err(ProviderError::new(
                ErrorCode::Unknown,
                format!("no scripted response for {}", request.target),
            )),
        }
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        request: LlmRequest,
    ) -> BoxFuture<'_, Result<LlmResponse, ProviderError>> {
        Box::pin(async move {
            let answer = self.answer(&request);
            self.calls.lock().unwrap().push(request);
            answer.map(LlmResponse::new)
        })
    }
}
