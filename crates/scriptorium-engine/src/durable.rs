use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::event::EventBus;
use scriptorium_core::types::{
    EngineEvent, ErrorCode, LlmRequest, ThreadStatus, WorkItemStatus,
};
use scriptorium_ledger::{
    EntryType, LlmThread, RetryPolicy, SqliteLedger, ThreadSpec, WorkItem, WorkOutcome,
};

use crate::dispatcher::LlmDispatcher;

/// Reports to append before a response is applied, or the reason the
/// response is structurally invalid.
pub type ResponseCheck<'a> =
    &'a (dyn Fn(&str) -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> + Send + Sync);

/// One paid request, keyed by `(operation, scope, target)`.
#[derive(Debug, Clone)]
pub struct PaidCall {
    pub operation: String,
    pub scope: String,
    pub target: String,
    pub prompt: String,
}

impl PaidCall {
    pub fn new(
        operation: impl Into<String>,
        scope: impl Into<String>,
        target: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            scope: scope.into(),
            target: target.into(),
            prompt: prompt.into(),
        }
    }

    fn spec(&self) -> ThreadSpec {
        ThreadSpec::new(&self.operation, &self.scope, &self.target)
    }

    fn request(&self) -> LlmRequest {
        LlmRequest {
            operation: self.operation.clone(),
            scope: self.scope.clone(),
            target: self.target.clone(),
            prompt: self.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaidOutcome {
    pub thread_id: String,
    pub work_item_id: Option<String>,
    pub text: String,
    /// The response came from the ledger; no provider call was made.
    pub replayed: bool,
}

/// Runs paid work through the ledger: at most one provider call per
/// semantic intent, every step recorded, retries bounded.
pub struct DurableRunner {
    ledger: Arc<SqliteLedger>,
    dispatcher: LlmDispatcher,
    policy: RetryPolicy,
    events: Arc<EventBus>,
}

impl DurableRunner {
    pub fn new(
        ledger: Arc<SqliteLedger>,
        dispatcher: LlmDispatcher,
        policy: RetryPolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            policy,
            events,
        }
    }

    pub fn ledger(&self) -> &Arc<SqliteLedger> {
        &self.ledger
    }

    /// Execute `call`, or replay its applied response.
    ///
    /// `check` validates the response text. Its reports are recorded before
    /// the item is applied; an `Err` settles the item as `SCHEMA_INVALID`.
    pub async fn run(&self, call: &PaidCall, check: ResponseCheck<'_>) -> Result<PaidOutcome> {
        let spec = call.spec();
        let key = spec.idempotency_key();

        if let Some(entry) = self.ledger.applied_response(&key)? {
            let text = entry.payload["text"].as_str().unwrap_or_default().to_string();
            check(&text).map_err(|message| ScriptoriumError::WorkFailed {
                work_item_id: entry.work_item_id.clone().unwrap_or_default(),
                code: ErrorCode::SchemaInvalid,
                message,
            })?;
            info!(target = %call.target, operation = %call.operation, "Replaying applied response");
            return Ok(PaidOutcome {
                thread_id: entry.thread_id,
                work_item_id: entry.work_item_id,
                text,
                replayed: true,
            });
        }

        let (thread, created) = self.ledger.get_or_create_thread(&spec, false)?;
        if created {
            self.publish_thread(&thread, ThreadStatus::Open);
        }

        let mut item = self.next_item(&thread)?;
        loop {
            let Some(claimed) = self.ledger.claim(&item.id)? else {
                let current = self.ledger.get_thread(&thread.id)?;
                if current.cancel_requested {
                    return Err(ScriptoriumError::Cancelled(thread.id.clone()));
                }
                return Err(ScriptoriumError::Locked(format!(
                    "work item {} is owned by another caller",
                    item.id
                )));
            };
            self.publish_item(&claimed);
            self.publish_thread(&thread, ThreadStatus::Running);

            let running = self.ledger.start(&claimed.id)?;
            self.publish_item(&running);
            self.ledger.record(
                &thread.id,
                Some(&running.id),
                EntryType::Prompt,
                &json!({
                    "operation": call.operation,
                    "target": call.target,
                    "attempt": running.attempt,
                    "prompt": call.prompt,
                }),
            )?;

            match self.dispatcher.call(call.request()).await {
                Ok(response) => {
                    self.ledger.record(
                        &thread.id,
                        Some(&running.id),
                        EntryType::Response,
                        &json!({ "text": response.text }),
                    )?;
                    return self.settle_response(&thread, &running, response.text, check);
                }
                Err(error) => {
                    self.ledger.record(
                        &thread.id,
                        Some(&running.id),
                        EntryType::Error,
                        &json!({
                            "code": error.code,
                            "message": error.message,
                            "attempt": running.attempt,
                        }),
                    )?;
                    let failed = self
                        .ledger
                        .complete(&running.id, WorkOutcome::Failed(error.code))?;
                    self.publish_item(&failed);

                    let current = self.ledger.get_thread(&thread.id)?;
                    if current.status == ThreadStatus::Cancelled {
                        self.publish_thread(&current, ThreadStatus::Cancelled);
                        return Err(ScriptoriumError::Cancelled(thread.id.clone()));
                    }
                    if !error.code.is_retryable() {
                        self.publish_thread(&current, current.status);
                        return Err(ScriptoriumError::WorkFailed {
                            work_item_id: failed.id,
                            code: error.code,
                            message: error.message,
                        });
                    }

                    let next = self.ledger.requeue(&failed.id, self.policy.max_attempts)?;
                    self.publish_item(&next);
                    if next.status == WorkItemStatus::DeadLetter {
                        self.publish_thread(&thread, ThreadStatus::Failed);
                        return Err(ScriptoriumError::DeadLetter {
                            work_item_id: next.id,
                            code: error.code,
                            attempts: next.attempt,
                        });
                    }

                    let backoff = self.policy.backoff(failed.attempt);
                    warn!(
                        work_item_id = %next.id,
                        code = %error.code,
                        attempt = next.attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retryable provider failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    item = next;
                }
            }
        }
    }

    /// Pick the work item to claim for an active thread.
    fn next_item(&self, thread: &LlmThread) -> Result<WorkItem> {
        match self.ledger.latest_work_item(&thread.id)? {
            Some(item) if item.status.is_in_flight() => Err(ScriptoriumError::Locked(format!(
                "work item {} is {}",
                item.id, item.status
            ))),
            Some(item) if item.status == WorkItemStatus::Queued => {
                debug!(work_item_id = %item.id, "Reusing queued work item");
                Ok(item)
            }
            Some(item) if item.status == WorkItemStatus::Failed => {
                // Settled as a retryable failure but never requeued.
                let next = self.ledger.requeue(&item.id, self.policy.max_attempts)?;
                self.publish_item(&next);
                if next.status == WorkItemStatus::DeadLetter {
                    self.publish_thread(thread, ThreadStatus::Failed);
                    return Err(ScriptoriumError::DeadLetter {
                        work_item_id: next.id,
                        code: next.error_code.unwrap_or(ErrorCode::Unknown),
                        attempts: next.attempt,
                    });
                }
                Ok(next)
            }
            _ => {
                let item = self.ledger.enqueue_work(&thread.id)?;
                self.publish_item(&item);
                Ok(item)
            }
        }
    }

    fn settle_response(
        &self,
        thread: &LlmThread,
        item: &WorkItem,
        text: String,
        check: ResponseCheck<'_>,
    ) -> Result<PaidOutcome> {
        match check(&text) {
            Ok(reports) => {
                for (entry_type, payload) in reports {
                    self.ledger
                        .record(&thread.id, Some(&item.id), entry_type, &payload)?;
                }
                let applied = self.ledger.complete(&item.id, WorkOutcome::Applied)?;
                self.publish_item(&applied);
                self.publish_thread(thread, ThreadStatus::Completed);
                Ok(PaidOutcome {
                    thread_id: thread.id.clone(),
                    work_item_id: Some(applied.id),
                    text,
                    replayed: false,
                })
            }
            Err(reason) => {
                self.ledger.record(
                    &thread.id,
                    Some(&item.id),
                    EntryType::ParseReport,
                    &json!({ "valid": false, "reason": reason }),
                )?;
                self.ledger.record(
                    &thread.id,
                    Some(&item.id),
                    EntryType::Error,
                    &json!({ "code": ErrorCode::SchemaInvalid, "message": reason }),
                )?;
                let failed = self
                    .ledger
                    .complete(&item.id, WorkOutcome::Failed(ErrorCode::SchemaInvalid))?;
                self.publish_item(&failed);
                self.publish_thread(thread, ThreadStatus::Failed);
                warn!(work_item_id = %failed.id, reason = %reason, "Response failed validation");
                Err(ScriptoriumError::WorkFailed {
                    work_item_id: failed.id,
                    code: ErrorCode::SchemaInvalid,
                    message: reason,
                })
            }
        }
    }

    fn publish_thread(&self, thread: &LlmThread, status: ThreadStatus) {
        self.events.publish(EngineEvent::ThreadStatusChanged {
            thread_id: thread.id.clone(),
            scope: thread.scope.clone(),
            status,
        });
    }

    fn publish_item(&self, item: &WorkItem) {
        self.events.publish(EngineEvent::WorkItemStatusChanged {
            work_item_id: item.id.clone(),
            thread_id: item.thread_id.clone(),
            status: item.status,
            attempt: item.attempt,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::BoxFuture;

    use super::*;
    use scriptorium_core::traits::LlmProvider;
    use scriptorium_core::types::{LlmResponse, ProviderError};

    /// Answers from a fixed queue and counts calls.
    struct Queue {
        replies: Mutex<VecDeque<std::result::Result<LlmResponse, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl LlmProvider for Queue {
        fn name(&self) -> &str {
            "queue"
        }

        fn generate(
            &self,
            _request: LlmRequest,
        ) -> BoxFuture<'_, std::result::Result<LlmResponse, ProviderError>> {
            Box::pin(async move {
                *self.calls.lock().unwrap() += 1;
                self.replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(ProviderError::new(ErrorCode::Unknown, "no reply")))
            })
        }
    }

    fn runner(
        replies: Vec<std::result::Result<LlmResponse, ProviderError>>,
    ) -> (DurableRunner, Arc<Queue>) {
        let provider = Arc::new(Queue {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        });
        let dispatcher = LlmDispatcher::new(provider.clone(), 2, Duration::from_secs(5));
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let runner = DurableRunner::new(
            Arc::new(SqliteLedger::in_memory().unwrap()),
            dispatcher,
            policy,
            Arc::new(EventBus::default()),
        );
        (runner, provider)
    }

    fn accept(_: &str) -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
        Ok(vec![])
    }

    fn call() -> PaidCall {
        PaidCall::new("task", "exec-1", "draft#1", "Write the draft")
    }

    #[tokio::test]
    async fn test_run_records_prompt_and_response() {
        let (runner, provider) = runner(vec![Ok(LlmResponse::new("draft text"))]);
        let outcome = runner.run(&call(), &accept).await.unwrap();
        assert_eq!(outcome.text, "draft text");
        assert!(!outcome.replayed);
        assert_eq!(*provider.calls.lock().unwrap(), 1);

        let entries = runner.ledger().entries(&outcome.thread_id).unwrap();
        let types: Vec<EntryType> = entries.iter().map(|e| e.entry_type).collect();
        assert_eq!(types, vec![EntryType::Prompt, EntryType::Response]);
        let thread = runner.ledger().get_thread(&outcome.thread_id).unwrap();
        assert_eq!(thread.status, ThreadStatus::Completed);
    }

    #[tokio::test]
    async fn test_applied_response_is_replayed() {
        let (runner, provider) = runner(vec![Ok(LlmResponse::new("once"))]);
        let first = runner.run(&call(), &accept).await.unwrap();
        let second = runner.run(&call(), &accept).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.text, "once");
        assert_eq!(second.thread_id, first.thread_id);
        assert_eq!(*provider.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let (runner, provider) = runner(vec![
            Err(ProviderError::rate_limited("slow down")),
            Err(ProviderError::timeout("late")),
            Ok(LlmResponse::new("third time")),
        ]);
        let outcome = runner.run(&call(), &accept).await.unwrap();
        assert_eq!(outcome.text, "third time");
        assert_eq!(*provider.calls.lock().unwrap(), 3);

        let items = runner.ledger().work_items(&outcome.thread_id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attempt, 3);
        assert_eq!(items[0].status, WorkItemStatus::Applied);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let (runner, _) = runner(vec![
            Err(ProviderError::timeout("1")),
            Err(ProviderError::timeout("2")),
            Err(ProviderError::timeout("3")),
        ]);
        let err = runner.run(&call(), &accept).await.unwrap_err();
        assert!(matches!(
            err,
            ScriptoriumError::DeadLetter { code: ErrorCode::ProviderTimeout, attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_schema_invalid_is_terminal() {
        let (runner, provider) = runner(vec![Ok(LlmResponse::new("not json"))]);
        let reject = |_: &str| -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
            Err("expected a JSON verdict".into())
        };
        let err = runner.run(&call(), &reject).await.unwrap_err();
        assert!(matches!(
            err,
            ScriptoriumError::WorkFailed { code: ErrorCode::SchemaInvalid, .. }
        ));
        assert_eq!(*provider.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_item_is_locked() {
        let (runner, provider) = runner(vec![Ok(LlmResponse::new("never"))]);
        let (thread, _) = runner
            .ledger()
            .get_or_create_thread(&call().spec(), false)
            .unwrap();
        let item = runner.ledger().enqueue_work(&thread.id).unwrap();
        runner.ledger().claim(&item.id).unwrap().unwrap();

        let err = runner.run(&call(), &accept).await.unwrap_err();
        assert!(matches!(err, ScriptoriumError::Locked(_)));
        assert_eq!(*provider.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reports_recorded_before_apply() {
        let (runner, _) = runner(vec![Ok(LlmResponse::new("body"))]);
        let report = |text: &str| -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
            Ok(vec![(EntryType::MutationReport, json!({"chars": text.len()}))])
        };
        let outcome = runner.run(&call(), &report).await.unwrap();
        let entries = runner.ledger().entries(&outcome.thread_id).unwrap();
        assert_eq!(entries.last().unwrap().entry_type, EntryType::MutationReport);
        assert_eq!(entries.last().unwrap().payload["chars"], 4);
    }
}
