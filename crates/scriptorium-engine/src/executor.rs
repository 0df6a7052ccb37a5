use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use scriptorium_core::config::{AppConfig, EngineConfig};
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::event::EventBus;
use scriptorium_core::traits::LlmProvider;
use scriptorium_core::types::{
    EngineEvent, ExecutionStatus, GovernanceEvent, Station, StationState,
};
use scriptorium_ledger::{LlmThread, RetryPolicy, SqliteLedger};

use crate::breaker::HalfOpenDenied;
use crate::context::ExecutionContext;
use crate::dispatcher::LlmDispatcher;
use crate::durable::DurableRunner;
use crate::nodes::{self, concierge, gate, NodeEnv, NodeStep};
use crate::plan::{EdgeCondition, NodeKind, PlanNode, WorkflowPlan};
use crate::state::{BlockReason, ExecutionState};
use crate::stations::{resolve_station, StationTracker};
use crate::store::ExecutionStore;

/// Everything the executor needs, built once and passed in. There is no
/// global plan or provider registry.
pub struct EngineContext {
    pub config: EngineConfig,
    pub store: Arc<ExecutionStore>,
    pub runner: DurableRunner,
    pub events: Arc<EventBus>,
}

impl EngineContext {
    pub fn new(
        config: &AppConfig,
        ledger: Arc<SqliteLedger>,
        store: Arc<ExecutionStore>,
        provider: Arc<dyn LlmProvider>,
        events: Arc<EventBus>,
    ) -> Self {
        let dispatcher = LlmDispatcher::new(
            provider,
            config.engine.workers,
            Duration::from_secs(config.engine.provider_timeout_secs),
        );
        let runner = DurableRunner::new(
            ledger,
            dispatcher,
            RetryPolicy::from_config(&config.ledger),
            events.clone(),
        );
        Self {
            config: config.engine.clone(),
            store,
            runner,
            events,
        }
    }

    /// Context over in-memory stores.
    pub fn in_memory(config: &AppConfig, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        Ok(Self::new(
            config,
            Arc::new(SqliteLedger::in_memory()?),
            Arc::new(ExecutionStore::in_memory()?),
            provider,
            Arc::new(EventBus::new(config.engine.event_capacity)),
        ))
    }
}

/// Result of `submit_option`.
#[derive(Debug, Clone)]
pub enum OptionOutcome {
    /// The option was taken and the execution advanced.
    Accepted(ExecutionState),
    /// Governance rejection. Nothing moved.
    Rejected { reason: String },
}

/// Result of `submit_input`.
#[derive(Debug, Clone)]
pub enum InputOutcome {
    Reply { reply: String, state: ExecutionState },
    /// Governance rejection. Nothing moved.
    Rejected { reason: String },
    /// The turn's paid work could not finish; the execution blocked or failed.
    Halted(ExecutionState),
}

/// Drives executions through their pinned plans.
///
/// Calls on one execution are serialized by a per-execution lock, and every
/// save is version-checked against the stored row.
pub struct PlanExecutor {
    ctx: EngineContext,
    locks: Arc<LockMap>,
}

type LockMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Held for the duration of one call on an execution. The map entry goes
/// away once no caller holds or waits for it.
struct ExecutionLock {
    locks: Arc<LockMap>,
    execution_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ExecutionLock {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.execution_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.execution_id);
        }
    }
}

impl PlanExecutor {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            locks: Arc::new(LockMap::default()),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.ctx.events
    }

    pub fn ledger(&self) -> &Arc<SqliteLedger> {
        self.ctx.runner.ledger()
    }

    /// Validate `plan`, pin it into a new execution and announce its
    /// stations. No node runs until `advance`.
    pub async fn start_execution(
        &self,
        plan: WorkflowPlan,
        context: ExecutionContext,
    ) -> Result<ExecutionState> {
        plan.validate()?;

        let state = ExecutionState::new(&plan, context);
        self.ctx.store.insert(&plan, &state)?;

        let tracker = StationTracker::new(&plan);
        let id = state.execution_id.to_string();
        for event in tracker.start(&id, &plan.entry_node) {
            self.ctx.events.publish(event);
        }
        self.publish_status(&state);

        info!(
            execution_id = %id,
            plan_id = %plan.id,
            entry_node = %plan.entry_node,
            nodes = plan.nodes.len(),
            "Execution started"
        );
        Ok(state)
    }

    /// Run nodes until the execution pauses, blocks or finishes. Any status
    /// other than `running` is returned unchanged.
    pub async fn advance(&self, execution_id: &str) -> Result<ExecutionState> {
        let _guard = self.lock(execution_id).await;
        let (plan, mut state) = self.ctx.store.load(execution_id)?;
        self.drive(&plan, &mut state).await?;
        Ok(state)
    }

    /// Take one of the declared options of the gate or concierge the
    /// execution is waiting at, then advance.
    pub async fn submit_option(&self, execution_id: &str, option_id: &str) -> Result<OptionOutcome> {
        let _guard = self.lock(execution_id).await;
        let (plan, mut state) = self.ctx.store.load(execution_id)?;
        let node = current_node(&plan, &state)?;

        if !state.status.is_paused() || node.kind.options().is_none() {
            let reason = self.reject(
                &state,
                "option_outside_choice",
                format!(
                    "option '{}' submitted while {} at {} node '{}'",
                    option_id,
                    state.status,
                    node.kind.name(),
                    node.id
                ),
            )?;
            return Ok(OptionOutcome::Rejected { reason });
        }

        let Some(option) = gate::find_option(node, option_id) else {
            let reason = self.reject(
                &state,
                "unknown_option",
                format!(
                    "'{}' is not one of [{}]",
                    option_id,
                    gate::option_ids(node).join(", ")
                ),
            )?;
            return Ok(OptionOutcome::Rejected { reason });
        };
        let target = gate::option_target(&plan, &node.id, option_id).ok_or_else(|| {
            ScriptoriumError::MalformedPlan {
                violations: vec![format!(
                    "node '{}' has no edge for option '{}'",
                    node.id, option_id
                )],
            }
        })?;

        if let Some(governance) = option.governance() {
            state.governance_outcome = Some(governance);
        }
        info!(
            execution_id = %execution_id,
            node_id = %node.id,
            option_id,
            governance = ?state.governance_outcome,
            "Option accepted"
        );

        let tracker = StationTracker::new(&plan);
        let from = node.id.clone();
        state.enter_node(target);
        state.status = ExecutionStatus::Running;
        let mut events = tracker.transition(execution_id, &from, target);
        events.push(status_event(&state));
        self.ctx.store.save(&mut state)?;
        self.publish_all(events);

        self.drive(&plan, &mut state).await?;
        Ok(OptionOutcome::Accepted(state))
    }

    /// One free-text turn at a concierge. Free text anywhere else is a
    /// governance rejection and changes nothing.
    pub async fn submit_input(&self, execution_id: &str, text: &str) -> Result<InputOutcome> {
        let _guard = self.lock(execution_id).await;
        let (plan, mut state) = self.ctx.store.load(execution_id)?;
        let node = current_node(&plan, &state)?;

        let prompt = match &node.kind {
            NodeKind::Concierge { prompt, .. } if state.status == ExecutionStatus::AwaitingInput => {
                prompt
            }
            _ => {
                let reason = self.reject(
                    &state,
                    "free_text_input",
                    format!(
                        "free text submitted while {} at {} node '{}': {}",
                        state.status,
                        node.kind.name(),
                        node.id,
                        text
                    ),
                )?;
                return Ok(InputOutcome::Rejected { reason });
            }
        };

        let env = self.env(&plan, node, &state);
        match concierge::turn(&env, &mut state, prompt, text).await? {
            Ok(reply) => {
                self.ctx.store.save(&mut state)?;
                Ok(InputOutcome::Reply { reply, state })
            }
            Err(step) => {
                let tracker = StationTracker::new(&plan);
                let events = self.apply(&plan, &tracker, &mut state, step)?;
                self.ctx.store.save(&mut state)?;
                self.publish_all(events);
                Ok(InputOutcome::Halted(state))
            }
        }
    }

    /// Half-open recovery for an execution blocked by an open breaker: once
    /// the cool-down has passed, route one more time through remediation.
    pub async fn retry_blocked(&self, execution_id: &str) -> Result<ExecutionState> {
        let _guard = self.lock(execution_id).await;
        let (plan, mut state) = self.ctx.store.load(execution_id)?;

        let qa_node_id = match (&state.status, &state.blocked) {
            (ExecutionStatus::Blocked, Some(BlockReason::CircuitOpen { qa_node_id, .. })) => {
                qa_node_id.clone()
            }
            _ => return Err(not_blocked(&state)),
        };

        let cooldown = chrono::Duration::seconds(self.ctx.config.breaker_cooldown_secs as i64);
        let max_trials = self.ctx.config.half_open_max_trials;
        let breaker = state.breakers.entry(qa_node_id.clone()).or_default();
        match breaker.try_half_open(Utc::now(), cooldown, max_trials) {
            Ok(()) => {}
            Err(HalfOpenDenied::NotOpen) => return Err(not_blocked(&state)),
            Err(HalfOpenDenied::CoolingDown { retry_after_secs }) => {
                return Err(ScriptoriumError::CircuitOpen {
                    execution_id: execution_id.to_string(),
                    retry_after_secs,
                })
            }
            Err(HalfOpenDenied::Exhausted) => {
                warn!(
                    execution_id = %execution_id,
                    qa_node_id = %qa_node_id,
                    max_trials,
                    "Half-open trials exhausted, escalating"
                );
                return Err(ScriptoriumError::Escalated(execution_id.to_string()));
            }
        }

        let remediation = plan
            .follow(&qa_node_id, &EdgeCondition::QaFailed)
            .map(|e| e.to.clone())
            .ok_or_else(|| ScriptoriumError::MalformedPlan {
                violations: vec![format!("QA node '{}' has no qa_failed edge", qa_node_id)],
            })?;

        info!(
            execution_id = %execution_id,
            qa_node_id = %qa_node_id,
            remediation = %remediation,
            "Circuit breaker half-open, retrying remediation"
        );
        state.blocked = None;
        state.status = ExecutionStatus::Running;
        state.enter_node(&remediation);

        let tracker = StationTracker::new(&plan);
        let mut events: Vec<EngineEvent> = tracker
            .settle(execution_id, &remediation, StationState::Active)
            .into_iter()
            .collect();
        events.push(status_event(&state));
        self.ctx.store.save(&mut state)?;
        self.publish_all(events);

        self.drive(&plan, &mut state).await?;
        Ok(state)
    }

    pub fn get_execution(&self, execution_id: &str) -> Result<ExecutionState> {
        self.ctx.store.load_state(execution_id)
    }

    pub fn governance_log(&self, execution_id: &str) -> Result<Vec<GovernanceEvent>> {
        self.ctx.store.governance_log(execution_id)
    }

    pub fn list_active_threads(&self, scope: &str) -> Result<Vec<LlmThread>> {
        self.ledger().list_active_threads(scope)
    }

    /// Declared stations of the execution's plan, in display order.
    pub fn stations(&self, execution_id: &str) -> Result<Vec<Station>> {
        let (plan, _) = self.ctx.store.load(execution_id)?;
        Ok(StationTracker::new(&plan).declared().to_vec())
    }

    /// Station of the current node, resolved through internal nodes.
    pub fn current_station(&self, execution_id: &str) -> Result<Option<Station>> {
        let (plan, state) = self.ctx.store.load(execution_id)?;
        Ok(resolve_station(&plan, &state.current_node_id))
    }

    async fn lock(&self, execution_id: &str) -> ExecutionLock {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(execution_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        ExecutionLock {
            locks: self.locks.clone(),
            execution_id: execution_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn env<'a>(&'a self, plan: &'a WorkflowPlan, node: &'a PlanNode, state: &ExecutionState) -> NodeEnv<'a> {
        NodeEnv {
            plan,
            node,
            runner: &self.ctx.runner,
            config: &self.ctx.config,
            visit: state.current_visit(&node.id),
        }
    }

    /// Step loop. Each step is saved before its events go out; a `Locked`
    /// paid call leaves the execution exactly where it was.
    async fn drive(&self, plan: &WorkflowPlan, state: &mut ExecutionState) -> Result<()> {
        let tracker = StationTracker::new(plan);
        let max_steps = self.ctx.config.max_steps_per_advance;

        for _ in 0..max_steps {
            if state.status != ExecutionStatus::Running {
                return Ok(());
            }
            let node = current_node(plan, state)?;
            let env = self.env(plan, node, state);
            debug!(
                execution_id = %state.execution_id,
                node_id = %node.id,
                kind = node.kind.name(),
                visit = env.visit,
                "Running node"
            );

            let step = nodes::run_node(&env, state).await?;
            let events = self.apply(plan, &tracker, state, step)?;
            self.ctx.store.save(state)?;
            self.publish_all(events);
        }

        if state.status == ExecutionStatus::Running {
            warn!(execution_id = %state.execution_id, max_steps, "Advance hit the step bound");
            return Err(ScriptoriumError::MaxStepsExceeded(max_steps));
        }
        Ok(())
    }

    /// Apply a node's step to the state and collect the events it causes.
    fn apply(
        &self,
        plan: &WorkflowPlan,
        tracker: &StationTracker,
        state: &mut ExecutionState,
        step: NodeStep,
    ) -> Result<Vec<EngineEvent>> {
        let execution_id = state.execution_id.to_string();
        let node_id = state.current_node_id.clone();
        let mut events = Vec::new();

        match step {
            NodeStep::Follow(condition) => {
                let edge = plan.follow(&node_id, &condition).ok_or_else(|| {
                    ScriptoriumError::MalformedPlan {
                        violations: vec![format!(
                            "node '{}' has no outgoing {:?} edge",
                            node_id, condition
                        )],
                    }
                })?;
                debug!(execution_id = %execution_id, from = %node_id, to = %edge.to, "Following edge");
                state.enter_node(&edge.to);
                events.extend(tracker.transition(&execution_id, &node_id, &edge.to));
            }
            NodeStep::Pause(status) => {
                info!(execution_id = %execution_id, node_id = %node_id, status = %status, "Execution paused");
                state.status = status;
                events.push(status_event(state));
            }
            NodeStep::Block(reason) => {
                warn!(execution_id = %execution_id, node_id = %node_id, reason = ?reason, "Execution blocked");
                state.status = ExecutionStatus::Blocked;
                state.blocked = Some(reason);
                events.extend(tracker.settle(&execution_id, &node_id, StationState::Blocked));
                events.push(status_event(state));
            }
            NodeStep::Fail(reason) => {
                error!(execution_id = %execution_id, node_id = %node_id, reason = %reason, "Execution failed");
                state.status = ExecutionStatus::Failed;
                state.failure = Some(reason);
                events.extend(tracker.settle(&execution_id, &node_id, StationState::Blocked));
                events.push(status_event(state));
            }
            NodeStep::Complete(governance) => {
                let terminal = governance.terminal();
                info!(
                    execution_id = %execution_id,
                    node_id = %node_id,
                    governance = %governance,
                    terminal = %terminal,
                    "Execution completed"
                );
                state.status = ExecutionStatus::Completed;
                state.governance_outcome = Some(governance);
                state.terminal_outcome = Some(terminal);
                events.extend(tracker.settle(&execution_id, &node_id, StationState::Complete));
                events.push(status_event(state));
                events.push(EngineEvent::ExecutionCompleted {
                    execution_id,
                    governance_outcome: governance,
                    terminal_outcome: terminal,
                });
            }
        }
        Ok(events)
    }

    /// Log, persist and announce a governance rejection. The state is not
    /// saved, so its version does not move.
    fn reject(&self, state: &ExecutionState, kind: &str, detail: String) -> Result<String> {
        warn!(
            execution_id = %state.execution_id,
            node_id = %state.current_node_id,
            kind,
            detail = %detail,
            "Governance rejection"
        );
        self.ctx.store.record_governance(&GovernanceEvent {
            execution_id: state.execution_id.to_string(),
            node_id: state.current_node_id.clone(),
            kind: kind.to_string(),
            detail: detail.clone(),
            timestamp: Utc::now(),
        })?;
        self.ctx.events.publish(EngineEvent::GovernanceRejected {
            execution_id: state.execution_id.to_string(),
            node_id: state.current_node_id.clone(),
            reason: detail.clone(),
        });
        Ok(detail)
    }

    fn publish_status(&self, state: &ExecutionState) {
        self.ctx.events.publish(status_event(state));
    }

    fn publish_all(&self, events: Vec<EngineEvent>) {
        for event in events {
            self.ctx.events.publish(event);
        }
    }
}

fn current_node<'a>(plan: &'a WorkflowPlan, state: &ExecutionState) -> Result<&'a PlanNode> {
    plan.node(&state.current_node_id)
        .ok_or_else(|| ScriptoriumError::MalformedPlan {
            violations: vec![format!("unknown current node '{}'", state.current_node_id)],
        })
}

fn status_event(state: &ExecutionState) -> EngineEvent {
    EngineEvent::ExecutionStatusChanged {
        execution_id: state.execution_id.to_string(),
        node_id: state.current_node_id.clone(),
        status: state.status,
    }
}

fn not_blocked(state: &ExecutionState) -> ScriptoriumError {
    ScriptoriumError::NotBlocked {
        execution_id: state.execution_id.to_string(),
        status: state.status.to_string(),
    }
}
