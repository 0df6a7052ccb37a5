//! Plan Executor.
//!
//! Drives one execution through an immutable node graph, one node at a
//! time. Paid nodes go through the durable ledger via [`DurableRunner`];
//! gates only move on an explicit, declared option. Every step is saved
//! with an optimistic version check before its events are published.

pub mod breaker;
pub mod context;
pub mod dispatcher;
pub mod durable;
pub mod executor;
pub mod nodes;
pub mod plan;
pub mod state;
pub mod stations;
pub mod store;

pub use breaker::{BreakerState, CircuitBreaker};
pub use context::ExecutionContext;
pub use dispatcher::LlmDispatcher;
pub use durable::{DurableRunner, PaidCall, PaidOutcome};
pub use executor::{EngineContext, InputOutcome, OptionOutcome, PlanExecutor};
pub use plan::{
    validate_plan, EdgeCondition, GateOption, NodeKind, PlanEdge, PlanNode, PlanViolation,
    WorkflowPlan,
};
pub use state::{BlockReason, ExecutionState, TranscriptTurn};
pub use stations::{resolve_station, StationTracker};
pub use store::ExecutionStore;
