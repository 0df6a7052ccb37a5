//! Node executors, one module per node kind.
//!
//! Dispatch is an exhaustive `match` over `NodeKind`; there is no runtime
//! registry. Executors never move the execution themselves: they return a
//! `NodeStep` and the plan executor applies it.

pub mod concierge;
pub mod end;
pub mod gate;
pub mod qa;
pub mod task;

use scriptorium_core::config::EngineConfig;
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::outcome::GovernanceOutcome;
use scriptorium_core::types::ExecutionStatus;

use crate::durable::DurableRunner;
use crate::plan::{EdgeCondition, NodeKind, PlanNode, WorkflowPlan};
use crate::state::{BlockReason, ExecutionState};

/// Everything a node executor may use. Built per step by the executor.
pub struct NodeEnv<'a> {
    pub plan: &'a WorkflowPlan,
    pub node: &'a PlanNode,
    pub runner: &'a DurableRunner,
    pub config: &'a EngineConfig,
    /// Visit number of this run of the node.
    pub visit: u32,
}

impl NodeEnv<'_> {
    /// Ledger target for paid work of this visit.
    pub fn target(&self) -> String {
        format!("{}#{}", self.node.id, self.visit)
    }
}

/// What the executor does after a node ran.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeStep {
    /// Take the outgoing edge with this condition.
    Follow(EdgeCondition),
    Pause(ExecutionStatus),
    Block(BlockReason),
    Fail(String),
    Complete(GovernanceOutcome),
}

pub async fn run_node(env: &NodeEnv<'_>, state: &mut ExecutionState) -> Result<NodeStep> {
    match &env.node.kind {
        NodeKind::Concierge { .. } => Ok(concierge::enter()),
        NodeKind::Task {
            prompt,
            output_key,
            input_keys,
        } => task::run(env, state, prompt, output_key, input_keys).await,
        NodeKind::Qa {
            target_key,
            criteria,
            max_rework,
        } => {
            let max_rework = max_rework.unwrap_or(env.config.max_rework);
            qa::run(env, state, target_key, criteria, max_rework).await
        }
        NodeKind::Gate { .. } => Ok(gate::enter()),
        NodeKind::End { governance } => Ok(end::resolve(*governance, state)),
    }
}

/// Turn a failed paid call into a step. Lock contention is not a step:
/// it propagates so the execution stays exactly where it is.
pub(crate) fn paid_failure(node_id: &str, err: ScriptoriumError) -> Result<NodeStep> {
    match err {
        ScriptoriumError::DeadLetter { code, attempts, .. } => {
            Ok(NodeStep::Block(BlockReason::DeadLetter {
                node_id: node_id.to_string(),
                code,
                attempts,
            }))
        }
        ScriptoriumError::Cancelled(_) => Ok(NodeStep::Block(BlockReason::Cancelled {
            node_id: node_id.to_string(),
        })),
        ScriptoriumError::WorkFailed { code, message, .. } => Ok(NodeStep::Fail(format!(
            "node '{}' failed with {}: {}",
            node_id, code, message
        ))),
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_core::types::ErrorCode;

    #[test]
    fn test_paid_failure_mapping() {
        let dead = ScriptoriumError::DeadLetter {
            work_item_id: "w".into(),
            code: ErrorCode::ProviderRateLimit,
            attempts: 3,
        };
        assert!(matches!(
            paid_failure("draft", dead).unwrap(),
            NodeStep::Block(BlockReason::DeadLetter { attempts: 3, .. })
        ));

        let invalid = ScriptoriumError::WorkFailed {
            work_item_id: "w".into(),
            code: ErrorCode::SchemaInvalid,
            message: "bad".into(),
        };
        assert!(matches!(paid_failure("review", invalid).unwrap(), NodeStep::Fail(_)));

        let locked = ScriptoriumError::Locked("busy".into());
        assert!(matches!(
            paid_failure("draft", locked),
            Err(ScriptoriumError::Locked(_))
        ));
    }
}
