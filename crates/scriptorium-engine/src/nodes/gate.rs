use scriptorium_core::types::ExecutionStatus;

use super::NodeStep;
use crate::plan::{EdgeCondition, GateOption, PlanNode, WorkflowPlan};

/// Gates never call an LLM; they wait for `submit_option`.
pub fn enter() -> NodeStep {
    NodeStep::Pause(ExecutionStatus::AwaitingChoice)
}

/// The declared option with this id, if the node offers choices.
pub fn find_option<'a>(node: &'a PlanNode, option_id: &str) -> Option<&'a GateOption> {
    node.kind
        .options()
        .and_then(|options| options.iter().find(|o| o.id == option_id))
}

/// Option ids in declaration order, for rejection messages.
pub fn option_ids(node: &PlanNode) -> Vec<String> {
    node.kind
        .options()
        .map(|options| options.iter().map(|o| o.id.clone()).collect())
        .unwrap_or_default()
}

/// Target of the edge bound to `option_id`.
pub fn option_target<'a>(plan: &'a WorkflowPlan, node_id: &str, option_id: &str) -> Option<&'a str> {
    let condition = EdgeCondition::Option {
        option_id: option_id.to_string(),
    };
    plan.follow(node_id, &condition).map(|e| e.to.as_str())
}
