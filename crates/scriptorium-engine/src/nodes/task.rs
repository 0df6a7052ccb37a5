use serde_json::json;
use tracing::info;

use scriptorium_core::error::Result;
use scriptorium_ledger::EntryType;

use super::{paid_failure, NodeEnv, NodeStep};
use crate::durable::PaidCall;
use crate::plan::EdgeCondition;
use crate::state::ExecutionState;

/// One paid generation. The output is stored under `output_key` and
/// described to the document mutation service as a `mutation_report`.
pub async fn run(
    env: &NodeEnv<'_>,
    state: &mut ExecutionState,
    prompt: &str,
    output_key: &str,
    input_keys: &[String],
) -> Result<NodeStep> {
    let node_id = env.node.id.as_str();
    let mut keys = input_keys.to_vec();
    // A remediation pass sees the findings that sent it here.
    for qa_edge in env.plan.outgoing(node_id).filter(|e| e.condition == EdgeCondition::Rework) {
        let findings_key = format!("{}_findings", qa_edge.to);
        if state.context.get(&findings_key).is_some() && !keys.contains(&findings_key) {
            keys.push(findings_key);
        }
    }
    let full_prompt = state.context.build_prompt(&keys, prompt);

    let call = PaidCall::new(
        "task",
        state.execution_id.as_str(),
        env.target(),
        full_prompt,
    );
    let report = |text: &str| -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
        Ok(vec![(
            EntryType::MutationReport,
            json!({
                "node_id": node_id,
                "output_key": output_key,
                "operation": "replace",
                "chars": text.chars().count(),
            }),
        )])
    };

    let outcome = match env.runner.run(&call, &report).await {
        Ok(outcome) => outcome,
        Err(e) => return paid_failure(node_id, e),
    };

    info!(
        execution_id = %state.execution_id,
        node_id,
        output_key,
        replayed = outcome.replayed,
        "Task output stored"
    );
    state.context.set_str(output_key, outcome.text);

    let route = env
        .plan
        .outgoing(node_id)
        .map(|e| e.condition.clone())
        .find(|c| matches!(c, EdgeCondition::Always | EdgeCondition::Rework))
        .unwrap_or(EdgeCondition::Always);
    Ok(NodeStep::Follow(route))
}
