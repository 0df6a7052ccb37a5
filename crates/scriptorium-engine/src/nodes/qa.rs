use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use scriptorium_core::error::Result;
use scriptorium_ledger::EntryType;

use super::{paid_failure, NodeEnv, NodeStep};
use crate::breaker::BreakerDecision;
use crate::context::display;
use crate::durable::PaidCall;
use crate::plan::EdgeCondition;
use crate::state::{BlockReason, ExecutionState};

/// The only response shape a QA call may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaVerdict {
    pub passed: bool,
    #[serde(default)]
    pub findings: Vec<String>,
}

/// Parse a verdict, tolerating markdown code fences around the JSON.
pub fn parse_verdict(response: &str) -> std::result::Result<QaVerdict, String> {
    serde_json::from_str::<QaVerdict>(extract_json(response))
        .map_err(|e| format!("QA response is not a verdict object: {}", e))
}

fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    trimmed
}

fn build_prompt(target_key: &str, content: &str, criteria: &[String]) -> String {
    let mut prompt = String::from("Review the content below against the acceptance criteria.\n\n");
    prompt.push_str("## Criteria\n\n");
    for criterion in criteria {
        prompt.push_str(&format!("- {}\n", criterion));
    }
    prompt.push_str(&format!("\n## {}\n\n{}\n\n", target_key, content));
    prompt.push_str(
        "Respond with JSON only: {\"passed\": true|false, \"findings\": [\"...\"]}",
    );
    prompt
}

/// Paid verdict on `target_key`. A pass routes forward; a failure bumps
/// the rework counter and routes to remediation until the breaker opens.
pub async fn run(
    env: &NodeEnv<'_>,
    state: &mut ExecutionState,
    target_key: &str,
    criteria: &[String],
    max_rework: u32,
) -> Result<NodeStep> {
    let node_id = env.node.id.as_str();
    let content = state
        .context
        .get(target_key)
        .map(display)
        .unwrap_or_default();

    let call = PaidCall::new(
        "qa",
        state.execution_id.as_str(),
        env.target(),
        build_prompt(target_key, &content, criteria),
    );
    let check = |text: &str| -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
        let verdict = parse_verdict(text)?;
        Ok(vec![(
            EntryType::ParseReport,
            json!({
                "valid": true,
                "passed": verdict.passed,
                "findings": verdict.findings,
            }),
        )])
    };

    let outcome = match env.runner.run(&call, &check).await {
        Ok(outcome) => outcome,
        Err(e) => return paid_failure(node_id, e),
    };
    let verdict = match parse_verdict(&outcome.text) {
        Ok(verdict) => verdict,
        Err(reason) => return Ok(NodeStep::Fail(reason)),
    };

    let breaker = state.breakers.entry(node_id.to_string()).or_default();
    if verdict.passed {
        breaker.on_pass();
        info!(execution_id = %state.execution_id, node_id, "QA passed");
        return Ok(NodeStep::Follow(EdgeCondition::QaPassed));
    }

    let rework = {
        let counter = state.rework.entry(node_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    };
    let breaker = state.breakers.entry(node_id.to_string()).or_default();
    match breaker.on_failure(rework, max_rework, Utc::now()) {
        BreakerDecision::Remediate => {
            info!(
                execution_id = %state.execution_id,
                node_id,
                rework,
                max_rework,
                "QA failed, routing to remediation"
            );
            state
                .context
                .set(format!("{}_findings", node_id), json!(verdict.findings));
            Ok(NodeStep::Follow(EdgeCondition::QaFailed))
        }
        BreakerDecision::Open => {
            warn!(
                execution_id = %state.execution_id,
                node_id,
                rework,
                "Rework bound exceeded, circuit breaker open"
            );
            Ok(NodeStep::Block(BlockReason::CircuitOpen {
                qa_node_id: node_id.to_string(),
                findings: verdict.findings,
            }))
        }
    }
}
