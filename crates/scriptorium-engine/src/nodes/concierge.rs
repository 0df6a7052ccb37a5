use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use scriptorium_core::error::Result;
use scriptorium_core::types::ExecutionStatus;
use scriptorium_ledger::EntryType;

use super::{paid_failure, NodeEnv, NodeStep};
use crate::durable::PaidCall;
use crate::state::{ExecutionState, TranscriptTurn};

/// A concierge waits for the caller. Turns come through `submit_input`,
/// and only `submit_option` moves the execution on.
pub fn enter() -> NodeStep {
    NodeStep::Pause(ExecutionStatus::AwaitingInput)
}

/// Ledger target of one turn: `node#visit/turn-n/<input digest>`.
///
/// The digest keeps a resubmitted turn with different text from replaying
/// the reply stored for the earlier text.
pub fn turn_target(node_target: &str, turn: usize, input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let short: String = format!("{:x}", digest).chars().take(12).collect();
    format!("{}/turn-{}/{}", node_target, turn, short)
}

fn build_prompt(base: &str, history: &[&TranscriptTurn], input: &str) -> String {
    let mut prompt = String::from(base);
    if !history.is_empty() {
        prompt.push_str("\n\n## Conversation so far\n\n");
        for turn in history {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.input, turn.reply));
        }
    }
    prompt.push_str(&format!("\n\nUser: {}", input));
    prompt
}

/// Run one paid conversational turn and append it to the transcript.
///
/// Returns `Ok(Err(step))` when the paid work could not finish and the
/// execution has to block or fail instead of replying.
pub async fn turn(
    env: &NodeEnv<'_>,
    state: &mut ExecutionState,
    prompt: &str,
    input: &str,
) -> Result<std::result::Result<String, NodeStep>> {
    let node_id = env.node.id.as_str();
    let history: Vec<&TranscriptTurn> = state.turns_at(node_id, env.visit).collect();
    let number = history.len() + 1;

    let call = PaidCall::new(
        "concierge_turn",
        state.execution_id.as_str(),
        turn_target(&env.target(), number, input),
        build_prompt(prompt, &history, input),
    );
    let accept = |_: &str| -> std::result::Result<Vec<(EntryType, serde_json::Value)>, String> {
        Ok(Vec::new())
    };

    let outcome = match env.runner.run(&call, &accept).await {
        Ok(outcome) => outcome,
        Err(e) => return paid_failure(node_id, e).map(Err),
    };

    info!(
        execution_id = %state.execution_id,
        node_id,
        turn = number,
        replayed = outcome.replayed,
        "Concierge turn answered"
    );
    state.transcript.push(TranscriptTurn {
        node_id: node_id.to_string(),
        visit: env.visit,
        input: input.to_string(),
        reply: outcome.text.clone(),
        timestamp: Utc::now(),
    });
    Ok(Ok(outcome.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_waits_for_input() {
        assert_eq!(enter(), NodeStep::Pause(ExecutionStatus::AwaitingInput));
    }

    #[test]
    fn test_prompt_carries_history() {
        let earlier = TranscriptTurn {
            node_id: "intake".into(),
            visit: 1,
            input: "A user guide".into(),
            reply: "Who is the audience?".into(),
            timestamp: Utc::now(),
        };
        let prompt = build_prompt("Gather the brief.", &[&earlier], "Operators");
        assert!(prompt.starts_with("Gather the brief."));
        assert!(prompt.contains("User: A user guide\nAssistant: Who is the audience?"));
        assert!(prompt.ends_with("User: Operators"));
    }

    #[test]
    fn test_turn_target_depends_on_input() {
        let first = turn_target("intake#1", 1, "A user guide");
        assert!(first.starts_with("intake#1/turn-1/"));
        assert_eq!(first, turn_target("intake#1", 1, "A user guide"));
        assert_ne!(first, turn_target("intake#1", 1, "An API reference"));
        assert_ne!(first, turn_target("intake#1", 2, "A user guide"));
    }

    #[test]
    fn test_first_turn_has_no_history_block() {
        let prompt = build_prompt("Gather the brief.", &[], "Hello");
        assert!(!prompt.contains("Conversation so far"));
    }
}
