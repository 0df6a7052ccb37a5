use scriptorium_core::outcome::GovernanceOutcome;

use super::NodeStep;
use crate::state::ExecutionState;

/// Resolve the governance outcome for a terminal node. An explicit choice
/// recorded at a gate is authoritative; the node's pinned outcome only
/// covers paths that never passed one.
pub fn resolve(pinned: Option<GovernanceOutcome>, state: &ExecutionState) -> NodeStep {
    match state.governance_outcome.or(pinned) {
        Some(governance) => NodeStep::Complete(governance),
        None => NodeStep::Fail(format!(
            "end node '{}' reached without a governance outcome",
            state.current_node_id
        )),
    }
}
