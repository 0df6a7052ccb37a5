use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scriptorium_core::outcome::{GovernanceOutcome, TerminalOutcome};
use scriptorium_core::types::{ErrorCode, ExecutionId, ExecutionStatus};

use crate::breaker::CircuitBreaker;
use crate::context::ExecutionContext;
use crate::plan::WorkflowPlan;

/// Why an execution is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// Rework bound exceeded at a QA node.
    CircuitOpen {
        qa_node_id: String,
        findings: Vec<String>,
    },
    /// Paid work exhausted its attempts.
    DeadLetter {
        node_id: String,
        code: ErrorCode,
        attempts: u32,
    },
    /// The node's thread was cancelled while its work was in flight.
    Cancelled { node_id: String },
}

/// One concierge exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub node_id: String,
    pub visit: u32,
    pub input: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

/// One run of a plan. Mutated only by the plan executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: ExecutionId,
    pub plan_id: String,
    pub current_node_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub context: ExecutionContext,
    /// Entries per node. The current visit number keys paid work.
    #[serde(default)]
    pub visits: BTreeMap<String, u32>,
    /// QA failures per QA node.
    #[serde(default)]
    pub rework: BTreeMap<String, u32>,
    #[serde(default)]
    pub breakers: BTreeMap<String, CircuitBreaker>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    pub governance_outcome: Option<GovernanceOutcome>,
    #[serde(default)]
    pub terminal_outcome: Option<TerminalOutcome>,
    #[serde(default)]
    pub blocked: Option<BlockReason>,
    /// Reason for a `failed` status.
    #[serde(default)]
    pub failure: Option<String>,
    /// Optimistic concurrency token; bumped on every save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(plan: &WorkflowPlan, context: ExecutionContext) -> Self {
        let now = Utc::now();
        Self {
            execution_id: ExecutionId::new(),
            plan_id: plan.id.clone(),
            current_node_id: plan.entry_node.clone(),
            status: ExecutionStatus::Running,
            context,
            visits: BTreeMap::from([(plan.entry_node.clone(), 1)]),
            rework: BTreeMap::new(),
            breakers: BTreeMap::new(),
            transcript: Vec::new(),
            governance_outcome: None,
            terminal_outcome: None,
            blocked: None,
            failure: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `node_id`, opening a new visit there.
    pub fn enter_node(&mut self, node_id: &str) {
        let visit = self.next_visit(node_id);
        self.visits.insert(node_id.to_string(), visit);
        self.current_node_id = node_id.to_string();
    }

    pub fn next_visit(&self, node_id: &str) -> u32 {
        self.visits.get(node_id).copied().unwrap_or(0) + 1
    }

    /// Visit number of the most recent entry into `node_id`.
    pub fn current_visit(&self, node_id: &str) -> u32 {
        self.visits.get(node_id).copied().unwrap_or(0).max(1)
    }

    pub fn turns_at(&self, node_id: &str, visit: u32) -> impl Iterator<Item = &TranscriptTurn> {
        let node_id = node_id.to_string();
        self.transcript
            .iter()
            .filter(move |t| t.node_id == node_id && t.visit == visit)
    }
}
