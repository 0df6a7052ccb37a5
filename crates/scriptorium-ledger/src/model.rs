use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scriptorium_core::types::{ErrorCode, ThreadStatus, WorkItemStatus};

use crate::key::IdempotencyKey;

/// What a caller wants a thread for. The idempotency key is derived from
/// `(kind, scope, target)`.
#[derive(Debug, Clone)]
pub struct ThreadSpec {
    pub kind: String,
    pub scope: String,
    pub target: String,
    pub parent_thread_id: Option<String>,
}

impl ThreadSpec {
    pub fn new(kind: impl Into<String>, scope: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            scope: scope.into(),
            target: target.into(),
            parent_thread_id: None,
        }
    }

    pub fn with_parent(mut self, parent_thread_id: impl Into<String>) -> Self {
        self.parent_thread_id = Some(parent_thread_id.into());
        self
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::derive(&self.kind, &self.scope, &self.target)
    }
}

/// Intent container for one semantic request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmThread {
    pub id: String,
    pub kind: String,
    pub scope: String,
    pub target: String,
    pub status: ThreadStatus,
    pub idempotency_key: String,
    pub parent_thread_id: Option<String>,
    /// Set when cancel was asked for while a work item was in flight.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One claimable execution attempt inside a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub thread_id: String,
    /// Unique within the thread, starting at 1.
    pub sequence: u32,
    pub status: WorkItemStatus,
    /// Starts at 1 and grows on every requeue.
    pub attempt: u32,
    pub error_code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a claimed/running work item finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Applied,
    Failed(ErrorCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Prompt,
    Response,
    ParseReport,
    MutationReport,
    Error,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Response => "response",
            Self::ParseReport => "parse_report",
            Self::MutationReport => "mutation_report",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "response" => Ok(Self::Response),
            "parse_report" => Ok(Self::ParseReport),
            "mutation_report" => Ok(Self::MutationReport),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown entry type: {}", other)),
        }
    }
}

/// One immutable interaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub thread_id: String,
    pub work_item_id: Option<String>,
    pub entry_type: EntryType,
    pub payload: serde_json::Value,
    /// SHA-256 hex of the serialized payload.
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}
