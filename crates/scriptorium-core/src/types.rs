use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outcome::{GovernanceOutcome, TerminalOutcome};

/// Unique execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a fresh opaque identifier for ledger rows.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Failure taxonomy for paid work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Locked,
    ProviderRateLimit,
    ProviderTimeout,
    MutationConflict,
    SchemaInvalid,
    Unknown,
}

impl ErrorCode {
    /// Retryable codes are retried with backoff up to the attempt bound.
    /// `SCHEMA_INVALID` and `UNKNOWN` are terminal.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Locked | Self::ProviderRateLimit | Self::ProviderTimeout | Self::MutationConflict
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::ProviderRateLimit => "PROVIDER_RATE_LIMIT",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::MutationConflict => "MUTATION_CONFLICT",
            Self::SchemaInvalid => "SCHEMA_INVALID",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(Self::Locked),
            "PROVIDER_RATE_LIMIT" => Ok(Self::ProviderRateLimit),
            "PROVIDER_TIMEOUT" => Ok(Self::ProviderTimeout),
            "MUTATION_CONFLICT" => Ok(Self::MutationConflict),
            "SCHEMA_INVALID" => Ok(Self::SchemaInvalid),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown error code: {}", other)),
        }
    }
}

/// Typed failure returned by an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderRateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderTimeout, message)
    }
}

/// A single paid generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Kind of work (`task`, `qa`, `concierge_turn`).
    pub operation: String,
    /// Owning scope, usually the execution id.
    pub scope: String,
    /// Target within the scope, usually `node_id#visit`.
    pub target: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
}

impl LlmResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

/// Lifecycle of an LLM thread (one semantic intent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Running,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(ThreadStatus {
    Open => "open",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl ThreadStatus {
    /// Active threads hold the idempotency key.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Running)
    }
}

/// Lifecycle of a single claimable work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Queued,
    Claimed,
    Running,
    Applied,
    Failed,
    DeadLetter,
}

string_enum!(WorkItemStatus {
    Queued => "queued",
    Claimed => "claimed",
    Running => "running",
    Applied => "applied",
    Failed => "failed",
    DeadLetter => "dead_letter",
});

impl WorkItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed | Self::DeadLetter)
    }

    /// Claimed or running: someone owns the item right now.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }
}

/// Status of one plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    AwaitingInput,
    AwaitingChoice,
    Blocked,
    Completed,
    Failed,
}

string_enum!(ExecutionStatus {
    Running => "running",
    AwaitingInput => "awaiting_input",
    AwaitingChoice => "awaiting_choice",
    Blocked => "blocked",
    Completed => "completed",
    Failed => "failed",
});

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, Self::AwaitingInput | Self::AwaitingChoice)
    }
}

/// A user-facing phase label attached to one or more plan nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub label: String,
    pub order: u32,
}

impl Station {
    pub fn new(id: impl Into<String>, label: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationState {
    Pending,
    Active,
    Complete,
    Blocked,
}

/// Push events emitted to the UI layer. Nothing in the engine is polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StationsDeclared {
        execution_id: String,
        stations: Vec<Station>,
    },
    StationChanged {
        execution_id: String,
        station_id: String,
        state: StationState,
    },
    ExecutionStatusChanged {
        execution_id: String,
        node_id: String,
        status: ExecutionStatus,
    },
    ExecutionCompleted {
        execution_id: String,
        governance_outcome: GovernanceOutcome,
        terminal_outcome: TerminalOutcome,
    },
    ThreadStatusChanged {
        thread_id: String,
        scope: String,
        status: ThreadStatus,
    },
    WorkItemStatusChanged {
        work_item_id: String,
        thread_id: String,
        status: WorkItemStatus,
        attempt: u32,
    },
    GovernanceRejected {
        execution_id: String,
        node_id: String,
        reason: String,
    },
}

/// One persisted governance event (gate bypass attempts and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceEvent {
    pub execution_id: String,
    pub node_id: String,
    pub kind: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_retry_taxonomy() {
        assert!(ErrorCode::Locked.is_retryable());
        assert!(ErrorCode::ProviderRateLimit.is_retryable());
        assert!(ErrorCode::ProviderTimeout.is_retryable());
        assert!(ErrorCode::MutationConflict.is_retryable());
        assert!(!ErrorCode::SchemaInvalid.is_retryable());
        assert!(!ErrorCode::Unknown.is_retryable());
    }

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::ProviderRateLimit).unwrap();
        assert_eq!(json, "\"PROVIDER_RATE_LIMIT\"");
        assert_eq!(
            "SCHEMA_INVALID".parse::<ErrorCode>().unwrap(),
            ErrorCode::SchemaInvalid
        );
        assert!("NOPE".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(WorkItemStatus::DeadLetter.as_str(), "dead_letter");
        assert_eq!(
            "dead_letter".parse::<WorkItemStatus>().unwrap(),
            WorkItemStatus::DeadLetter
        );
        assert_eq!("running".parse::<ThreadStatus>().unwrap(), ThreadStatus::Running);
        assert!(ThreadStatus::Open.is_active());
        assert!(!ThreadStatus::Completed.is_active());
        assert!(WorkItemStatus::Claimed.is_in_flight());
        assert!(WorkItemStatus::Applied.is_terminal());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = EngineEvent::StationChanged {
            execution_id: "e1".into(),
            station_id: "draft".into(),
            state: StationState::Active,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "station_changed");
        assert_eq!(json["state"], "active");
    }
}
