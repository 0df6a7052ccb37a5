use thiserror::Error;

use crate::types::{ErrorCode, ProviderError};

#[derive(Debug, Error)]
pub enum ScriptoriumError {
    // Provider errors
    #[error("LLM provider error: {0}")]
    Provider(#[from] ProviderError),

    // Ledger errors
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Work item not found: {0}")]
    WorkItemNotFound(String),

    #[error("Illegal {entity} transition for {id}: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Locked: {0}")]
    Locked(String),

    #[error("Work item {work_item_id} dead-lettered after {attempts} attempts ({code})")]
    DeadLetter {
        work_item_id: String,
        code: ErrorCode,
        attempts: u32,
    },

    #[error("Work item {work_item_id} failed ({code}): {message}")]
    WorkFailed {
        work_item_id: String,
        code: ErrorCode,
        message: String,
    },

    #[error("Thread cancelled: {0}")]
    Cancelled(String),

    // Execution errors
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Malformed plan ({} violations): {}", .violations.len(), .violations.join("; "))]
    MalformedPlan { violations: Vec<String> },

    #[error("Version conflict on execution {execution_id}: expected version {expected}")]
    VersionConflict { execution_id: String, expected: u64 },

    #[error("Circuit breaker open for execution {execution_id}: retry in {retry_after_secs}s")]
    CircuitOpen {
        execution_id: String,
        retry_after_secs: u64,
    },

    #[error("Execution {0} escalated: half-open trials exhausted")]
    Escalated(String),

    #[error("Execution {execution_id} is not blocked on a circuit breaker (status {status})")]
    NotBlocked { execution_id: String, status: String },

    #[error("Execution exceeded max steps per advance ({0})")]
    MaxStepsExceeded(usize),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Event sink errors
    #[error("Event sink error: {0}")]
    Sink(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptoriumError {
    /// The ledger failure code this error maps to, if it belongs to the
    /// retry taxonomy.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Provider(e) => Some(e.code),
            Self::Locked(_) => Some(ErrorCode::Locked),
            Self::DeadLetter { code, .. } | Self::WorkFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptoriumError>;
