use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One structural problem found in a backlog.
///
/// Validators return every violation they find; they never stop early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BacklogViolation {
    #[error("duplicate item id '{item_id}'")]
    DuplicateId { item_id: String },

    #[error("item '{item_id}' depends on missing item '{missing}'")]
    MissingDependency { item_id: String, missing: String },

    #[error("item '{item_id}' depends on itself")]
    SelfDependency { item_id: String },

    #[error("item '{item_id}' has unknown level '{level}'")]
    UnknownLevel { item_id: String, level: String },

    #[error("top-level item '{item_id}' must not have a parent (found '{parent_id}')")]
    TopLevelHasParent { item_id: String, parent_id: String },

    #[error("item '{item_id}' at level '{level}' has no parent")]
    OrphanedItem { item_id: String, level: String },

    #[error("item '{item_id}' references missing parent '{parent_id}'")]
    DanglingParent { item_id: String, parent_id: String },

    #[error("item '{item_id}' has parent '{parent_id}' at level '{actual}', expected '{expected}'")]
    WrongParentLevel {
        item_id: String,
        parent_id: String,
        expected: String,
        actual: String,
    },

    #[error("parent chain cycle: {}", .trace.join(" -> "))]
    ParentCycle { trace: Vec<String> },

    #[error("dependency cycle: {}", .trace.join(" -> "))]
    DependencyCycle { trace: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Ordering was asked for a graph that still has cycles.
    #[error("backlog is not acyclic; unresolved items: {}", .unresolved.join(", "))]
    NotAcyclic { unresolved: Vec<String> },

    #[error("item '{item_id}' depends on unknown item '{missing}'")]
    UnknownDependency { item_id: String, missing: String },

    #[error("backlog is invalid ({} violations)", .0.len())]
    Invalid(Vec<BacklogViolation>),

    #[error("canonical serialization failed: {0}")]
    Serialize(String),
}
