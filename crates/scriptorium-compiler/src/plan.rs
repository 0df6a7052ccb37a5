use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::hash::compute_backlog_hash;
use crate::item::{BacklogItem, Hierarchy};
use crate::order::compute_waves;
use crate::validate::validate_backlog;

/// Identifies the compiler that produced a plan. Bump when ordering or
/// hashing rules change so stored plans are recognized as stale.
pub const GENERATOR_VERSION: &str = "scriptorium-compiler/1";

/// Where the compiled backlog came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRefs {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub backlog_revision: Option<String>,
}

/// Deterministic compiled order. Immutable once derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub backlog_hash: String,
    pub ordered_ids: Vec<String>,
    pub waves: Vec<Vec<String>>,
    pub generator_version: String,
    #[serde(default)]
    pub refs: PlanRefs,
}

impl ExecutionPlan {
    /// True when `items` no longer hash to this plan, or the plan came from
    /// a different compiler version.
    pub fn is_stale(&self, items: &[BacklogItem]) -> Result<bool, CompileError> {
        if self.generator_version != GENERATOR_VERSION {
            return Ok(true);
        }
        Ok(compute_backlog_hash(items)? != self.backlog_hash)
    }
}

/// Validate, order, group and hash a backlog in one mechanical pass.
///
/// Any violation aborts derivation and every violation found is returned.
pub fn derive_execution_plan(
    items: &[BacklogItem],
    hierarchy: &Hierarchy,
    refs: PlanRefs,
) -> Result<ExecutionPlan, CompileError> {
    let violations = validate_backlog(items, hierarchy);
    if !violations.is_empty() {
        return Err(CompileError::Invalid(violations));
    }

    let waves = compute_waves(items)?;
    let ordered_ids = waves.iter().flatten().cloned().collect();

    Ok(ExecutionPlan {
        backlog_hash: compute_backlog_hash(items)?,
        ordered_ids,
        waves,
        generator_version: GENERATOR_VERSION.to_string(),
        refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BacklogViolation;
    use crate::order::order_backlog;

    fn backlog() -> Vec<BacklogItem> {
        vec![
            BacklogItem::new("E1", "epic").with_priority(1.0),
            BacklogItem::new("F1", "feature").with_parent("E1").with_deps(&["F2"]),
            BacklogItem::new("F2", "feature").with_parent("E1").with_priority(4.0),
            BacklogItem::new("S1", "story").with_parent("F1"),
        ]
    }

    #[test]
    fn test_derive_plan() {
        let refs = PlanRefs {
            document_id: Some("doc-7".into()),
            backlog_revision: None,
        };
        let plan = derive_execution_plan(&backlog(), &Hierarchy::default(), refs.clone()).unwrap();
        assert_eq!(plan.ordered_ids, order_backlog(&backlog()).unwrap());
        assert_eq!(plan.ordered_ids, vec!["F2", "E1", "S1", "F1"]);
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.generator_version, GENERATOR_VERSION);
        assert_eq!(plan.backlog_hash, compute_backlog_hash(&backlog()).unwrap());
        assert_eq!(plan.refs, refs);
    }

    #[test]
    fn test_derive_reports_all_violations() {
        let mut items = backlog();
        items.push(BacklogItem::new("S2", "story").with_deps(&["S2", "NOPE"]));
        let err = derive_execution_plan(&items, &Hierarchy::default(), PlanRefs::default())
            .unwrap_err();
        let CompileError::Invalid(violations) = err else {
            panic!("expected Invalid, got {err:?}");
        };
        assert!(violations.contains(&BacklogViolation::SelfDependency { item_id: "S2".into() }));
        assert!(violations.contains(&BacklogViolation::MissingDependency {
            item_id: "S2".into(),
            missing: "NOPE".into(),
        }));
        assert!(violations.contains(&BacklogViolation::OrphanedItem {
            item_id: "S2".into(),
            level: "story".into(),
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, BacklogViolation::DependencyCycle { .. })));
    }

    #[test]
    fn test_staleness_detection() {
        let plan =
            derive_execution_plan(&backlog(), &Hierarchy::default(), PlanRefs::default()).unwrap();
        let mut retitled = backlog();
        retitled[0].title = "New title".into();
        assert!(!plan.is_stale(&retitled).unwrap());

        let mut reprioritized = backlog();
        reprioritized[0].priority_score = 10.0;
        assert!(plan.is_stale(&reprioritized).unwrap());

        let mut old = plan.clone();
        old.generator_version = "scriptorium-compiler/0".into();
        assert!(old.is_stale(&backlog()).unwrap());
    }
}
