use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::cycles::detect_dependency_cycles;
use crate::error::BacklogViolation;
use crate::item::{BacklogItem, Hierarchy};

/// Items sorted by id, so every validator reports in a reproducible order.
fn sorted(items: &[BacklogItem]) -> Vec<&BacklogItem> {
    let mut sorted: Vec<&BacklogItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
}

/// Check that ids are unique and every `depends_on` target exists and is not
/// the item itself. Returns the complete list of violations.
pub fn validate_dependencies(items: &[BacklogItem]) -> Vec<BacklogViolation> {
    let mut violations = Vec::new();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item.id.as_str()).or_default() += 1;
    }
    for (id, count) in &counts {
        if *count > 1 {
            violations.push(BacklogViolation::DuplicateId {
                item_id: id.to_string(),
            });
        }
    }

    for item in sorted(items) {
        let mut seen = BTreeSet::new();
        for dep in &item.depends_on {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if *dep == item.id {
                violations.push(BacklogViolation::SelfDependency {
                    item_id: item.id.clone(),
                });
            } else if !counts.contains_key(dep.as_str()) {
                violations.push(BacklogViolation::MissingDependency {
                    item_id: item.id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }

    violations
}

/// Enforce the fixed parent/child hierarchy.
///
/// Top-level items must have no parent; every other item must have a parent
/// that exists and sits exactly one level above it. Parent-chain cycles are
/// reported separately from dependency cycles.
pub fn validate_hierarchy(items: &[BacklogItem], hierarchy: &Hierarchy) -> Vec<BacklogViolation> {
    let mut violations = Vec::new();
    let by_id: HashMap<&str, &BacklogItem> = items.iter().map(|i| (i.id.as_str(), i)).collect();

    for item in sorted(items) {
        let Some(depth) = hierarchy.depth(&item.level) else {
            violations.push(BacklogViolation::UnknownLevel {
                item_id: item.id.clone(),
                level: item.level.clone(),
            });
            continue;
        };

        match (&item.parent_id, depth) {
            (Some(parent_id), 0) => violations.push(BacklogViolation::TopLevelHasParent {
                item_id: item.id.clone(),
                parent_id: parent_id.clone(),
            }),
            (None, 0) => {}
            (None, _) => violations.push(BacklogViolation::OrphanedItem {
                item_id: item.id.clone(),
                level: item.level.clone(),
            }),
            (Some(parent_id), _) => match by_id.get(parent_id.as_str()) {
                None => violations.push(BacklogViolation::DanglingParent {
                    item_id: item.id.clone(),
                    parent_id: parent_id.clone(),
                }),
                Some(parent) => {
                    let expected = hierarchy.parent_level(&item.level).unwrap_or_default();
                    if parent.level != expected {
                        violations.push(BacklogViolation::WrongParentLevel {
                            item_id: item.id.clone(),
                            parent_id: parent_id.clone(),
                            expected: expected.to_string(),
                            actual: parent.level.clone(),
                        });
                    }
                }
            },
        }
    }

    violations.extend(parent_cycles(items, &by_id));
    violations
}

/// Walk parent pointers from every item; each distinct cycle is reported once,
/// rotated to start at its smallest id.
fn parent_cycles(
    items: &[BacklogItem],
    by_id: &HashMap<&str, &BacklogItem>,
) -> Vec<BacklogViolation> {
    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut found: BTreeSet<Vec<String>> = BTreeSet::new();

    for start in sorted(items) {
        if done.contains(start.id.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut current = start.id.as_str();

        loop {
            if let Some(&pos) = position.get(current) {
                let mut cycle: Vec<&str> = path[pos..].to_vec();
                let min = cycle
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                cycle.rotate_left(min);
                let mut trace: Vec<String> = cycle.iter().map(|s| s.to_string()).collect();
                trace.push(trace[0].clone());
                found.insert(trace);
                break;
            }
            if done.contains(current) {
                break;
            }
            position.insert(current, path.len());
            path.push(current);

            match by_id.get(current).and_then(|i| i.parent_id.as_deref()) {
                Some(parent) if by_id.contains_key(parent) => current = parent,
                _ => break,
            }
        }
        done.extend(path);
    }

    found
        .into_iter()
        .map(|trace| BacklogViolation::ParentCycle { trace })
        .collect()
}

/// Run every validator and return the combined, complete list.
pub fn validate_backlog(items: &[BacklogItem], hierarchy: &Hierarchy) -> Vec<BacklogViolation> {
    let mut violations = validate_dependencies(items);
    violations.extend(validate_hierarchy(items, hierarchy));
    violations.extend(
        detect_dependency_cycles(items)
            .into_iter()
            .map(|trace| BacklogViolation::DependencyCycle { trace }),
    );
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, parent: &str) -> BacklogItem {
        BacklogItem::new(id, "story").with_parent(parent)
    }

    #[test]
    fn test_missing_reference() {
        let items = vec![BacklogItem::new("A", "epic").with_deps(&["X999"])];
        let violations = validate_dependencies(&items);
        assert_eq!(
            violations,
            vec![BacklogViolation::MissingDependency {
                item_id: "A".into(),
                missing: "X999".into(),
            }]
        );
    }

    #[test]
    fn test_self_reference() {
        let items = vec![BacklogItem::new("A", "epic").with_deps(&["A"])];
        let violations = validate_dependencies(&items);
        assert_eq!(
            violations,
            vec![BacklogViolation::SelfDependency { item_id: "A".into() }]
        );
    }

    #[test]
    fn test_dependency_validation_reports_everything() {
        let items = vec![
            BacklogItem::new("B", "epic").with_deps(&["B", "Z1"]),
            BacklogItem::new("A", "epic").with_deps(&["Z2"]),
            BacklogItem::new("A", "epic"),
        ];
        let violations = validate_dependencies(&items);
        assert_eq!(violations.len(), 4);
        assert_eq!(
            violations[0],
            BacklogViolation::DuplicateId { item_id: "A".into() }
        );
        assert!(violations.contains(&BacklogViolation::SelfDependency { item_id: "B".into() }));
        assert!(violations.contains(&BacklogViolation::MissingDependency {
            item_id: "B".into(),
            missing: "Z1".into(),
        }));
    }

    #[test]
    fn test_valid_hierarchy() {
        let items = vec![
            BacklogItem::new("E1", "epic"),
            BacklogItem::new("F1", "feature").with_parent("E1"),
            story("S1", "F1"),
        ];
        assert!(validate_hierarchy(&items, &Hierarchy::default()).is_empty());
    }

    #[test]
    fn test_hierarchy_violations() {
        let items = vec![
            BacklogItem::new("E1", "epic").with_parent("E0"),
            BacklogItem::new("F1", "feature"),
            story("S1", "E1"),
            story("S2", "F404"),
            BacklogItem::new("T1", "task"),
        ];
        let violations = validate_hierarchy(&items, &Hierarchy::default());
        assert_eq!(
            violations,
            vec![
                BacklogViolation::TopLevelHasParent {
                    item_id: "E1".into(),
                    parent_id: "E0".into(),
                },
                BacklogViolation::OrphanedItem {
                    item_id: "F1".into(),
                    level: "feature".into(),
                },
                BacklogViolation::WrongParentLevel {
                    item_id: "S1".into(),
                    parent_id: "E1".into(),
                    expected: "feature".into(),
                    actual: "epic".into(),
                },
                BacklogViolation::DanglingParent {
                    item_id: "S2".into(),
                    parent_id: "F404".into(),
                },
                BacklogViolation::UnknownLevel {
                    item_id: "T1".into(),
                    level: "task".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parent_cycle_reported_once() {
        let items = vec![
            BacklogItem::new("F2", "feature").with_parent("F1"),
            BacklogItem::new("F1", "feature").with_parent("F2"),
        ];
        let violations = validate_hierarchy(&items, &Hierarchy::default());
        let cycles: Vec<_> = violations
            .iter()
            .filter(|v| matches!(v, BacklogViolation::ParentCycle { .. }))
            .collect();
        assert_eq!(
            cycles,
            vec![&BacklogViolation::ParentCycle {
                trace: vec!["F1".into(), "F2".into(), "F1".into()],
            }]
        );
    }

    #[test]
    fn test_validate_backlog_includes_dependency_cycles() {
        let items = vec![
            BacklogItem::new("A", "epic").with_deps(&["B"]),
            BacklogItem::new("B", "epic").with_deps(&["A"]),
        ];
        let violations = validate_backlog(&items, &Hierarchy::default());
        assert_eq!(
            violations,
            vec![BacklogViolation::DependencyCycle {
                trace: vec!["A".into(), "B".into(), "A".into()],
            }]
        );
    }
}
