use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::CompileError;
use crate::item::BacklogItem;

fn sort_tier(tier: &mut [&str], by_id: &BTreeMap<&str, &BacklogItem>) {
    tier.sort_by_key(|id| {
        let priority = by_id.get(*id).map(|i| i.priority_key()).unwrap_or(0);
        (Reverse(priority), *id)
    });
}

/// Peel zero-indegree items tier by tier (Kahn's algorithm).
///
/// Within a tier items are sorted by integer priority descending, then id
/// ascending. Both `order_backlog` and `compute_waves` are views of these
/// tiers, which is what makes `flatten(waves) == order` hold for every graph.
fn tiers(items: &[BacklogItem]) -> Result<Vec<Vec<String>>, CompileError> {
    let mut by_id: BTreeMap<&str, &BacklogItem> = BTreeMap::new();
    for item in items {
        by_id.entry(item.id.as_str()).or_insert(item);
    }

    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (id, item) in &by_id {
        let deps: BTreeSet<&str> = item.depends_on.iter().map(String::as_str).collect();
        for dep in &deps {
            if !by_id.contains_key(dep) {
                return Err(CompileError::UnknownDependency {
                    item_id: id.to_string(),
                    missing: dep.to_string(),
                });
            }
            dependents.entry(*dep).or_default().push(*id);
        }
        indegree.insert(*id, deps.len());
    }

    let mut current: Vec<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    sort_tier(&mut current, &by_id);

    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut placed = 0usize;
    while !current.is_empty() {
        let mut next = Vec::new();
        for id in &current {
            for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = indegree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        placed += current.len();
        waves.push(current.iter().map(|s| s.to_string()).collect());
        sort_tier(&mut next, &by_id);
        current = next;
    }

    if placed < by_id.len() {
        let unresolved = indegree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(CompileError::NotAcyclic { unresolved });
    }

    Ok(waves)
}

/// Deterministic total order of a validated, acyclic backlog.
///
/// Dependencies always precede their dependents. Calling this on a cyclic
/// backlog is a caller bug and returns `CompileError::NotAcyclic`.
pub fn order_backlog(items: &[BacklogItem]) -> Result<Vec<String>, CompileError> {
    Ok(tiers(items)?.into_iter().flatten().collect())
}

/// Group items by dependency depth. Concatenating the waves yields exactly
/// `order_backlog(items)`.
pub fn compute_waves(items: &[BacklogItem]) -> Result<Vec<Vec<String>>, CompileError> {
    tiers(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, priority: f64, deps: &[&str]) -> BacklogItem {
        BacklogItem::new(id, "story").with_priority(priority).with_deps(deps)
    }

    fn sample() -> Vec<BacklogItem> {
        vec![
            item("s4", 1.0, &["s1", "s2"]),
            item("s1", 5.0, &[]),
            item("s2", 9.0, &[]),
            item("s3", 5.0, &[]),
            item("s5", 3.0, &["s3"]),
            item("s6", 8.0, &["s4", "s5"]),
        ]
    }

    #[test]
    fn test_order_respects_dependencies_and_tie_break() {
        let order = order_backlog(&sample()).unwrap();
        assert_eq!(order, vec!["s2", "s1", "s3", "s5", "s4", "s6"]);
    }

    #[test]
    fn test_waves_match_order() {
        let items = sample();
        let waves = compute_waves(&items).unwrap();
        assert_eq!(
            waves,
            vec![vec!["s2", "s1", "s3"], vec!["s5", "s4"], vec!["s6"]]
        );
        let flat: Vec<String> = waves.into_iter().flatten().collect();
        assert_eq!(flat, order_backlog(&items).unwrap());
    }

    #[test]
    fn test_order_is_permutation_invariant() {
        let items = sample();
        let expected = order_backlog(&items).unwrap();
        for shift in 1..items.len() {
            let mut permuted = items.clone();
            permuted.rotate_left(shift);
            assert_eq!(order_backlog(&permuted).unwrap(), expected);
            permuted.reverse();
            assert_eq!(order_backlog(&permuted).unwrap(), expected);
        }
    }

    #[test]
    fn test_fractional_priority_uses_integer_key() {
        let items = vec![item("b", 2.9, &[]), item("a", 2.1, &[])];
        assert_eq!(order_backlog(&items).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_cyclic_input_is_an_error() {
        let items = vec![item("a", 0.0, &["b"]), item("b", 0.0, &["a"]), item("c", 0.0, &[])];
        assert_eq!(
            order_backlog(&items),
            Err(CompileError::NotAcyclic {
                unresolved: vec!["a".into(), "b".into()],
            })
        );
        assert!(compute_waves(&items).is_err());
    }

    #[test]
    fn test_unknown_dependency_is_an_error() {
        let items = vec![item("a", 0.0, &["ghost"])];
        assert!(matches!(
            order_backlog(&items),
            Err(CompileError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_empty_backlog() {
        assert!(order_backlog(&[]).unwrap().is_empty());
        assert!(compute_waves(&[]).unwrap().is_empty());
    }
}
