use std::collections::{BTreeMap, BTreeSet};

use crate::item::BacklogItem;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first cycle search over a directed graph.
///
/// Roots and neighbours are both visited in sorted order, so the same graph
/// always produces the same traces. Each trace starts and ends with the node
/// that closes the cycle, e.g. `[A, B, C, A]`. Edges to nodes that are not
/// keys of `adjacency` are ignored.
pub fn find_cycles(adjacency: &BTreeMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let neighbours: BTreeMap<&str, Vec<&str>> = adjacency
        .iter()
        .map(|(node, targets)| {
            let sorted: BTreeSet<&str> = targets
                .iter()
                .map(String::as_str)
                .filter(|t| adjacency.contains_key(*t))
                .collect();
            (node.as_str(), sorted.into_iter().collect())
        })
        .collect();

    let mut marks: BTreeMap<&str, Mark> =
        neighbours.keys().map(|k| (*k, Mark::Unvisited)).collect();
    let mut cycles = Vec::new();

    for &root in neighbours.keys() {
        if marks.get(root) != Some(&Mark::Unvisited) {
            continue;
        }
        marks.insert(root, Mark::OnStack);
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(&(node, next)) = stack.last() {
            let child = neighbours.get(node).and_then(|n| n.get(next)).copied();
            let Some(child) = child else {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            match marks.get(child).copied().unwrap_or(Mark::Done) {
                Mark::Unvisited => {
                    marks.insert(child, Mark::OnStack);
                    stack.push((child, 0));
                }
                Mark::OnStack => {
                    let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    let mut trace: Vec<String> =
                        stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                    trace.push(child.to_string());
                    cycles.push(trace);
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}

/// Find cycles over `depends_on` edges only (parent links are not followed).
pub fn detect_dependency_cycles(items: &[BacklogItem]) -> Vec<Vec<String>> {
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in items {
        adjacency
            .entry(item.id.clone())
            .or_default()
            .extend(item.depends_on.iter().cloned());
    }
    find_cycles(&adjacency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_node_cycle_trace() {
        let items = vec![
            BacklogItem::new("C", "epic").with_deps(&["A"]),
            BacklogItem::new("A", "epic").with_deps(&["B"]),
            BacklogItem::new("B", "epic").with_deps(&["C"]),
        ];
        let cycles = detect_dependency_cycles(&items);
        assert_eq!(cycles, vec![vec!["A", "B", "C", "A"]]);
    }

    #[test]
    fn test_trace_is_reproducible_across_permutations() {
        let base = vec![
            BacklogItem::new("A", "epic").with_deps(&["B"]),
            BacklogItem::new("B", "epic").with_deps(&["C"]),
            BacklogItem::new("C", "epic").with_deps(&["A"]),
            BacklogItem::new("D", "epic").with_deps(&["A"]),
        ];
        let expected = detect_dependency_cycles(&base);
        let mut reversed = base.clone();
        reversed.reverse();
        assert_eq!(detect_dependency_cycles(&reversed), expected);
        let mut rotated = base;
        rotated.rotate_left(2);
        assert_eq!(detect_dependency_cycles(&rotated), expected);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let items = vec![
            BacklogItem::new("A", "epic"),
            BacklogItem::new("B", "epic").with_deps(&["A"]),
            BacklogItem::new("C", "epic").with_deps(&["A", "B"]),
        ];
        assert!(detect_dependency_cycles(&items).is_empty());
    }

    #[test]
    fn test_self_loop_and_missing_targets() {
        let items = vec![
            BacklogItem::new("A", "epic").with_deps(&["A", "MISSING"]),
        ];
        assert_eq!(detect_dependency_cycles(&items), vec![vec!["A", "A"]]);
    }

    #[test]
    fn test_find_cycles_on_raw_adjacency() {
        let mut adjacency = BTreeMap::new();
        adjacency.insert("x".to_string(), vec!["y".to_string()]);
        adjacency.insert("y".to_string(), vec!["x".to_string()]);
        adjacency.insert("z".to_string(), vec![]);
        assert_eq!(find_cycles(&adjacency), vec![vec!["x", "y", "x"]]);
    }
}
