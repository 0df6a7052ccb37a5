use scriptorium_compiler::{
    compute_backlog_hash, compute_waves, derive_execution_plan, order_backlog, BacklogItem,
    CompileError, Hierarchy, PlanRefs,
};
use scriptorium_test_utils::sample_backlog;

#[test]
fn test_sample_backlog_compiles() {
    let items = sample_backlog();
    let refs = PlanRefs {
        document_id: Some("user-guide".into()),
        backlog_revision: None,
    };
    let plan = derive_execution_plan(&items, &Hierarchy::default(), refs).expect("compiles");

    assert_eq!(plan.ordered_ids.len(), items.len());
    let flattened: Vec<String> = plan.waves.iter().flatten().cloned().collect();
    assert_eq!(flattened, plan.ordered_ids);
    assert_eq!(plan.backlog_hash, compute_backlog_hash(&items).unwrap());
}

#[test]
fn test_order_is_permutation_invariant() {
    let items = sample_backlog();
    let mut reversed = items.clone();
    reversed.reverse();

    let forward = order_backlog(&items).unwrap();
    assert_eq!(forward, order_backlog(&reversed).unwrap());
    let waves = compute_waves(&items).unwrap();
    assert_eq!(waves.iter().map(Vec::len).sum::<usize>(), items.len());
}

#[test]
fn test_invalid_backlog_reports_every_violation() {
    let mut items = sample_backlog();
    items.push(BacklogItem::new("S3", "story").with_parent("F1").with_deps(&["X999"]));
    items.push(BacklogItem::new("S4", "story").with_parent("F1").with_deps(&["S4"]));

    let err = derive_execution_plan(&items, &Hierarchy::default(), PlanRefs::default()).unwrap_err();
    let CompileError::Invalid(violations) = err else {
        panic!("expected itemized violations");
    };
    assert!(violations.len() >= 2);
    let text: Vec<String> = violations.iter().map(ToString::to_string).collect();
    assert!(text.iter().any(|v| v.contains("X999")));
    assert!(text.iter().any(|v| v.contains("depends on itself")));
}
