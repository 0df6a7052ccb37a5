use std::path::PathBuf;

use scriptorium_compiler::BacklogItem;
use scriptorium_core::config::AppConfig;
use scriptorium_core::types::Station;
use scriptorium_engine::plan::{GateOption, NodeKind, PlanEdge, PlanNode, WorkflowPlan};
use tempfile::TempDir;

/// Config with millisecond backoff, one rework cycle and no breaker
/// cool-down, so scenario tests run instantly.
pub fn fast_config() -> AppConfig {
    toml::from_str(
        r#"
        [ledger]
        max_attempts = 3

        [ledger.retry]
        initial_backoff_ms = 1
        max_backoff_ms = 5

        [engine]
        max_rework = 1
        breaker_cooldown_secs = 0
        half_open_max_trials = 1
        provider_timeout_secs = 5
        "#,
    )
    .expect("fixture config parses")
}

/// A QA verdict as a provider would return it.
pub fn verdict(passed: bool, findings: &[&str]) -> String {
    serde_json::json!({ "passed": passed, "findings": findings }).to_string()
}

/// A database path inside a fresh temp dir. Keep the `TempDir` alive.
pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scriptorium.db");
    (dir, path)
}

fn node(id: &str, label: &str, station: Option<Station>, kind: NodeKind) -> PlanNode {
    PlanNode {
        id: id.into(),
        label: label.into(),
        station,
        kind,
    }
}

/// `intake (concierge) -> draft -> review (qa) -> approve (gate) -> done`,
/// with `fix` as the remediation node behind `review`.
///
/// `fix` and `done` declare no station and inherit `review` and
/// `approval` respectively.
pub fn document_plan() -> WorkflowPlan {
    WorkflowPlan {
        id: "user-guide".into(),
        version: 1,
        entry_node: "intake".into(),
        nodes: vec![
            node(
                "intake",
                "Intake",
                Some(Station::new("intake", "Brief", 1)),
                NodeKind::Concierge {
                    prompt: "Gather the brief for a user guide.".into(),
                    options: vec![GateOption::new("proceed", "Start drafting")],
                },
            ),
            node(
                "draft",
                "Draft",
                Some(Station::new("drafting", "Drafting", 2)),
                NodeKind::Task {
                    prompt: "Write the first draft.".into(),
                    output_key: "draft".into(),
                    input_keys: vec![],
                },
            ),
            node(
                "review",
                "Review",
                Some(Station::new("review", "Review", 3)),
                NodeKind::Qa {
                    target_key: "draft".into(),
                    criteria: vec!["covers the brief".into(), "no placeholders".into()],
                    max_rework: None,
                },
            ),
            node(
                "fix",
                "Fix",
                None,
                NodeKind::Task {
                    prompt: "Revise the draft.".into(),
                    output_key: "draft".into(),
                    input_keys: vec!["draft".into()],
                },
            ),
            node(
                "approve",
                "Approve",
                Some(Station::new("approval", "Approval", 4)),
                NodeKind::Gate {
                    prompt: "Is the guide ready to publish?".into(),
                    available_options: vec![
                        GateOption::new("qualified", "Publish"),
                        GateOption::new("not_ready", "Hold back"),
                    ],
                },
            ),
            node("done", "Done", None, NodeKind::End { governance: None }),
        ],
        edges: vec![
            PlanEdge::option("intake", "draft", "proceed"),
            PlanEdge::always("draft", "review"),
            PlanEdge::qa_passed("review", "approve"),
            PlanEdge::qa_failed("review", "fix"),
            PlanEdge::rework("fix", "review"),
            PlanEdge::option("approve", "done", "qualified"),
            PlanEdge::option("approve", "done", "not_ready"),
        ],
    }
}

/// A small epic/feature/story backlog with cross-item dependencies.
pub fn sample_backlog() -> Vec<BacklogItem> {
    vec![
        BacklogItem::new("E1", "epic").with_priority(10.0).with_title("Onboarding"),
        BacklogItem::new("F1", "feature")
            .with_parent("E1")
            .with_priority(8.0)
            .with_title("Install guide"),
        BacklogItem::new("F2", "feature")
            .with_parent("E1")
            .with_priority(9.0)
            .with_deps(&["F1"])
            .with_title("First run"),
        BacklogItem::new("S1", "story")
            .with_parent("F1")
            .with_priority(5.0)
            .with_title("Linux steps"),
        BacklogItem::new("S2", "story")
            .with_parent("F2")
            .with_priority(7.0)
            .with_deps(&["S1"])
            .with_title("Config walkthrough"),
    ]
}
