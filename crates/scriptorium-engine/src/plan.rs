use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use scriptorium_compiler::find_cycles;
use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::outcome::GovernanceOutcome;
use scriptorium_core::types::Station;

/// An immutable node graph. Loaded at execution start and pinned into the
/// execution row; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub entry_node: String,
    pub nodes: Vec<PlanNode>,
    #[serde(default)]
    pub edges: Vec<PlanEdge>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Visible phase this node belongs to. Internal nodes leave it unset and
    /// inherit the station of the nearest ancestor that has one.
    #[serde(default)]
    pub station: Option<Station>,
    pub kind: NodeKind,
}

/// Closed set of node kinds. Adding one is a compile-time decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Multi-turn conversation; never advances state by itself.
    Concierge {
        prompt: String,
        options: Vec<GateOption>,
    },
    /// Single paid generation whose output lands in the execution context.
    Task {
        prompt: String,
        output_key: String,
        #[serde(default)]
        input_keys: Vec<String>,
    },
    /// Paid verdict on a task's output.
    Qa {
        target_key: String,
        #[serde(default)]
        criteria: Vec<String>,
        /// Overrides the engine's rework bound for this node.
        #[serde(default)]
        max_rework: Option<u32>,
    },
    /// Pause for one explicit, enumerated choice. No LLM.
    Gate {
        prompt: String,
        available_options: Vec<GateOption>,
    },
    End {
        #[serde(default)]
        governance: Option<GovernanceOutcome>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Concierge { .. } => "concierge",
            Self::Task { .. } => "task",
            Self::Qa { .. } => "qa",
            Self::Gate { .. } => "gate",
            Self::End { .. } => "end",
        }
    }

    /// Options of a choice-bearing node (gate or concierge).
    pub fn options(&self) -> Option<&[GateOption]> {
        match self {
            Self::Concierge { options, .. } => Some(options),
            Self::Gate {
                available_options, ..
            } => Some(available_options),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOption {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub governance: Option<GovernanceOutcome>,
}

impl GateOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            governance: None,
        }
    }

    /// The governance outcome this option records: the declared one, or the
    /// outcome whose name equals the option id.
    pub fn governance(&self) -> Option<GovernanceOutcome> {
        self.governance.or_else(|| self.id.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: EdgeCondition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    #[default]
    Always,
    QaPassed,
    QaFailed,
    Option { option_id: String },
    /// Remediation back to a QA node. The only edge allowed to close a loop.
    Rework,
}

impl PlanEdge {
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with(from, to, EdgeCondition::Always)
    }

    pub fn qa_passed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with(from, to, EdgeCondition::QaPassed)
    }

    pub fn qa_failed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with(from, to, EdgeCondition::QaFailed)
    }

    pub fn option(
        from: impl Into<String>,
        to: impl Into<String>,
        option_id: impl Into<String>,
    ) -> Self {
        Self::with(
            from,
            to,
            EdgeCondition::Option {
                option_id: option_id.into(),
            },
        )
    }

    pub fn rework(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with(from, to, EdgeCondition::Rework)
    }

    fn with(from: impl Into<String>, to: impl Into<String>, condition: EdgeCondition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition,
        }
    }
}

/// One load-time problem with a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanViolation {
    DuplicateNode { node_id: String },
    MissingEntry { entry_node: String },
    UnknownEdgeEndpoint { from: String, to: String, missing: String },
    Cycle { trace: Vec<String> },
    NoOptions { node_id: String },
    DuplicateOption { node_id: String, option_id: String },
    OptionCoverage { node_id: String, option_id: String, edges: usize },
    UndeclaredOption { node_id: String, option_id: String },
    NonOptionEdge { node_id: String, to: String },
    QaRouting { node_id: String, passed: usize, failed: usize },
    QaEdgeFromNonQa { node_id: String, to: String },
    TaskRouting { node_id: String, edges: usize },
    ReworkTarget { from: String, to: String },
    ReworkNotOnFailedPath { from: String, to: String },
    EndHasEdges { node_id: String },
    UnresolvableGovernance { node_id: String },
}

impl fmt::Display for PlanViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id '{}'", node_id),
            Self::MissingEntry { entry_node } => {
                write!(f, "entry node '{}' does not exist", entry_node)
            }
            Self::UnknownEdgeEndpoint { from, to, missing } => {
                write!(f, "edge {} -> {} references unknown node '{}'", from, to, missing)
            }
            Self::Cycle { trace } => write!(f, "cycle over non-rework edges: {}", trace.join(" -> ")),
            Self::NoOptions { node_id } => write!(f, "node '{}' declares no options", node_id),
            Self::DuplicateOption { node_id, option_id } => {
                write!(f, "node '{}' declares option '{}' twice", node_id, option_id)
            }
            Self::OptionCoverage {
                node_id,
                option_id,
                edges,
            } => write!(
                f,
                "option '{}' of node '{}' has {} edges, expected exactly 1",
                option_id, node_id, edges
            ),
            Self::UndeclaredOption { node_id, option_id } => write!(
                f,
                "edge from '{}' names undeclared option '{}'",
                node_id, option_id
            ),
            Self::NonOptionEdge { node_id, to } => write!(
                f,
                "edge {} -> {} must be an option edge",
                node_id, to
            ),
            Self::QaRouting {
                node_id,
                passed,
                failed,
            } => write!(
                f,
                "qa node '{}' needs one qa_passed and one qa_failed edge (has {} and {})",
                node_id, passed, failed
            ),
            Self::QaEdgeFromNonQa { node_id, to } => {
                write!(f, "qa edge {} -> {} leaves a non-qa node", node_id, to)
            }
            Self::TaskRouting { node_id, edges } => write!(
                f,
                "task node '{}' needs exactly one always/rework edge (has {})",
                node_id, edges
            ),
            Self::ReworkTarget { from, to } => {
                write!(f, "rework edge {} -> {} must target a qa node", from, to)
            }
            Self::ReworkNotOnFailedPath { from, to } => write!(
                f,
                "rework edge {} -> {} leaves a node not reachable from the qa_failed branch of '{}'",
                from, to, to
            ),
            Self::EndHasEdges { node_id } => {
                write!(f, "end node '{}' has outgoing edges", node_id)
            }
            Self::UnresolvableGovernance { node_id } => write!(
                f,
                "end node '{}' pins no governance outcome and the plan has no choice node",
                node_id
            ),
        }
    }
}

impl WorkflowPlan {
    pub fn node(&self, node_id: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a PlanEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == node_id)
    }

    /// The first edge out of `node_id` whose condition equals `condition`.
    pub fn follow(&self, node_id: &str, condition: &EdgeCondition) -> Option<&PlanEdge> {
        self.edges
            .iter()
            .find(|e| e.from == node_id && &e.condition == condition)
    }

    /// Validate and turn any violations into `MalformedPlan`.
    pub fn validate(&self) -> Result<()> {
        let violations = validate_plan(self);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ScriptoriumError::MalformedPlan {
                violations: violations.iter().map(ToString::to_string).collect(),
            })
        }
    }
}

/// Check a plan before any node runs. Every violation is collected.
pub fn validate_plan(plan: &WorkflowPlan) -> Vec<PlanViolation> {
    let mut violations = Vec::new();

    let mut by_id: HashMap<&str, &PlanNode> = HashMap::new();
    for node in &plan.nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            violations.push(PlanViolation::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }

    if !by_id.contains_key(plan.entry_node.as_str()) {
        violations.push(PlanViolation::MissingEntry {
            entry_node: plan.entry_node.clone(),
        });
    }

    for edge in &plan.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !by_id.contains_key(endpoint.as_str()) {
                violations.push(PlanViolation::UnknownEdgeEndpoint {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
    }

    // Acyclicity over everything except rework edges.
    let mut adjacency: BTreeMap<String, Vec<String>> = plan
        .nodes
        .iter()
        .map(|n| (n.id.clone(), Vec::new()))
        .collect();
    for edge in &plan.edges {
        if edge.condition == EdgeCondition::Rework {
            continue;
        }
        if let Some(targets) = adjacency.get_mut(&edge.from) {
            targets.push(edge.to.clone());
        }
    }
    for trace in find_cycles(&adjacency) {
        violations.push(PlanViolation::Cycle { trace });
    }

    let has_choice_node = plan.nodes.iter().any(|n| n.kind.options().is_some());

    for node in &plan.nodes {
        let outgoing: Vec<&PlanEdge> = plan.edges.iter().filter(|e| e.from == node.id).collect();

        if !matches!(node.kind, NodeKind::Qa { .. }) {
            for edge in &outgoing {
                if matches!(edge.condition, EdgeCondition::QaPassed | EdgeCondition::QaFailed) {
                    violations.push(PlanViolation::QaEdgeFromNonQa {
                        node_id: node.id.clone(),
                        to: edge.to.clone(),
                    });
                }
            }
        }

        match &node.kind {
            NodeKind::Concierge { options, .. }
            | NodeKind::Gate {
                available_options: options,
                ..
            } => check_options(node, options, &outgoing, &mut violations),
            NodeKind::Qa { .. } => {
                let passed = count(&outgoing, |c| *c == EdgeCondition::QaPassed);
                let failed = count(&outgoing, |c| *c == EdgeCondition::QaFailed);
                if passed != 1 || failed != 1 {
                    violations.push(PlanViolation::QaRouting {
                        node_id: node.id.clone(),
                        passed,
                        failed,
                    });
                }
            }
            NodeKind::Task { .. } => {
                let routed = count(&outgoing, |c| {
                    matches!(c, EdgeCondition::Always | EdgeCondition::Rework)
                });
                if routed != 1 {
                    violations.push(PlanViolation::TaskRouting {
                        node_id: node.id.clone(),
                        edges: routed,
                    });
                }
            }
            NodeKind::End { governance } => {
                if !outgoing.is_empty() {
                    violations.push(PlanViolation::EndHasEdges {
                        node_id: node.id.clone(),
                    });
                }
                if governance.is_none() && !has_choice_node {
                    violations.push(PlanViolation::UnresolvableGovernance {
                        node_id: node.id.clone(),
                    });
                }
            }
        }

        for edge in outgoing {
            if edge.condition != EdgeCondition::Rework {
                continue;
            }
            let targets_qa = by_id
                .get(edge.to.as_str())
                .map(|n| matches!(n.kind, NodeKind::Qa { .. }))
                .unwrap_or(false);
            if !targets_qa {
                violations.push(PlanViolation::ReworkTarget {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            } else if !on_failed_path(plan, &edge.to, &edge.from) {
                violations.push(PlanViolation::ReworkNotOnFailedPath {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }
    }

    violations
}

/// Whether `node_id` is reachable from the `qa_failed` target of `qa_id`
/// over non-rework edges without passing back through `qa_id`.
fn on_failed_path(plan: &WorkflowPlan, qa_id: &str, node_id: &str) -> bool {
    let Some(failed) = plan.follow(qa_id, &EdgeCondition::QaFailed) else {
        return false;
    };
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([failed.to.as_str()]);
    while let Some(current) = queue.pop_front() {
        if current == qa_id || !seen.insert(current) {
            continue;
        }
        if current == node_id {
            return true;
        }
        for edge in plan.edges.iter().filter(|e| e.from == current) {
            if edge.condition != EdgeCondition::Rework {
                queue.push_back(edge.to.as_str());
            }
        }
    }
    false
}

fn count(edges: &[&PlanEdge], pred: impl Fn(&EdgeCondition) -> bool) -> usize {
    edges.iter().filter(|e| pred(&e.condition)).count()
}

fn check_options(
    node: &PlanNode,
    options: &[GateOption],
    outgoing: &[&PlanEdge],
    violations: &mut Vec<PlanViolation>,
) {
    if options.is_empty() {
        violations.push(PlanViolation::NoOptions {
            node_id: node.id.clone(),
        });
    }

    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(option.id.as_str()) {
            violations.push(PlanViolation::DuplicateOption {
                node_id: node.id.clone(),
                option_id: option.id.clone(),
            });
            continue;
        }
        let edges = outgoing
            .iter()
            .filter(|e| matches!(&e.condition, EdgeCondition::Option { option_id } if *option_id == option.id))
            .count();
        if edges != 1 {
            violations.push(PlanViolation::OptionCoverage {
                node_id: node.id.clone(),
                option_id: option.id.clone(),
                edges,
            });
        }
    }

    for edge in outgoing {
        match &edge.condition {
            EdgeCondition::Option { option_id } => {
                if !seen.contains(option_id.as_str()) {
                    violations.push(PlanViolation::UndeclaredOption {
                        node_id: node.id.clone(),
                        option_id: option_id.clone(),
                    });
                }
            }
            EdgeCondition::QaPassed | EdgeCondition::QaFailed => {}
            _ => violations.push(PlanViolation::NonOptionEdge {
                node_id: node.id.clone(),
                to: edge.to.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> PlanNode {
        PlanNode {
            id: id.into(),
            label: id.into(),
            station: None,
            kind,
        }
    }

    fn task(id: &str) -> PlanNode {
        node(
            id,
            NodeKind::Task {
                prompt: "Write".into(),
                output_key: "draft".into(),
                input_keys: vec![],
            },
        )
    }

    fn qa(id: &str) -> PlanNode {
        node(
            id,
            NodeKind::Qa {
                target_key: "draft".into(),
                criteria: vec!["clear".into()],
                max_rework: None,
            },
        )
    }

    fn gate(id: &str, options: &[&str]) -> PlanNode {
        node(
            id,
            NodeKind::Gate {
                prompt: "Choose".into(),
                available_options: options.iter().map(|o| GateOption::new(*o, *o)).collect(),
            },
        )
    }

    fn end(id: &str) -> PlanNode {
        node(id, NodeKind::End { governance: None })
    }

    fn valid_plan() -> WorkflowPlan {
        WorkflowPlan {
            id: "doc".into(),
            version: 1,
            entry_node: "draft".into(),
            nodes: vec![
                task("draft"),
                qa("review"),
                task("fix"),
                gate("approve", &["qualified", "not_ready"]),
                end("done"),
            ],
            edges: vec![
                PlanEdge::always("draft", "review"),
                PlanEdge::qa_passed("review", "approve"),
                PlanEdge::qa_failed("review", "fix"),
                PlanEdge::rework("fix", "review"),
                PlanEdge::option("approve", "done", "qualified"),
                PlanEdge::option("approve", "done", "not_ready"),
            ],
        }
    }

    #[test]
    fn test_valid_plan_with_rework_loop() {
        assert!(validate_plan(&valid_plan()).is_empty());
        assert!(valid_plan().validate().is_ok());
    }

    #[test]
    fn test_cycle_over_forward_edges_rejected() {
        let mut plan = valid_plan();
        plan.edges.retain(|e| e.condition != EdgeCondition::Rework);
        plan.edges.push(PlanEdge::always("fix", "draft"));
        let violations = validate_plan(&plan);
        assert!(violations.contains(&PlanViolation::Cycle {
            trace: vec!["draft".into(), "review".into(), "fix".into(), "draft".into()],
        }));
    }

    #[test]
    fn test_gate_coverage_violations_collected() {
        let mut plan = valid_plan();
        plan.edges.retain(|e| e.condition != EdgeCondition::Option { option_id: "not_ready".into() });
        plan.edges.push(PlanEdge::option("approve", "done", "redirect"));
        plan.edges.push(PlanEdge::always("approve", "done"));
        let violations = validate_plan(&plan);
        assert!(violations.contains(&PlanViolation::OptionCoverage {
            node_id: "approve".into(),
            option_id: "not_ready".into(),
            edges: 0,
        }));
        assert!(violations.contains(&PlanViolation::UndeclaredOption {
            node_id: "approve".into(),
            option_id: "redirect".into(),
        }));
        assert!(violations.contains(&PlanViolation::NonOptionEdge {
            node_id: "approve".into(),
            to: "done".into(),
        }));
    }

    #[test]
    fn test_structural_violations() {
        let plan = WorkflowPlan {
            id: "bad".into(),
            version: 1,
            entry_node: "start".into(),
            nodes: vec![task("a"), task("a"), qa("q"), gate("g", &[]), end("e")],
            edges: vec![
                PlanEdge::always("a", "q"),
                PlanEdge::qa_passed("q", "e"),
                PlanEdge::rework("a", "e"),
                PlanEdge::always("e", "ghost"),
            ],
        };
        let violations = validate_plan(&plan);
        assert!(violations.contains(&PlanViolation::DuplicateNode { node_id: "a".into() }));
        assert!(violations.contains(&PlanViolation::MissingEntry {
            entry_node: "start".into()
        }));
        assert!(violations.contains(&PlanViolation::UnknownEdgeEndpoint {
            from: "e".into(),
            to: "ghost".into(),
            missing: "ghost".into(),
        }));
        assert!(violations.contains(&PlanViolation::NoOptions { node_id: "g".into() }));
        assert!(violations.contains(&PlanViolation::QaRouting {
            node_id: "q".into(),
            passed: 1,
            failed: 0,
        }));
        assert!(violations.contains(&PlanViolation::ReworkTarget {
            from: "a".into(),
            to: "e".into(),
        }));
        assert!(violations.contains(&PlanViolation::EndHasEdges { node_id: "e".into() }));
    }

    #[test]
    fn test_rework_from_passed_branch_rejected() {
        let mut plan = valid_plan();
        plan.nodes.push(task("polish"));
        plan.edges.retain(|e| e.from != "review" || e.condition != EdgeCondition::QaPassed);
        plan.edges.push(PlanEdge::qa_passed("review", "polish"));
        plan.edges.push(PlanEdge::rework("polish", "review"));

        let violations = validate_plan(&plan);
        assert_eq!(
            violations,
            vec![PlanViolation::ReworkNotOnFailedPath {
                from: "polish".into(),
                to: "review".into(),
            }]
        );
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_rework_after_several_remediation_steps_allowed() {
        let mut plan = valid_plan();
        plan.nodes.push(task("recheck"));
        plan.edges.retain(|e| e.condition != EdgeCondition::Rework);
        plan.edges.push(PlanEdge::always("fix", "recheck"));
        plan.edges.push(PlanEdge::rework("recheck", "review"));
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn test_follow_matches_condition() {
        let plan = valid_plan();
        let edge = plan.follow("review", &EdgeCondition::QaFailed).unwrap();
        assert_eq!(edge.to, "fix");
        assert!(plan.follow("draft", &EdgeCondition::Rework).is_none());
    }

    #[test]
    fn test_end_without_governance_needs_choice_node() {
        let plan = WorkflowPlan {
            id: "auto".into(),
            version: 1,
            entry_node: "draft".into(),
            nodes: vec![task("draft"), end("done")],
            edges: vec![PlanEdge::always("draft", "done")],
        };
        assert_eq!(
            validate_plan(&plan),
            vec![PlanViolation::UnresolvableGovernance {
                node_id: "done".into()
            }]
        );

        let err = plan.validate().unwrap_err();
        assert!(matches!(err, ScriptoriumError::MalformedPlan { violations } if violations.len() == 1));
    }

    #[test]
    fn test_option_governance_fallback() {
        assert_eq!(
            GateOption::new("qualified", "Ship it").governance(),
            Some(GovernanceOutcome::Qualified)
        );
        assert_eq!(GateOption::new("revise", "Revise").governance(), None);
        let pinned = GateOption {
            id: "ship".into(),
            label: "Ship".into(),
            governance: Some(GovernanceOutcome::Redirect),
        };
        assert_eq!(pinned.governance(), Some(GovernanceOutcome::Redirect));
    }

    #[test]
    fn test_plan_json_shape() {
        let json = r#"{
            "id": "doc",
            "entry_node": "g",
            "nodes": [
                {"id": "g", "kind": {"type": "gate", "prompt": "Pick", "available_options": [{"id": "qualified"}]}},
                {"id": "e", "station": {"id": "wrap", "label": "Wrap up", "order": 3}, "kind": {"type": "end"}}
            ],
            "edges": [{"from": "g", "to": "e", "condition": {"type": "option", "option_id": "qualified"}}]
        }"#;
        let plan: WorkflowPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.version, 1);
        assert!(validate_plan(&plan).is_empty());
        assert_eq!(plan.node("e").unwrap().station.as_ref().unwrap().order, 3);
    }
}
