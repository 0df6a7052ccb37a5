use std::collections::{BTreeSet, HashMap, VecDeque};

use scriptorium_core::types::{EngineEvent, Station, StationState};

use crate::plan::{EdgeCondition, WorkflowPlan};

/// Resolves each node to a visible station and turns node moves into
/// station events.
pub struct StationTracker {
    declared: Vec<Station>,
    by_node: HashMap<String, Station>,
}

impl StationTracker {
    pub fn new(plan: &WorkflowPlan) -> Self {
        let mut declared: Vec<Station> = Vec::new();
        for node in &plan.nodes {
            if let Some(station) = &node.station {
                if !declared.iter().any(|s| s.id == station.id) {
                    declared.push(station.clone());
                }
            }
        }
        declared.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

        let by_node = plan
            .nodes
            .iter()
            .filter_map(|n| resolve_station(plan, &n.id).map(|s| (n.id.clone(), s)))
            .collect();

        Self { declared, by_node }
    }

    /// Stations in display order.
    pub fn declared(&self) -> &[Station] {
        &self.declared
    }

    pub fn station_of(&self, node_id: &str) -> Option<&Station> {
        self.by_node.get(node_id)
    }

    /// Events for entering the first node of an execution.
    pub fn start(&self, execution_id: &str, entry_node: &str) -> Vec<EngineEvent> {
        let mut events = vec![EngineEvent::StationsDeclared {
            execution_id: execution_id.to_string(),
            stations: self.declared.clone(),
        }];
        if let Some(station) = self.station_of(entry_node) {
            events.push(changed(execution_id, &station.id, StationState::Active));
        }
        events
    }

    /// Events for moving between two nodes. Nothing is emitted when both
    /// resolve to the same station. Moving back to an earlier station
    /// returns the left one to `pending`; moving forward completes it.
    pub fn transition(&self, execution_id: &str, from_node: &str, to_node: &str) -> Vec<EngineEvent> {
        let from = self.station_of(from_node);
        let to = self.station_of(to_node);
        if from.map(|s| &s.id) == to.map(|s| &s.id) {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(left) = from {
            let state = match to {
                Some(entered) if entered.order < left.order => StationState::Pending,
                _ => StationState::Complete,
            };
            events.push(changed(execution_id, &left.id, state));
        }
        if let Some(entered) = to {
            events.push(changed(execution_id, &entered.id, StationState::Active));
        }
        events
    }

    /// Event settling the station of `node_id` into a final state.
    pub fn settle(&self, execution_id: &str, node_id: &str, state: StationState) -> Option<EngineEvent> {
        self.station_of(node_id)
            .map(|station| changed(execution_id, &station.id, state))
    }
}

fn changed(execution_id: &str, station_id: &str, state: StationState) -> EngineEvent {
    EngineEvent::StationChanged {
        execution_id: execution_id.to_string(),
        station_id: station_id.to_string(),
        state,
    }
}

/// The node's own station, or the station of the nearest ancestor reached
/// backwards over forward edges. Predecessors are searched breadth-first
/// in id order, so the answer is deterministic.
pub fn resolve_station(plan: &WorkflowPlan, node_id: &str) -> Option<Station> {
    let mut queue = VecDeque::from([node_id.to_string()]);
    let mut seen = BTreeSet::from([node_id.to_string()]);

    while let Some(current) = queue.pop_front() {
        if let Some(station) = plan.node(&current).and_then(|n| n.station.clone()) {
            return Some(station);
        }
        let predecessors: BTreeSet<&str> = plan
            .edges
            .iter()
            .filter(|e| e.to == current && e.condition != EdgeCondition::Rework)
            .map(|e| e.from.as_str())
            .collect();
        for pred in predecessors {
            if seen.insert(pred.to_string()) {
                queue.push_back(pred.to_string());
            }
        }
    }
    None
}
