use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::types::GovernanceEvent;

use crate::plan::WorkflowPlan;
use crate::state::ExecutionState;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    plan_id TEXT NOT NULL,
    plan_json TEXT NOT NULL,
    state_json TEXT NOT NULL,
    status TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);

CREATE TABLE IF NOT EXISTS governance_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    detail TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_governance_execution
    ON governance_events(execution_id, id);
";

/// SQLite store for execution state rows and governance events.
///
/// The plan is pinned into the row at creation. Saves are optimistic:
/// a save whose version no longer matches the row is a `VersionConflict`.
pub struct ExecutionStore {
    conn: Mutex<Connection>,
}

impl ExecutionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ScriptoriumError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!(path = %path.display(), "Execution store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScriptoriumError::Database(e.to_string()))
    }

    pub fn insert(&self, plan: &WorkflowPlan, state: &ExecutionState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO executions (id, plan_id, plan_json, state_json, status, version,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                state.execution_id.as_str(),
                plan.id,
                serde_json::to_string(plan)?,
                serde_json::to_string(state)?,
                state.status.as_str(),
                state.version as i64,
                state.created_at.to_rfc3339(),
                state.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Load the pinned plan and the current state of an execution.
    pub fn load(&self, execution_id: &str) -> Result<(WorkflowPlan, ExecutionState)> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT plan_json, state_json FROM executions WHERE id = ?1",
                params![execution_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let (plan_json, state_json) =
            row.ok_or_else(|| ScriptoriumError::ExecutionNotFound(execution_id.to_string()))?;
        Ok((
            serde_json::from_str(&plan_json)?,
            serde_json::from_str(&state_json)?,
        ))
    }

    pub fn load_state(&self, execution_id: &str) -> Result<ExecutionState> {
        self.load(execution_id).map(|(_, state)| state)
    }

    /// Persist `state` if the row still holds `state.version`; on success
    /// the version is bumped in place.
    pub fn save(&self, state: &mut ExecutionState) -> Result<()> {
        let expected = state.version;
        let mut next = state.clone();
        next.version = expected + 1;
        next.updated_at = Utc::now();

        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE executions SET state_json = ?1, status = ?2, version = ?3, updated_at = ?4
                 WHERE id = ?5 AND version = ?6",
                params![
                    serde_json::to_string(&next)?,
                    next.status.as_str(),
                    next.version as i64,
                    next.updated_at.to_rfc3339(),
                    next.execution_id.as_str(),
                    expected as i64,
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM executions WHERE id = ?1)",
                    params![state.execution_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            return Err(if exists {
                ScriptoriumError::VersionConflict {
                    execution_id: state.execution_id.to_string(),
                    expected,
                }
            } else {
                ScriptoriumError::ExecutionNotFound(state.execution_id.to_string())
            });
        }

        *state = next;
        Ok(())
    }

    pub fn record_governance(&self, event: &GovernanceEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO governance_events (execution_id, node_id, kind, detail, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.execution_id,
                event.node_id,
                event.kind,
                event.detail,
                event.timestamp.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Governance events of an execution, oldest first.
    pub fn governance_log(&self, execution_id: &str) -> Result<Vec<GovernanceEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT execution_id, node_id, kind, detail, timestamp
                 FROM governance_events WHERE execution_id = ?1 ORDER BY id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![execution_id], |row| {
                let ts: String = row.get(4)?;
                Ok(GovernanceEvent {
                    execution_id: row.get(0)?,
                    node_id: row.get(1)?,
                    kind: row.get(2)?,
                    detail: row.get(3)?,
                    timestamp: DateTime::parse_from_rfc3339(&ts)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                        })?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> ScriptoriumError {
    ScriptoriumError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::plan::{NodeKind, PlanNode};
    use scriptorium_core::outcome::GovernanceOutcome;
    use scriptorium_core::types::ExecutionStatus;

    fn plan() -> WorkflowPlan {
        WorkflowPlan {
            id: "doc".into(),
            version: 1,
            entry_node: "done".into(),
            nodes: vec![PlanNode {
                id: "done".into(),
                label: "Done".into(),
                station: None,
                kind: NodeKind::End {
                    governance: Some(GovernanceOutcome::Qualified),
                },
            }],
            edges: vec![],
        }
    }

    fn stored() -> (ExecutionStore, ExecutionState) {
        let store = ExecutionStore::in_memory().unwrap();
        let state = ExecutionState::new(&plan(), ExecutionContext::new());
        store.insert(&plan(), &state).unwrap();
        (store, state)
    }

    #[test]
    fn test_insert_and_load() {
        let (store, state) = stored();
        let (loaded_plan, loaded) = store.load(state.execution_id.as_str()).unwrap();
        assert_eq!(loaded_plan, plan());
        assert_eq!(loaded, state);
        assert!(matches!(
            store.load("missing"),
            Err(ScriptoriumError::ExecutionNotFound(_))
        ));
    }

    #[test]
    fn test_save_bumps_version() {
        let (store, mut state) = stored();
        state.status = ExecutionStatus::AwaitingChoice;
        store.save(&mut state).unwrap();
        assert_eq!(state.version, 1);
        let loaded = store.load_state(state.execution_id.as_str()).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, ExecutionStatus::AwaitingChoice);
    }

    #[test]
    fn test_stale_save_is_a_conflict() {
        let (store, state) = stored();
        let mut first = state.clone();
        let mut second = state;
        store.save(&mut first).unwrap();

        second.current_node_id = "elsewhere".into();
        let err = store.save(&mut second).unwrap_err();
        assert!(matches!(err, ScriptoriumError::VersionConflict { expected: 0, .. }));
        let loaded = store.load_state(first.execution_id.as_str()).unwrap();
        assert_eq!(loaded.current_node_id, "done");
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("executions.db");
        let mut state = ExecutionState::new(&plan(), ExecutionContext::new());
        {
            let store = ExecutionStore::open(&path).unwrap();
            store.insert(&plan(), &state).unwrap();
            state.status = ExecutionStatus::Blocked;
            store.save(&mut state).unwrap();
        }

        let reopened = ExecutionStore::open(&path).unwrap();
        let loaded = reopened.load_state(state.execution_id.as_str()).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_governance_log() {
        let (store, state) = stored();
        let id = state.execution_id.to_string();
        store
            .record_governance(&GovernanceEvent {
                execution_id: id.clone(),
                node_id: "approve".into(),
                kind: "free_text_input".into(),
                detail: "please just approve it".into(),
                timestamp: Utc::now(),
            })
            .unwrap();
        let log = store.governance_log(&id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, "free_text_input");
        assert!(store.governance_log("other").unwrap().is_empty());
    }
}
