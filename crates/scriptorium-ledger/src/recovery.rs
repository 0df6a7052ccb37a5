use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scriptorium_core::error::Result;
use scriptorium_core::types::{ErrorCode, ThreadStatus, WorkItemStatus};

use crate::store::{db_err, item_from_row, query_thread, set_thread_status, ts, SqliteLedger};

/// What a stale sweep did, by work item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Response already recorded; marked applied instead of repeating paid work.
    pub applied: Vec<String>,
    pub requeued: Vec<String>,
    pub dead_lettered: Vec<String>,
    /// In-flight items of threads with a cancel request; closed without retry.
    pub cancelled: Vec<String>,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.applied.len() + self.requeued.len() + self.dead_lettered.len() + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl SqliteLedger {
    /// Sweep `claimed`/`running` items whose last update is older than
    /// `now - threshold`.
    ///
    /// An item with a recorded `response` entry is marked `applied` and its
    /// thread completed. Otherwise it is requeued with `attempt + 1`, or
    /// dead-lettered once `max_attempts` is reached.
    pub fn recover_stale(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
        max_attempts: u32,
    ) -> Result<RecoveryReport> {
        let cutoff = ts(now - threshold);
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let stale = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, thread_id, sequence, status, attempt, error_code, created_at, updated_at
                     FROM llm_work_items
                     WHERE status IN ('claimed', 'running') AND updated_at < ?1
                     ORDER BY updated_at ASC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![cutoff], item_from_row)
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?
        };

        let mut report = RecoveryReport::default();
        for item in stale {
            let has_response: bool = tx
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM ledger_entries
                                    WHERE work_item_id = ?1 AND entry_type = 'response')",
                    params![item.id],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let thread = query_thread(&tx, &item.thread_id)?;

            let (item_status, thread_status, attempt) = if has_response {
                report.applied.push(item.id.clone());
                (WorkItemStatus::Applied, ThreadStatus::Completed, item.attempt)
            } else if thread.cancel_requested {
                report.cancelled.push(item.id.clone());
                (WorkItemStatus::Failed, ThreadStatus::Cancelled, item.attempt)
            } else if item.attempt < max_attempts {
                report.requeued.push(item.id.clone());
                (WorkItemStatus::Queued, ThreadStatus::Open, item.attempt + 1)
            } else {
                report.dead_lettered.push(item.id.clone());
                (WorkItemStatus::DeadLetter, ThreadStatus::Failed, item.attempt)
            };

            let code = match item_status {
                WorkItemStatus::Applied => None,
                _ => Some(ErrorCode::Locked.as_str()),
            };
            tx.execute(
                "UPDATE llm_work_items SET status = ?1, attempt = ?2, error_code = ?3, updated_at = ?4
                 WHERE id = ?5 AND status IN ('claimed', 'running')",
                params![item_status.as_str(), attempt, code, ts(now), item.id],
            )
            .map_err(db_err)?;
            set_thread_status(&tx, &item.thread_id, thread_status, now)?;

            if item_status == WorkItemStatus::DeadLetter {
                warn!(work_item_id = %item.id, attempts = item.attempt, "Stale work item dead-lettered");
            }
        }

        tx.commit().map_err(db_err)?;
        if !report.is_empty() {
            info!(
                applied = report.applied.len(),
                requeued = report.requeued.len(),
                dead_lettered = report.dead_lettered.len(),
                cancelled = report.cancelled.len(),
                "Stale work recovered"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{EntryType, ThreadSpec, WorkOutcome};
    use scriptorium_core::error::ScriptoriumError;

    fn claimed(ledger: &SqliteLedger, target: &str) -> (String, String) {
        let (thread, _) = ledger
            .get_or_create_thread(&ThreadSpec::new("task", "exec-1", target), false)
            .unwrap();
        let item = ledger.enqueue_work(&thread.id).unwrap();
        ledger.claim(&item.id).unwrap().unwrap();
        (thread.id, item.id)
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + Duration::seconds(600)
    }

    #[test]
    fn test_fresh_items_untouched() {
        let ledger = SqliteLedger::in_memory().unwrap();
        claimed(&ledger, "draft#1");
        let report = ledger
            .recover_stale(Utc::now(), Duration::seconds(300), 3)
            .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_stale_item_with_response_is_applied() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (thread_id, item_id) = claimed(&ledger, "draft#1");
        ledger.start(&item_id).unwrap();
        ledger
            .record(&thread_id, Some(&item_id), EntryType::Response, &json!({"text": "paid"}))
            .unwrap();

        let report = ledger.recover_stale(later(), Duration::seconds(300), 3).unwrap();
        assert_eq!(report.applied, vec![item_id.clone()]);
        assert_eq!(
            ledger.get_work_item(&item_id).unwrap().status,
            WorkItemStatus::Applied
        );
        assert_eq!(
            ledger.get_thread(&thread_id).unwrap().status,
            ThreadStatus::Completed
        );
    }

    #[test]
    fn test_stale_item_without_response_is_requeued() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (thread_id, item_id) = claimed(&ledger, "draft#1");

        let report = ledger.recover_stale(later(), Duration::seconds(300), 3).unwrap();
        assert_eq!(report.requeued, vec![item_id.clone()]);
        let item = ledger.get_work_item(&item_id).unwrap();
        assert_eq!(item.status, WorkItemStatus::Queued);
        assert_eq!(item.attempt, 2);
        assert_eq!(ledger.get_thread(&thread_id).unwrap().status, ThreadStatus::Open);

        // Requeued work is claimable again.
        assert!(ledger.claim(&item_id).unwrap().is_some());
    }

    #[test]
    fn test_stale_item_at_bound_is_dead_lettered() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (thread_id, item_id) = claimed(&ledger, "draft#1");

        let report = ledger.recover_stale(later(), Duration::seconds(300), 1).unwrap();
        assert_eq!(report.dead_lettered, vec![item_id.clone()]);
        assert_eq!(
            ledger.get_work_item(&item_id).unwrap().status,
            WorkItemStatus::DeadLetter
        );
        assert_eq!(ledger.get_thread(&thread_id).unwrap().status, ThreadStatus::Failed);
    }

    #[test]
    fn test_unreadable_timestamp_is_an_error() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (_, item_id) = claimed(&ledger, "draft#1");
        ledger
            .conn()
            .unwrap()
            .execute(
                "UPDATE llm_work_items SET updated_at = '1999-99-99 noon' WHERE id = ?1",
                rusqlite::params![item_id],
            )
            .unwrap();

        let err = ledger
            .recover_stale(later(), Duration::seconds(300), 3)
            .unwrap_err();
        assert!(matches!(err, ScriptoriumError::Database(_)));
        assert!(ledger.get_work_item(&item_id).is_err());
    }

    #[test]
    fn test_cancel_requested_thread_is_closed() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (thread_id, item_id) = claimed(&ledger, "draft#1");
        assert!(ledger.cancel_thread(&thread_id).is_err());

        let report = ledger.recover_stale(later(), Duration::seconds(300), 3).unwrap();
        assert_eq!(report.cancelled, vec![item_id]);
        assert_eq!(
            ledger.get_thread(&thread_id).unwrap().status,
            ThreadStatus::Cancelled
        );
    }

    #[test]
    fn test_settled_items_ignored() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let (_, item_id) = claimed(&ledger, "draft#1");
        ledger.complete(&item_id, WorkOutcome::Applied).unwrap();
        let report = ledger.recover_stale(later(), Duration::seconds(300), 3).unwrap();
        assert!(report.is_empty());
    }
}
