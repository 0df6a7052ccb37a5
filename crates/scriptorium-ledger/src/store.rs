use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use scriptorium_core::error::{Result, ScriptoriumError};
use scriptorium_core::types::{new_id, ErrorCode, ThreadStatus, WorkItemStatus};

use crate::key::IdempotencyKey;
use crate::model::{EntryType, LedgerEntry, LlmThread, ThreadSpec, WorkItem, WorkOutcome};
use crate::schema::SCHEMA;

const THREAD_COLUMNS: &str = "id, kind, scope, target, status, idempotency_key, parent_thread_id, \
                              cancel_requested, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, thread_id, sequence, status, attempt, error_code, created_at, updated_at";
const ENTRY_COLUMNS: &str =
    "id, thread_id, work_item_id, entry_type, payload, payload_hash, created_at";

/// SQLite-backed durable execution ledger.
///
/// Every state change is a single conditional UPDATE inside an immediate
/// transaction, so the ledger stays correct when several processes share
/// one database file.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create a ledger database at the given path.
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

        debug!(path = %path.display(), "Ledger opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory ledger (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScriptoriumError::Database(e.to_string()))
    }

    // ── Threads ──────────────────────────────────────────────────

    /// Return the active thread for the idempotency key of `spec`, or create one.
    ///
    /// With `force`, an `open` thread is cancelled and replaced. A `running`
    /// thread is never preempted and is returned as-is. The boolean is true
    /// when a new thread was created.
    pub fn get_or_create_thread(&self, spec: &ThreadSpec, force: bool) -> Result<(LlmThread, bool)> {
        let key = spec.idempotency_key();
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        if let Some(existing) = find_active(&tx, &key)? {
            if !force {
                tx.commit().map_err(db_err)?;
                return Ok((existing, false));
            }
            if existing.status == ThreadStatus::Running {
                debug!(thread_id = %existing.id, "Forced request found running thread; reusing");
                tx.commit().map_err(db_err)?;
                return Ok((existing, false));
            }
            info!(thread_id = %existing.id, "Cancelling open thread for forced replacement");
            close_open_thread(&tx, &existing.id, ThreadStatus::Cancelled, now)?;
        }

        let id = new_id();
        let inserted = tx.execute(
            "INSERT INTO llm_threads (id, kind, scope, target, status, idempotency_key,
                                      parent_thread_id, cancel_requested, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, 0, ?7, ?7)",
            params![
                id,
                spec.kind,
                spec.scope,
                spec.target,
                key.as_str(),
                spec.parent_thread_id,
                ts(now)
            ],
        );

        match inserted {
            Ok(_) => {
                let thread = query_thread(&tx, &id)?;
                tx.commit().map_err(db_err)?;
                debug!(thread_id = %thread.id, kind = %thread.kind, "Thread opened");
                Ok((thread, true))
            }
            Err(e) if is_constraint_violation(&e) => {
                // Another writer won the key between our read and insert.
                let existing = find_active(&tx, &key)?
                    .ok_or_else(|| ScriptoriumError::Database(e.to_string()))?;
                tx.commit().map_err(db_err)?;
                Ok((existing, false))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    pub fn get_thread(&self, thread_id: &str) -> Result<LlmThread> {
        let conn = self.conn()?;
        query_thread(&conn, thread_id)
    }

    /// The `open`/`running` thread holding a key, if any.
    pub fn find_active_thread(&self, key: &IdempotencyKey) -> Result<Option<LlmThread>> {
        let conn = self.conn()?;
        find_active(&conn, key)
    }

    /// Open and running threads within a scope, oldest first.
    pub fn list_active_threads(&self, scope: &str) -> Result<Vec<LlmThread>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {THREAD_COLUMNS} FROM llm_threads
                 WHERE scope = ?1 AND status IN ('open', 'running')
                 ORDER BY created_at ASC, id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![scope], thread_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Cancel an `open` thread.
    ///
    /// A `running` thread cannot be interrupted: its cancel flag is set so
    /// the in-flight item is not continued, and `Locked` is returned.
    pub fn cancel_thread(&self, thread_id: &str) -> Result<LlmThread> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let thread = query_thread(&tx, thread_id)?;

        match thread.status {
            ThreadStatus::Open => {
                close_open_thread(&tx, thread_id, ThreadStatus::Cancelled, now)?;
                let thread = query_thread(&tx, thread_id)?;
                tx.commit().map_err(db_err)?;
                info!(thread_id, "Thread cancelled");
                Ok(thread)
            }
            ThreadStatus::Running => {
                tx.execute(
                    "UPDATE llm_threads SET cancel_requested = 1, updated_at = ?1 WHERE id = ?2",
                    params![ts(now), thread_id],
                )
                .map_err(db_err)?;
                tx.commit().map_err(db_err)?;
                warn!(thread_id, "Cancel requested on running thread");
                Err(ScriptoriumError::Locked(format!(
                    "thread {} is running; cancel requested",
                    thread_id
                )))
            }
            other => Err(illegal("thread", thread_id, other.as_str(), "cancelled")),
        }
    }

    // ── Work items ───────────────────────────────────────────────

    /// Append a queued work item to an open thread.
    pub fn enqueue_work(&self, thread_id: &str) -> Result<WorkItem> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let thread = query_thread(&tx, thread_id)?;
        if thread.status != ThreadStatus::Open {
            return Err(illegal("thread", thread_id, thread.status.as_str(), "enqueue"));
        }

        let sequence: u32 = tx
            .query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM llm_work_items WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let id = new_id();
        tx.execute(
            "INSERT INTO llm_work_items (id, thread_id, sequence, status, attempt, error_code,
                                         created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', 1, NULL, ?4, ?4)",
            params![id, thread_id, sequence, ts(now)],
        )
        .map_err(db_err)?;
        let item = query_item(&tx, &id)?;
        tx.commit().map_err(db_err)?;
        debug!(work_item_id = %item.id, thread_id, sequence, "Work item queued");
        Ok(item)
    }

    pub fn get_work_item(&self, work_item_id: &str) -> Result<WorkItem> {
        let conn = self.conn()?;
        query_item(&conn, work_item_id)
    }

    /// All work items of a thread in sequence order.
    pub fn work_items(&self, thread_id: &str) -> Result<Vec<WorkItem>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM llm_work_items WHERE thread_id = ?1 ORDER BY sequence ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![thread_id], item_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn latest_work_item(&self, thread_id: &str) -> Result<Option<WorkItem>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM llm_work_items WHERE thread_id = ?1
                 ORDER BY sequence DESC LIMIT 1"
            ),
            params![thread_id],
            item_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    /// Claim a queued work item.
    ///
    /// Compare-and-swap on `status = 'queued'`: among concurrent claimants
    /// exactly one receives `Some`. The owning thread moves to `running`.
    pub fn claim(&self, work_item_id: &str) -> Result<Option<WorkItem>> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let changed = tx
            .execute(
                "UPDATE llm_work_items SET status = 'claimed', updated_at = ?1
                 WHERE id = ?2 AND status = 'queued'
                   AND EXISTS (SELECT 1 FROM llm_threads t
                               WHERE t.id = llm_work_items.thread_id
                                 AND t.status IN ('open', 'running')
                                 AND t.cancel_requested = 0)",
                params![ts(now), work_item_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            tx.commit().map_err(db_err)?;
            return Ok(None);
        }

        let item = query_item(&tx, work_item_id)?;
        tx.execute(
            "UPDATE llm_threads SET status = 'running', updated_at = ?1
             WHERE id = ?2 AND status = 'open'",
            params![ts(now), item.thread_id],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        debug!(work_item_id, attempt = item.attempt, "Work item claimed");
        Ok(Some(item))
    }

    /// Move a claimed item to `running` right before the provider call.
    pub fn start(&self, work_item_id: &str) -> Result<WorkItem> {
        let now = Utc::now();
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE llm_work_items SET status = 'running', updated_at = ?1
                 WHERE id = ?2 AND status = 'claimed'",
                params![ts(now), work_item_id],
            )
            .map_err(db_err)?;
        let item = query_item(&conn, work_item_id)?;
        if changed == 0 {
            return Err(illegal("work item", work_item_id, item.status.as_str(), "running"));
        }
        Ok(item)
    }

    /// Settle an in-flight work item and summarize its thread.
    ///
    /// `Applied` completes the thread. A retryable failure leaves the thread
    /// `open` so the item can be requeued; a terminal failure fails it. A
    /// thread with a pending cancel request is closed `cancelled` on failure.
    pub fn complete(&self, work_item_id: &str, outcome: WorkOutcome) -> Result<WorkItem> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let item = query_item(&tx, work_item_id)?;
        let (status, code) = match outcome {
            WorkOutcome::Applied => (WorkItemStatus::Applied, None),
            WorkOutcome::Failed(code) => (WorkItemStatus::Failed, Some(code)),
        };
        if !item.status.is_in_flight() {
            return Err(illegal("work item", work_item_id, item.status.as_str(), status.as_str()));
        }

        tx.execute(
            "UPDATE llm_work_items SET status = ?1, error_code = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ('claimed', 'running')",
            params![status.as_str(), code.map(ErrorCode::as_str), ts(now), work_item_id],
        )
        .map_err(db_err)?;

        let thread = query_thread(&tx, &item.thread_id)?;
        let thread_status = match outcome {
            WorkOutcome::Applied => ThreadStatus::Completed,
            WorkOutcome::Failed(_) if thread.cancel_requested => ThreadStatus::Cancelled,
            WorkOutcome::Failed(code) if code.is_retryable() => ThreadStatus::Open,
            WorkOutcome::Failed(_) => ThreadStatus::Failed,
        };
        set_thread_status(&tx, &item.thread_id, thread_status, now)?;

        let item = query_item(&tx, work_item_id)?;
        tx.commit().map_err(db_err)?;
        debug!(work_item_id, status = %item.status, thread_status = %thread_status, "Work item settled");
        Ok(item)
    }

    /// Retry a failed work item.
    ///
    /// A retryable failure below `max_attempts` goes back to `queued` with
    /// `attempt + 1`; anything else is dead-lettered and fails the thread.
    /// The returned item carries the resulting status.
    pub fn requeue(&self, work_item_id: &str, max_attempts: u32) -> Result<WorkItem> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let item = query_item(&tx, work_item_id)?;
        if item.status != WorkItemStatus::Failed {
            return Err(illegal("work item", work_item_id, item.status.as_str(), "queued"));
        }
        let thread = query_thread(&tx, &item.thread_id)?;
        if thread.status == ThreadStatus::Cancelled {
            return Err(ScriptoriumError::Cancelled(thread.id));
        }
        if thread.status != ThreadStatus::Open {
            return Err(illegal("thread", &thread.id, thread.status.as_str(), "open"));
        }

        let retryable = item.error_code.map(ErrorCode::is_retryable).unwrap_or(false);
        if retryable && item.attempt < max_attempts {
            tx.execute(
                "UPDATE llm_work_items SET status = 'queued', attempt = attempt + 1, updated_at = ?1
                 WHERE id = ?2 AND status = 'failed'",
                params![ts(now), work_item_id],
            )
            .map_err(db_err)?;
            info!(work_item_id, attempt = item.attempt + 1, "Work item requeued");
        } else {
            tx.execute(
                "UPDATE llm_work_items SET status = 'dead_letter', updated_at = ?1
                 WHERE id = ?2 AND status = 'failed'",
                params![ts(now), work_item_id],
            )
            .map_err(db_err)?;
            set_thread_status(&tx, &item.thread_id, ThreadStatus::Failed, now)?;
            warn!(work_item_id, attempts = item.attempt, "Work item dead-lettered");
        }

        let item = query_item(&tx, work_item_id)?;
        tx.commit().map_err(db_err)?;
        Ok(item)
    }

    // ── Entries ──────────────────────────────────────────────────

    /// Append an immutable entry. The payload hash is SHA-256 over the
    /// stored JSON text.
    pub fn record(
        &self,
        thread_id: &str,
        work_item_id: Option<&str>,
        entry_type: EntryType,
        payload: &serde_json::Value,
    ) -> Result<LedgerEntry> {
        let text = serde_json::to_string(payload)?;
        let hash = hash_payload(&text);
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ledger_entries (thread_id, work_item_id, entry_type, payload,
                                         payload_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![thread_id, work_item_id, entry_type.as_str(), text, hash, ts(now)],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        Ok(LedgerEntry {
            id,
            thread_id: thread_id.to_string(),
            work_item_id: work_item_id.map(str::to_string),
            entry_type,
            payload: payload.clone(),
            payload_hash: hash,
            created_at: now,
        })
    }

    /// Entries of a thread in append order.
    pub fn entries(&self, thread_id: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE thread_id = ?1 ORDER BY id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![thread_id], entry_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Recompute the hash of a stored entry and compare it with the
    /// recorded one.
    pub fn verify_entry(&self, entry_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let (text, hash): (String, String) = conn
            .query_row(
                "SELECT payload, payload_hash FROM ledger_entries WHERE id = ?1",
                params![entry_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;
        Ok(hash_payload(&text) == hash)
    }

    /// The response of the applied work item for a key, if paid work for it
    /// already succeeded.
    pub fn applied_response(&self, key: &IdempotencyKey) -> Result<Option<LedgerEntry>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT e.id, e.thread_id, e.work_item_id, e.entry_type, e.payload, e.payload_hash,
                    e.created_at
             FROM ledger_entries e
             JOIN llm_work_items w ON w.id = e.work_item_id
             JOIN llm_threads t ON t.id = w.thread_id
             WHERE t.idempotency_key = ?1 AND w.status = 'applied' AND e.entry_type = 'response'
             ORDER BY e.id DESC LIMIT 1",
            params![key.as_str()],
            entry_from_row,
        )
        .optional()
        .map_err(db_err)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

pub(crate) fn db_err(e: rusqlite::Error) -> ScriptoriumError {
    ScriptoriumError::Database(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn illegal(entity: &'static str, id: &str, from: &str, to: &str) -> ScriptoriumError {
    ScriptoriumError::IllegalTransition {
        entity,
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Fixed-width UTC timestamps so that text comparison orders correctly.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn hash_payload(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_col<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<LlmThread> {
    let status: String = row.get(4)?;
    let created: String = row.get(8)?;
    let updated: String = row.get(9)?;
    Ok(LlmThread {
        id: row.get(0)?,
        kind: row.get(1)?,
        scope: row.get(2)?,
        target: row.get(3)?,
        status: parse_col(4, &status)?,
        idempotency_key: row.get(5)?,
        parent_thread_id: row.get(6)?,
        cancel_requested: row.get::<_, i64>(7)? != 0,
        created_at: parse_ts(8, &created)?,
        updated_at: parse_ts(9, &updated)?,
    })
}

pub(crate) fn item_from_row(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let status: String = row.get(3)?;
    let code: Option<String> = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(WorkItem {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        sequence: row.get(2)?,
        status: parse_col(3, &status)?,
        attempt: row.get(4)?,
        error_code: code.as_deref().map(|c| parse_col(5, c)).transpose()?,
        created_at: parse_ts(6, &created)?,
        updated_at: parse_ts(7, &updated)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let entry_type: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let created: String = row.get(6)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        work_item_id: row.get(2)?,
        entry_type: parse_col(3, &entry_type)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        payload_hash: row.get(5)?,
        created_at: parse_ts(6, &created)?,
    })
}

pub(crate) fn query_thread(conn: &Connection, thread_id: &str) -> Result<LlmThread> {
    conn.query_row(
        &format!("SELECT {THREAD_COLUMNS} FROM llm_threads WHERE id = ?1"),
        params![thread_id],
        thread_from_row,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| ScriptoriumError::ThreadNotFound(thread_id.to_string()))
}

pub(crate) fn query_item(conn: &Connection, work_item_id: &str) -> Result<WorkItem> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM llm_work_items WHERE id = ?1"),
        params![work_item_id],
        item_from_row,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| ScriptoriumError::WorkItemNotFound(work_item_id.to_string()))
}

fn find_active(conn: &Connection, key: &IdempotencyKey) -> Result<Option<LlmThread>> {
    conn.query_row(
        &format!(
            "SELECT {THREAD_COLUMNS} FROM llm_threads
             WHERE idempotency_key = ?1 AND status IN ('open', 'running')"
        ),
        params![key.as_str()],
        thread_from_row,
    )
    .optional()
    .map_err(db_err)
}

pub(crate) fn set_thread_status(
    conn: &Connection,
    thread_id: &str,
    status: ThreadStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE llm_threads SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), ts(now), thread_id],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Close an open thread: its queued items are failed and the thread takes
/// the given terminal status.
fn close_open_thread(
    conn: &Connection,
    thread_id: &str,
    status: ThreadStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE llm_work_items SET status = 'failed', updated_at = ?1
         WHERE thread_id = ?2 AND status = 'queued'",
        params![ts(now), thread_id],
    )
    .map_err(db_err)?;
    let changed = conn
        .execute(
            "UPDATE llm_threads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'open'",
            params![status.as_str(), ts(now), thread_id],
        )
        .map_err(db_err)?;
    if changed == 0 {
        let thread = query_thread(conn, thread_id)?;
        return Err(illegal("thread", thread_id, thread.status.as_str(), status.as_str()));
    }
    Ok(())
}
