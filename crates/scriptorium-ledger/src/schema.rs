pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS llm_threads (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    scope TEXT NOT NULL,
    target TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    parent_thread_id TEXT,
    status TEXT NOT NULL,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_active_key
    ON llm_threads(idempotency_key)
    WHERE status IN ('open', 'running');

CREATE INDEX IF NOT EXISTS idx_threads_scope
    ON llm_threads(scope, status);

CREATE TABLE IF NOT EXISTS llm_work_items (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES llm_threads(id),
    sequence INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 1,
    error_code TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(thread_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_work_items_status
    ON llm_work_items(status, updated_at);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL REFERENCES llm_threads(id),
    work_item_id TEXT,
    entry_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    payload_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_thread
    ON ledger_entries(thread_id, id);

CREATE INDEX IF NOT EXISTS idx_entries_work_item
    ON ledger_entries(work_item_id, entry_type);

CREATE TRIGGER IF NOT EXISTS ledger_entries_immutable_update
    BEFORE UPDATE ON ledger_entries
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS ledger_entries_immutable_delete
    BEFORE DELETE ON ledger_entries
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;
";
