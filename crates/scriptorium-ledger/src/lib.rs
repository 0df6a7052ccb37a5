//! Durable Execution Ledger.
//!
//! Paid LLM work is modelled as three layers:
//!
//! - `LlmThread`: one semantic intent, deduplicated by idempotency key
//!   (at most one `open`/`running` thread per key, enforced by a partial
//!   unique index).
//! - `WorkItem`: one claimable attempt inside a thread. Claiming is a
//!   compare-and-swap on `status = 'queued'`; exactly one claimant wins.
//! - `LedgerEntry`: an append-only, content-hashed record of what actually
//!   happened. Status columns summarize; entries are authoritative.

pub mod key;
pub mod model;
pub mod recovery;
pub mod retry;
mod schema;
pub mod store;

pub use key::IdempotencyKey;
pub use model::{EntryType, LedgerEntry, LlmThread, ThreadSpec, WorkItem, WorkOutcome};
pub use recovery::RecoveryReport;
pub use retry::RetryPolicy;
pub use store::SqliteLedger;
