//! Graph Compiler: turns an LLM-authored backlog into a deterministic,
//! validated execution order.
//!
//! Every function here is pure: no I/O, no clock, no randomness, and no
//! language model. The same backlog always yields the same violations,
//! cycle traces, order, waves, and hash, regardless of input order.
//!
//! ```text
//! items ──validate_dependencies──┐
//!       ──validate_hierarchy─────┼──> violations (complete list)
//!       ──detect_dependency_cycles┘
//!       ──order_backlog / compute_waves──> ids, waves
//!       ──compute_backlog_hash──> sha256 hex
//! derive_execution_plan = all of the above -> ExecutionPlan
//! ```

pub mod cycles;
pub mod error;
pub mod hash;
pub mod item;
pub mod order;
pub mod plan;
pub mod validate;

pub use cycles::{detect_dependency_cycles, find_cycles};
pub use error::{BacklogViolation, CompileError};
pub use hash::compute_backlog_hash;
pub use item::{BacklogItem, Hierarchy};
pub use order::{compute_waves, order_backlog};
pub use plan::{derive_execution_plan, ExecutionPlan, PlanRefs, GENERATOR_VERSION};
pub use validate::{validate_backlog, validate_dependencies, validate_hierarchy};
