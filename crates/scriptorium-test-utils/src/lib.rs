//! Test doubles and fixtures shared by Scriptorium's scenario tests.

pub mod fixtures;
pub mod provider;
pub mod sink;

pub use fixtures::{document_plan, fast_config, sample_backlog, temp_db, verdict};
pub use provider::ScriptedProvider;
pub use sink::{drain, RecordingSink};
