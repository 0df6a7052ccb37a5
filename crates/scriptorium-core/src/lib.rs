pub mod config;
pub mod error;
pub mod event;
pub mod outcome;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, ScriptoriumError};
pub use event::EventBus;
pub use outcome::{GovernanceOutcome, TerminalOutcome};
pub use types::*;
