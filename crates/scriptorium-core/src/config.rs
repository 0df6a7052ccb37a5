use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScriptoriumError};

/// Top-level Scriptorium configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding threads, work items, ledger entries and executions.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "~/.scriptorium/scriptorium.db".to_string() }

/// Durable execution ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Attempts per work item before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Claimed/running items older than this are swept by recovery.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            stale_after_secs: default_stale_after(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_attempts() -> u32 { 3 }
fn default_stale_after() -> u64 { 300 }

/// Backoff for retryable ledger failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Plan executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rework cycles per QA node before the circuit breaker opens.
    #[serde(default = "default_max_rework")]
    pub max_rework: u32,
    /// Cool-down before a blocked execution may take a half-open retry.
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
    /// Half-open retries allowed before the block is final.
    #[serde(default = "default_half_open_trials")]
    pub half_open_max_trials: u32,
    /// Runaway guard for a single `advance` call.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_advance: usize,
    /// Concurrent provider calls across all executions.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rework: default_max_rework(),
            breaker_cooldown_secs: default_breaker_cooldown(),
            half_open_max_trials: default_half_open_trials(),
            max_steps_per_advance: default_max_steps(),
            workers: default_workers(),
            provider_timeout_secs: default_provider_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_rework() -> u32 { 2 }
fn default_breaker_cooldown() -> u64 { 900 }
fn default_half_open_trials() -> u32 { 1 }
fn default_max_steps() -> usize { 64 }
fn default_workers() -> usize { 4 }
fn default_provider_timeout() -> u64 { 120 }
fn default_event_capacity() -> usize { 256 }

/// Backlog compiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Hierarchy levels, top first.
    #[serde(default = "default_levels")]
    pub levels: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
        }
    }
}

fn default_levels() -> Vec<String> {
    vec!["epic".to_string(), "feature".to_string(), "story".to_string()]
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ScriptoriumError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ScriptoriumError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.max_attempts == 0 {
            return Err(ScriptoriumError::Config(
                "ledger.max_attempts must be at least 1".into(),
            ));
        }
        if self.engine.workers == 0 {
            return Err(ScriptoriumError::Config(
                "engine.workers must be at least 1".into(),
            ));
        }
        if self.compiler.levels.is_empty() {
            return Err(ScriptoriumError::Config(
                "compiler.levels must name at least one level".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the store path (expand ~).
    pub fn store_path(&self) -> PathBuf {
        let path = &self.store.path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// The user's home directory, from `$HOME`.
pub fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
