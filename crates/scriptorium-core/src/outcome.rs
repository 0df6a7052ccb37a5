use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The authoritative outcome, chosen through an explicit gate selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceOutcome {
    Qualified,
    NotReady,
    OutOfScope,
    Redirect,
}

/// The execution outcome derived from the governance outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Stabilized,
    Blocked,
    Abandoned,
}

/// Pinned governance -> terminal mapping. Total over `GovernanceOutcome`.
pub const OUTCOME_MAP: [(GovernanceOutcome, TerminalOutcome); 4] = [
    (GovernanceOutcome::Qualified, TerminalOutcome::Stabilized),
    (GovernanceOutcome::NotReady, TerminalOutcome::Blocked),
    (GovernanceOutcome::OutOfScope, TerminalOutcome::Abandoned),
    (GovernanceOutcome::Redirect, TerminalOutcome::Abandoned),
];

impl GovernanceOutcome {
    pub const ALL: [GovernanceOutcome; 4] = [
        Self::Qualified,
        Self::NotReady,
        Self::OutOfScope,
        Self::Redirect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qualified => "qualified",
            Self::NotReady => "not_ready",
            Self::OutOfScope => "out_of_scope",
            Self::Redirect => "redirect",
        }
    }

    /// The derived terminal outcome. Agrees with `OUTCOME_MAP`.
    pub const fn terminal(self) -> TerminalOutcome {
        match self {
            Self::Qualified => TerminalOutcome::Stabilized,
            Self::NotReady => TerminalOutcome::Blocked,
            Self::OutOfScope | Self::Redirect => TerminalOutcome::Abandoned,
        }
    }
}

impl fmt::Display for GovernanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GovernanceOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("unknown governance outcome: {}", s))
    }
}

impl TerminalOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stabilized => "stabilized",
            Self::Blocked => "blocked",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
