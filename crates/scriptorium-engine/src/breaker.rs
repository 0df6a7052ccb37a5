use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open { opened_at: DateTime<Utc> },
    /// One bounded retry is in progress after the cool-down.
    HalfOpen,
}

/// What the executor should do after a QA failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Route to the remediation node.
    Remediate,
    /// Stop and block the execution for human resolution.
    Open,
}

/// Why a half-open retry was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfOpenDenied {
    NotOpen,
    CoolingDown { retry_after_secs: u64 },
    Exhausted,
}

/// Rework circuit breaker for one QA node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub state: BreakerState,
    /// Half-open retries taken so far.
    #[serde(default)]
    pub trials_used: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            trials_used: 0,
        }
    }
}

impl CircuitBreaker {
    pub fn is_open(&self) -> bool {
        matches!(self.state, BreakerState::Open { .. })
    }

    /// Record a QA failure. `rework` is the counter after incrementing.
    ///
    /// A failure during a half-open trial reopens immediately; otherwise the
    /// breaker opens once `rework` exceeds `max_rework`.
    pub fn on_failure(&mut self, rework: u32, max_rework: u32, now: DateTime<Utc>) -> BreakerDecision {
        let open = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Open { .. } => true,
            BreakerState::Closed => rework > max_rework,
        };
        if open {
            self.state = BreakerState::Open { opened_at: now };
            BreakerDecision::Open
        } else {
            BreakerDecision::Remediate
        }
    }

    pub fn on_pass(&mut self) {
        self.state = BreakerState::Closed;
    }

    /// Move an open breaker to half-open once the cool-down has elapsed and
    /// trials remain.
    pub fn try_half_open(
        &mut self,
        now: DateTime<Utc>,
        cooldown: Duration,
        max_trials: u32,
    ) -> Result<(), HalfOpenDenied> {
        let BreakerState::Open { opened_at } = self.state else {
            return Err(HalfOpenDenied::NotOpen);
        };
        if self.trials_used >= max_trials {
            return Err(HalfOpenDenied::Exhausted);
        }
        let ready_at = opened_at + cooldown;
        if now < ready_at {
            let remaining = (ready_at - now).num_seconds().max(1) as u64;
            return Err(HalfOpenDenied::CoolingDown {
                retry_after_secs: remaining,
            });
        }
        self.state = BreakerState::HalfOpen;
        self.trials_used += 1;
        Ok(())
    }
}
