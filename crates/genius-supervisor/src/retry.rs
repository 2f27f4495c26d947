use crate::config::SupervisorConfig;
use crate::types::{AgentType, Phase, PhaseState, PhaseStatus};
use genius_core::GeniusError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, warn};

/// Exponential backoff policy for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed attempts after which the phase fails permanently.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Cap for a single delay, if any.
    pub max_delay_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let mut delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exp));
        if let Some(max) = self.max_delay_ms {
            delay = delay.min(max);
        }
        Duration::from_millis(delay)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then run attempt number `attempt + 1`.
    Retry { attempt: u32, delay: Duration },
    /// The phase is `failed_permanent`.
    GiveUp,
}

/// Applies the retry policy to phase records.
#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
    overrides: HashMap<AgentType, u32>,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.retry.max_attempts,
            base_delay_ms: config.retry.base_delay_ms,
            max_delay_ms: config.retry.max_delay_ms,
        };
        let overrides = AgentType::ALL
            .iter()
            .filter_map(|t| config.agents.get(*t).max_attempts.map(|n| (*t, n)))
            .collect();
        Self { policy, overrides }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn max_attempts(&self, phase: Phase) -> u32 {
        self.overrides
            .get(&phase.agent_type())
            .copied()
            .unwrap_or(self.policy.max_attempts)
    }

    /// Record a failed attempt on `status` and decide how to proceed.
    ///
    /// Retryable errors consume one attempt; anything else escalates at once.
    pub fn record_failure(&self, status: &mut PhaseStatus, err: &GeniusError) -> RetryDecision {
        let message = err.to_string();
        status.error_history.push(message.clone());
        status.error = Some(message);

        if !err.is_retryable() {
            status.state = PhaseState::FailedPermanent;
            error!(
                phase = %status.phase,
                agent = %status.agent_type,
                error = %err,
                "Non-retryable phase failure"
            );
            return RetryDecision::GiveUp;
        }

        status.attempts = (status.attempts + 1).min(status.max_attempts);
        if status.attempts < status.max_attempts {
            status.state = PhaseState::Retry;
            let delay = self.policy.backoff_delay(status.attempts);
            warn!(
                phase = %status.phase,
                agent = %status.agent_type,
                attempt = status.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable phase failure, backing off"
            );
            RetryDecision::Retry {
                attempt: status.attempts,
                delay,
            }
        } else {
            status.state = PhaseState::FailedPermanent;
            error!(
                phase = %status.phase,
                agent = %status.agent_type,
                attempts = status.attempts,
                error = %err,
                "Retries exhausted"
            );
            RetryDecision::GiveUp
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 5,
            max_delay_ms: None,
        };
        let delays: Vec<u128> = (1..=4).map(|n| policy.backoff_delay(n).as_millis()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40]);
    }

    #[test]
    fn test_backoff_cap_and_overflow() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: Some(3_000),
        };
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(3_000));

        let uncapped = RetryPolicy {
            max_delay_ms: None,
            ..policy
        };
        assert_eq!(uncapped.backoff_delay(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_transient_failures_exhaust_budget() {
        let manager = RetryManager::new(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: None,
        });
        let mut status = PhaseStatus::new(Phase::Analyze, 3);
        let err = GeniusError::transient("code_analyzer", "timeout");

        assert_eq!(
            manager.record_failure(&mut status, &err),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(status.state, PhaseState::Retry);
        assert_eq!(
            manager.record_failure(&mut status, &err),
            RetryDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(20)
            }
        );
        assert_eq!(manager.record_failure(&mut status, &err), RetryDecision::GiveUp);
        assert_eq!(status.state, PhaseState::FailedPermanent);
        assert_eq!(status.attempts, 3);
        assert_eq!(status.error_history.len(), 3);
    }

    #[test]
    fn test_validation_failure_escalates_immediately() {
        let manager = RetryManager::new(RetryPolicy::default());
        let mut status = PhaseStatus::new(Phase::Map, 3);
        let err = GeniusError::Validation("missing repository_info".into());

        assert_eq!(manager.record_failure(&mut status, &err), RetryDecision::GiveUp);
        assert_eq!(status.state, PhaseState::FailedPermanent);
        assert_eq!(status.attempts, 0);
        assert!(status.error.as_deref().unwrap().contains("repository_info"));
    }

    #[test]
    fn test_per_agent_override() {
        let mut config = SupervisorConfig::default();
        config.agents.docgenie.max_attempts = Some(1);
        let manager = RetryManager::from_config(&config);
        assert_eq!(manager.max_attempts(Phase::Document), 1);
        assert_eq!(manager.max_attempts(Phase::Map), 3);
    }
}
