//! Orchestrator policy configuration.

use std::str::FromStr;
use std::time::Duration;

use backon::ExponentialBuilder;

/// What happens once a saga lands in `FAILED` because its compensation failed.
///
/// Compensation is never retried automatically under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationFailurePolicy {
    /// Record `FAILED`, log an alarm and count it; an operator reconciles.
    #[default]
    ManualIntervention,
    /// As `ManualIntervention`, and also publish `OPERATOR_ALERT_RAISED`
    /// for a paging consumer.
    Page,
}

impl FromStr for CompensationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" | "manual-intervention" => Ok(CompensationFailurePolicy::ManualIntervention),
            "page" => Ok(CompensationFailurePolicy::Page),
            other => Err(format!("unknown compensation failure policy: {other}")),
        }
    }
}

/// Exponential backoff for action dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that dispatches once and never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff configuration for retries.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for [`crate::SagaOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Upper bound for a single dispatch attempt.
    pub dispatch_timeout: Duration,
    pub failure_policy: CompensationFailurePolicy,
    /// Number of lock stripes serializing events per saga.
    pub lock_stripes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dispatch_timeout: Duration::from_secs(5),
            failure_policy: CompensationFailurePolicy::default(),
            lock_stripes: 64,
        }
    }
}
