//! Lock retry as an explicit state machine.
//!
//! Source files are occasionally held by another process for a few seconds.
//! Instead of sleep-in-a-loop control flow, the retry logic is a pure
//! transition function over [`RetryState`] driven by [`run_with_retry`],
//! with the clock injected through [`Sleeper`] so tests advance the machine
//! without real delays.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MigrateError, Result};

/// Retry policy for transient source faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles per attempt.
    pub base_delay_secs: u64,

    /// Ceiling on the per-attempt delay.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Waits come out as 2s, 4s, 5s, 5s across the five attempts.
        Self {
            max_attempts: 5,
            base_delay_secs: 2,
            max_delay_secs: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after a failed attempt (1-based), exponential with cap.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

/// States of the retry machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// About to run the given attempt (1-based).
    Attempting { attempt: u32 },

    /// Attempt failed transiently; wait `delay`, then run the next attempt.
    Backoff { attempt: u32, delay: Duration },

    /// All attempts failed transiently.
    Exhausted { attempts: u32 },

    /// An attempt succeeded.
    Succeeded { attempts: u32 },
}

/// Outcome of one attempt, as seen by the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Retryable fault (lock, handle exhaustion).
    Transient,
}

/// Pure transition function of the retry machine.
///
/// Only [`RetryState::Attempting`] has outgoing transitions; the other
/// states are terminal or pass through a timed wait handled by the driver.
pub fn step(policy: &RetryPolicy, state: &RetryState, outcome: AttemptOutcome) -> RetryState {
    match (state, outcome) {
        (RetryState::Attempting { attempt }, AttemptOutcome::Success) => {
            RetryState::Succeeded { attempts: *attempt }
        }
        (RetryState::Attempting { attempt }, AttemptOutcome::Transient) => {
            if *attempt >= policy.max_attempts {
                RetryState::Exhausted { attempts: *attempt }
            } else {
                RetryState::Backoff {
                    attempt: *attempt,
                    delay: policy.delay_after(*attempt),
                }
            }
        }
        // Terminal states and Backoff do not transition on attempt outcomes.
        (other, _) => other.clone(),
    }
}

/// Injected sleep dependency.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drive `op` through the retry machine.
///
/// `op` is invoked once per attempt and must be restartable (each attempt
/// opens its own connection, which also covers the reopen-on-exhaustion
/// requirement). Non-retryable errors are returned immediately; retryable
/// ones are returned once the machine reaches `Exhausted`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = Result<T>> + Send,
{
    let mut state = RetryState::Attempting { attempt: 1 };
    let mut last_err: Option<MigrateError> = None;

    loop {
        match state {
            RetryState::Attempting { attempt } => match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{}: attempt {}/{} failed ({}), backing off",
                        what, attempt, policy.max_attempts, e
                    );
                    state = step(policy, &RetryState::Attempting { attempt }, AttemptOutcome::Transient);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            },
            RetryState::Backoff { attempt, delay } => {
                sleeper.sleep(delay).await;
                state = RetryState::Attempting { attempt: attempt + 1 };
            }
            RetryState::Exhausted { attempts } => {
                return Err(match last_err {
                    Some(MigrateError::SourceLocked { path, .. }) => {
                        MigrateError::SourceLocked { path, attempts }
                    }
                    Some(other) => other,
                    None => MigrateError::source(format!("{}: retries exhausted", what)),
                });
            }
            RetryState::Succeeded { .. } => unreachable!("success returns directly"),
        }
    }
}
