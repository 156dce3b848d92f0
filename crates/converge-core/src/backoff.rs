//! Exponential-backoff retry execution.
//!
//! The executor drives an operation closure repeatedly under a
//! [`BackoffPolicy`], consulting the [`Classifier`] after every attempt.
//! Transient outcomes are retried with a growing, jittered delay; all
//! other outcomes stop the loop immediately. Each attempt is a pure
//! closure invocation returning a [`RemoteCallResult`]; the executor
//! accumulates attempt state itself and never mutates caller state.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ConvergeError, Result};
use crate::outcome::{Classifier, ClassifiedOutcome, RemoteCallResult};
use crate::transport::Clock;

/// Backoff schedule and retry budget for one call site.
///
/// Different call classes use different budgets: onboarding tolerates a
/// longer convergence window than generic CRUD traffic, so the caps are
/// policy parameters rather than constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound for the delay between attempts.
    pub max_interval: Duration,
    /// Growth factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]`; each delay is drawn uniformly from
    /// `interval * [1 - randomization, 1 + randomization]`.
    pub randomization: f64,
    /// Total attempt cap, counting the first attempt.
    pub max_attempts: Option<u32>,
    /// Total elapsed-time cap measured from the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            randomization: 0.5,
            max_attempts: None,
            max_elapsed: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl BackoffPolicy {
    /// Policy for onboarding calls: 8 attempts.
    pub fn onboarding() -> Self {
        Self {
            max_attempts: Some(8),
            max_elapsed: None,
            ..Self::default()
        }
    }

    /// Policy for generic CRUD calls: 30 attempts.
    pub fn crud() -> Self {
        Self {
            max_attempts: Some(30),
            max_elapsed: None,
            ..Self::default()
        }
    }

    /// Overrides the total attempt cap.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Overrides the elapsed-time cap.
    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }

    /// Overrides the initial retry delay.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Disables jitter. Intended for deterministic tests.
    pub fn without_jitter(mut self) -> Self {
        self.randomization = 0.0;
        self
    }

    /// Next nominal interval after the current one, capped at `max_interval`.
    fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier;
        Duration::from_secs_f64(scaled.min(self.max_interval.as_secs_f64()))
    }

    /// Applies jitter to an interval.
    fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization <= 0.0 || interval.is_zero() {
            return interval;
        }
        let delta = interval.as_secs_f64() * self.randomization;
        let low = interval.as_secs_f64() - delta;
        let high = interval.as_secs_f64() + delta;
        Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
    }

    /// Returns true if the budget is spent after `attempts` attempts and
    /// `elapsed` wall-clock time.
    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return true;
            }
        }
        if let Some(max) = self.max_elapsed {
            if elapsed >= max {
                return true;
            }
        }
        false
    }
}

/// Drives operations under a backoff policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor<C> {
    clock: C,
}

impl<C: Clock> RetryExecutor<C> {
    /// Creates an executor over the given clock.
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Executes `attempt` until it succeeds, fails terminally, or the
    /// retry budget runs out.
    ///
    /// Success returns the response payload. A transient failure that
    /// exhausts the budget surfaces as a single
    /// [`ConvergeError::RetriesExhausted`] carrying the attempt count and
    /// last cause. Permanent, not-found, and conflict outcomes return
    /// immediately and are never retried. When `deadline` is set, sleeps
    /// are clipped to it and expiry returns [`ConvergeError::TimedOut`].
    pub async fn execute<F, Fut>(
        &self,
        operation: &str,
        resource: &str,
        policy: &BackoffPolicy,
        classifier: &Classifier,
        deadline: Option<Duration>,
        mut attempt: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteCallResult>,
    {
        let started = self.clock.now();
        let mut interval = policy.initial_interval;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let result = attempt().await;
            match classifier.classify(&result) {
                ClassifiedOutcome::Success(payload) => {
                    trace!("{} '{}' succeeded after {} attempt(s)", operation, resource, attempts);
                    return Ok(payload);
                }
                ClassifiedOutcome::Transient(cause) => {
                    let elapsed = self.clock.now() - started;
                    if policy.exhausted(attempts, elapsed) {
                        return Err(ConvergeError::RetriesExhausted {
                            operation: operation.to_string(),
                            resource: resource.to_string(),
                            attempts,
                            cause,
                        });
                    }
                    let delay = policy.jittered(interval);
                    if let Some(limit) = deadline {
                        let remaining = limit.saturating_sub(elapsed);
                        if delay >= remaining {
                            // The next attempt could not start before the
                            // deadline; wait it out and report.
                            self.clock.sleep(remaining).await;
                            return Err(ConvergeError::TimedOut {
                                operation: operation.to_string(),
                                resource: resource.to_string(),
                                elapsed: limit,
                            });
                        }
                    }
                    debug!(
                        "{} '{}' attempt {} transient ({}), retrying in {:?}",
                        operation, resource, attempts, cause, delay
                    );
                    self.clock.sleep(delay).await;
                    interval = policy.next_interval(interval);
                }
                terminal => {
                    return Err(ConvergeError::from_terminal(terminal, operation, resource));
                }
            }
        }
    }
}
