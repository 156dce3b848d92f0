//! Long-running-operation polling.
//!
//! Some remote operations return immediately with an in-progress
//! acknowledgment and must be polled until a terminal status label is
//! observed. The poller drives a status-check closure on a fixed cadence
//! bounded by a wall-clock timeout, folding each check through the
//! [`Classifier`].

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ConvergeError, Result};
use crate::outcome::{Classifier, ClassifiedOutcome, RemoteCallResult};
use crate::transport::Clock;

/// Policy for a status label outside both pending and target sets.
///
/// The strict interpretation treats an unknown label as an API contract
/// violation and fails the operation. Some remotes emit intermediate
/// labels they never documented, in which case `TreatAsPending` keeps
/// polling until the timeout decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnknownLabelPolicy {
    /// Fail the operation with an anomalous-label error.
    #[default]
    Fail,
    /// Keep polling as if the label were pending.
    TreatAsPending,
}

/// Cadence and label sets for one long-running operation.
///
/// The pending and target sets must be disjoint; a violation fails the
/// poll before any check is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSpec {
    /// Labels that mean the operation is still running.
    pub pending: HashSet<String>,
    /// Labels that mean the operation finished successfully.
    pub target: HashSet<String>,
    /// Delay before the first check, so the remote is not hammered
    /// immediately after submission.
    pub initial_delay: Duration,
    /// Delay between checks.
    pub poll_interval: Duration,
    /// Floor for the delay between checks.
    pub min_poll_interval: Duration,
    /// Wall-clock bound measured from poll start.
    pub timeout: Duration,
    /// Handling of labels outside both sets.
    pub unknown_label: UnknownLabelPolicy,
}

impl PollSpec {
    /// Creates a spec with the given label sets and default cadence.
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            initial_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(3),
            min_poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(20 * 60),
            unknown_label: UnknownLabelPolicy::default(),
        }
    }

    /// Spec for purge deletes: pending `PURGING`, target `SUCCESS`,
    /// 10s initial delay, 3s minimum cadence.
    pub fn purge() -> Self {
        Self::new(["PURGING"], ["SUCCESS"])
    }

    /// Overrides the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Overrides the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the minimum poll interval.
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Overrides the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the unknown-label policy.
    pub fn with_unknown_label(mut self, policy: UnknownLabelPolicy) -> Self {
        self.unknown_label = policy;
        self
    }

    /// Effective delay between checks.
    fn cadence(&self) -> Duration {
        self.poll_interval.max(self.min_poll_interval)
    }

    /// Returns a label present in both sets, if any.
    fn overlap(&self) -> Option<&str> {
        self.pending
            .iter()
            .find(|l| self.target.contains(*l))
            .map(String::as_str)
    }
}

/// Drives long-running operations to a terminal state.
#[derive(Debug, Clone)]
pub struct Poller<C> {
    clock: C,
}

impl<C: Clock> Poller<C> {
    /// Creates a poller over the given clock.
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Polls `check` until a target label is observed, a failure occurs,
    /// or the timeout elapses.
    ///
    /// Each check yields the raw call result plus the status label
    /// extracted from it, or `None` while the remote only acknowledges
    /// that the operation is still running. Cancellation is observed
    /// within one cadence tick and no further checks are issued after the
    /// token fires.
    pub async fn poll<F, Fut>(
        &self,
        operation: &str,
        resource: &str,
        spec: &PollSpec,
        classifier: &Classifier,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = (RemoteCallResult, Option<String>)>,
    {
        if let Some(label) = spec.overlap() {
            return Err(ConvergeError::permanent(
                operation,
                resource,
                format!("poll label '{label}' present in both pending and target sets"),
            ));
        }

        let started = self.clock.now();
        if !self.wait(spec.initial_delay, cancel).await {
            return Err(ConvergeError::cancelled(operation, resource));
        }

        loop {
            let elapsed = self.clock.now() - started;
            if elapsed >= spec.timeout {
                return Err(ConvergeError::TimedOut {
                    operation: operation.to_string(),
                    resource: resource.to_string(),
                    elapsed,
                });
            }

            let (result, label) = check().await;
            match classifier.classify(&result) {
                ClassifiedOutcome::Success(_) => match label {
                    Some(label) if spec.target.contains(&label) => {
                        debug!("{} '{}' reached '{}'", operation, resource, label);
                        return Ok(());
                    }
                    Some(label) if spec.pending.contains(&label) => {
                        trace!("{} '{}' still '{}'", operation, resource, label);
                    }
                    Some(label) => match spec.unknown_label {
                        UnknownLabelPolicy::Fail => {
                            return Err(ConvergeError::AnomalousLabel {
                                operation: operation.to_string(),
                                resource: resource.to_string(),
                                label,
                            });
                        }
                        UnknownLabelPolicy::TreatAsPending => {
                            debug!(
                                "{} '{}' returned unknown label '{}', treating as pending",
                                operation, resource, label
                            );
                        }
                    },
                    // HTTP-level still-running acknowledgment, no label body yet.
                    None => {
                        trace!("{} '{}' still in progress", operation, resource);
                    }
                },
                ClassifiedOutcome::Transient(cause) => {
                    debug!(
                        "{} '{}' status check transient ({}), continuing",
                        operation, resource, cause
                    );
                }
                terminal => {
                    return Err(ConvergeError::from_terminal(terminal, operation, resource));
                }
            }

            let elapsed = self.clock.now() - started;
            let remaining = spec.timeout.saturating_sub(elapsed);
            if !self.wait(spec.cadence().min(remaining), cancel).await {
                return Err(ConvergeError::cancelled(operation, resource));
            }
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns false on
    /// cancellation.
    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.clock.sleep(duration) => true,
        }
    }
}
