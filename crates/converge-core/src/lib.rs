//! Reconciliation core for externally managed resources.
//!
//! This crate converges the actual state of remote resources toward a
//! declared configuration through a REST-style API. It provides the
//! machinery shared by every resource kind:
//!
//! - [`Classifier`]: maps raw call results to classified outcomes
//! - [`RetryExecutor`]: exponential-backoff retry driven by classification
//! - [`Poller`]: converts long-running remote operations into
//!   wait-until-terminal results
//! - [`diff`]/[`apply`]: minimal structural patches between snapshots
//! - [`Reconciler`]: idempotent Create/Read/Update/Delete orchestration
//!
//! # Architecture
//!
//! The mapping layer decodes provider configuration into a typed
//! [`ResourceModel`] state and hands it to a [`Reconciler`], which owns
//! the control flow:
//!
//! 1. Reconciler issues remote calls through the [`RemoteCall`] seam
//! 2. Every attempt is classified exactly once by the [`Classifier`]
//! 3. Transient outcomes are retried under a [`BackoffPolicy`]
//! 4. Updates patch only the fields that differ, via the state differ
//! 5. Destructive asynchronous operations are polled to a terminal label
//!
//! Each reconciliation is an independent task; sleeps and poll delays
//! suspend only the calling task. The core reports failures as structured
//! [`ConvergeError`] values rather than logging them.
//!
//! # Example
//!
//! ```ignore
//! use converge_core::{Reconciler, ReconcilerConfig, DeleteMode};
//!
//! let reconciler = Reconciler::new(OrgModel, transport, ReconcilerConfig::default());
//! let converged = reconciler.create(&desired).await?;
//! reconciler.delete(converged.id.as_deref().unwrap(), DeleteMode::Purge).await?;
//! ```

mod backoff;
mod diff;
mod error;
mod lock;
mod outcome;
mod poll;
mod reconcile;
mod transport;

pub use backoff::{BackoffPolicy, RetryExecutor};
pub use diff::{apply, diff, DiffError, JsonCodec, Patch, PatchOp, ResourceSnapshot, SnapshotCodec};
pub use error::{ConvergeError, Result};
pub use lock::{IdentityGuard, IdentityLock, KeyedLock};
pub use outcome::{Classifier, ClassifiedOutcome, RemoteCallResult};
pub use poll::{PollSpec, Poller, UnknownLabelPolicy};
pub use reconcile::{Converged, DeleteMode, Reconciler, ReconcilerConfig, ResourceModel};
pub use transport::{Clock, Method, RemoteCall, TokioClock};
