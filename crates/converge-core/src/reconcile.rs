//! Per-resource reconciliation orchestration.
//!
//! A [`Reconciler`] converges one remote resource toward its declared
//! state through idempotent Create, Read, Update, and Delete operations.
//! All collaborators (transport, clock, resource model, codec, identity
//! lock) are injected at construction; there is no process-wide registry.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::backoff::{BackoffPolicy, RetryExecutor};
use crate::diff::{diff, JsonCodec, ResourceSnapshot, SnapshotCodec};
use crate::error::{ConvergeError, Result};
use crate::lock::{IdentityGuard, IdentityLock};
use crate::outcome::{Classifier, ClassifiedOutcome};
use crate::poll::{PollSpec, Poller};
use crate::transport::{Clock, Method, RemoteCall, TokioClock};

/// Typed model of one reconcilable resource kind.
///
/// Supplied by the CRUD-mapping layer, decoded once at the boundary. The
/// core never inspects untyped key-value maps; everything it needs about
/// a resource kind flows through this trait.
pub trait ResourceModel: Send + Sync {
    /// In-memory representation of the resource state.
    type State: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Resource kind name, used for error context.
    fn kind(&self) -> &str;

    /// Collection path for create calls.
    fn collection_path(&self) -> String;

    /// Item path for read, patch, and delete calls.
    fn item_path(&self, id: &str) -> String;

    /// Lookup path for the natural-key idempotency check during create.
    fn natural_key_path(&self, desired: &Self::State) -> String;

    /// Remote-assigned identifier carried by a state, if it has one.
    fn id_of(&self, state: &Self::State) -> Option<String>;

    /// Folds desired values into the current state, field by field.
    /// Returns true when anything changed.
    fn merge_desired(&self, current: &mut Self::State, desired: &Self::State) -> bool;

    /// Path of the purge operation for purge deletes.
    fn purge_path(&self, id: &str) -> String {
        format!("{}/$purge", self.item_path(id))
    }

    /// Extracts the status label from a purge status body.
    ///
    /// The default reads a top-level JSON `status` field.
    fn purge_label(&self, body: &[u8]) -> Option<String> {
        serde_json::from_slice::<serde_json::Value>(body)
            .ok()?
            .get("status")?
            .as_str()
            .map(str::to_string)
    }
}

/// Per-call-site configuration for a reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Backoff for onboarding calls (8 attempts, transport-error retry).
    pub onboarding_backoff: BackoffPolicy,
    /// Backoff for generic CRUD calls (30 attempts).
    pub crud_backoff: BackoffPolicy,
    /// Classifier for generic call sites.
    pub classifier: Classifier,
    /// Classifier for onboarding, with transport-error retry enabled.
    pub onboarding_classifier: Classifier,
    /// Poll cadence and label sets for purge deletes.
    pub purge_poll: PollSpec,
    /// Overall per-operation deadline, if any.
    pub deadline: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let classifier = Classifier::new();
        Self {
            onboarding_backoff: BackoffPolicy::onboarding(),
            crud_backoff: BackoffPolicy::crud(),
            onboarding_classifier: classifier.clone().with_transport_retry(),
            classifier,
            purge_poll: PollSpec::purge(),
            deadline: None,
        }
    }
}

/// Converged state of a resource after a reconciliation operation.
///
/// `id == None` means the resource is absent remotely and the caller must
/// clear its stored identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged<S> {
    /// Remote identifier, if the resource exists.
    pub id: Option<String>,
    /// Last-known remote state, if the resource exists.
    pub state: Option<S>,
}

impl<S> Converged<S> {
    /// Converged state for an existing resource.
    pub fn present(id: impl Into<String>, state: S) -> Self {
        Self {
            id: Some(id.into()),
            state: Some(state),
        }
    }

    /// Converged state for an absent resource.
    pub fn absent() -> Self {
        Self {
            id: None,
            state: None,
        }
    }

    /// Returns true if the resource is absent remotely.
    pub fn is_absent(&self) -> bool {
        self.id.is_none()
    }
}

/// Delete semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Single delete call; not-found counts as success.
    Soft,
    /// Asynchronous purge followed by a status poll.
    Purge,
}

/// Reconciles one resource kind against a remote API.
pub struct Reconciler<M, T, C = TokioClock>
where
    M: ResourceModel,
{
    model: M,
    transport: T,
    executor: RetryExecutor<C>,
    poller: Poller<C>,
    codec: Arc<dyn SnapshotCodec<M::State>>,
    config: ReconcilerConfig,
    lock: Option<Arc<dyn IdentityLock>>,
    cancel: CancellationToken,
}

impl<M, T> Reconciler<M, T, TokioClock>
where
    M: ResourceModel,
    T: RemoteCall,
{
    /// Creates a reconciler over the tokio clock and JSON codec.
    pub fn new(model: M, transport: T, config: ReconcilerConfig) -> Self {
        Self::with_clock(model, transport, TokioClock, config)
    }
}

impl<M, T, C> Reconciler<M, T, C>
where
    M: ResourceModel,
    T: RemoteCall,
    C: Clock + Clone,
{
    /// Creates a reconciler over an explicit clock.
    pub fn with_clock(model: M, transport: T, clock: C, config: ReconcilerConfig) -> Self {
        Self {
            model,
            transport,
            executor: RetryExecutor::new(clock.clone()),
            poller: Poller::new(clock),
            codec: Arc::new(JsonCodec),
            config,
            lock: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the snapshot codec.
    pub fn with_codec(mut self, codec: Arc<dyn SnapshotCodec<M::State>>) -> Self {
        self.codec = codec;
        self
    }

    /// Attaches a per-identifier lock, for callers that cannot guarantee
    /// identifier-level serialization themselves.
    pub fn with_identity_lock(mut self, lock: Arc<dyn IdentityLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Token that cancels in-flight polls when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Creates the resource, or adopts and updates it if it already
    /// exists under its natural key.
    #[instrument(skip_all, fields(kind = self.model.kind()))]
    pub async fn create(&self, desired: &M::State) -> Result<Converged<M::State>> {
        let key_path = self.model.natural_key_path(desired);
        let _guard = self.acquire(&key_path).await;

        // Idempotency check: a resource already present under its natural
        // key is adopted, never re-created.
        let result = self
            .transport
            .call(Method::Get, &key_path, None)
            .await;
        match self.config.classifier.classify(&result) {
            ClassifiedOutcome::Success(payload) => {
                let existing = self.decode("create", &key_path, &payload)?;
                let id = self.model.id_of(&existing).ok_or_else(|| {
                    ConvergeError::snapshot(
                        "create",
                        &key_path,
                        "existing resource carries no identifier",
                    )
                })?;
                debug!("already onboarded as '{}', adopting", id);
                return self.update(&id, desired).await;
            }
            ClassifiedOutcome::NotFound => {}
            other => return Err(ConvergeError::from_terminal(other, "create", &key_path)),
        }

        let path = self.model.collection_path();
        let body = self
            .codec
            .encode(desired)
            .map_err(|e| ConvergeError::snapshot("create", &key_path, e.to_string()))?;
        let transport = &self.transport;
        let payload = self
            .executor
            .execute(
                "create",
                &key_path,
                &self.config.onboarding_backoff,
                &self.config.onboarding_classifier,
                self.config.deadline,
                || {
                    let path = path.clone();
                    let body = body.clone();
                    async move {
                        transport
                            .call(Method::Post, &path, Some(body.as_bytes()))
                            .await
                    }
                },
            )
            .await?;

        let created = self.decode("create", &key_path, &payload)?;
        let id = self.model.id_of(&created).ok_or_else(|| {
            ConvergeError::snapshot("create", &key_path, "created resource carries no identifier")
        })?;
        debug!("onboarded as '{}'", id);
        Ok(Converged::present(id, created))
    }

    /// Fetches the resource by identifier. Not-found means the resource
    /// is absent and the identifier must be cleared; it is not an error.
    #[instrument(skip_all, fields(kind = self.model.kind(), id = id))]
    pub async fn read(&self, id: &str) -> Result<Converged<M::State>> {
        let _guard = self.acquire(id).await;
        let result = self
            .transport
            .call(Method::Get, &self.model.item_path(id), None)
            .await;
        match self.config.classifier.classify(&result) {
            ClassifiedOutcome::Success(payload) => {
                let state = self.decode("read", id, &payload)?;
                Ok(Converged::present(id, state))
            }
            ClassifiedOutcome::NotFound => {
                debug!("absent remotely, clearing identifier");
                Ok(Converged::absent())
            }
            other => Err(ConvergeError::from_terminal(other, "read", id)),
        }
    }

    /// Converges the remote state toward `desired` by patching only the
    /// fields that differ. A no-op update issues zero patch calls.
    #[instrument(skip_all, fields(kind = self.model.kind(), id = id))]
    pub async fn update(&self, id: &str, desired: &M::State) -> Result<Converged<M::State>> {
        let _guard = self.acquire(id).await;
        let item_path = self.model.item_path(id);

        let result = self.transport.call(Method::Get, &item_path, None).await;
        let payload = match self.config.classifier.classify(&result) {
            ClassifiedOutcome::Success(payload) => payload,
            other => return Err(ConvergeError::from_terminal(other, "update", id)),
        };
        let mut current = self.decode("update", id, &payload)?;

        let before = self.encode("update", id, &current)?;
        if !self.model.merge_desired(&mut current, desired) {
            debug!("no field changes, skipping patch");
            return Ok(Converged::present(id, current));
        }
        let after = self.encode("update", id, &current)?;

        let patch = diff(&before, &after)
            .map_err(|e| ConvergeError::snapshot("update", id, e.to_string()))?;
        if patch.is_empty() {
            return Ok(Converged::present(id, current));
        }
        let patch_body = patch
            .to_bytes()
            .map_err(|e| ConvergeError::snapshot("update", id, e.to_string()))?;

        debug!("submitting patch with {} operation(s)", patch.len());
        let transport = &self.transport;
        self.executor
            .execute(
                "update",
                id,
                &self.config.crud_backoff,
                &self.config.classifier,
                self.config.deadline,
                || {
                    let item_path = item_path.clone();
                    let patch_body = patch_body.clone();
                    async move {
                        transport
                            .call(Method::Patch, &item_path, Some(&patch_body))
                            .await
                    }
                },
            )
            .await?;

        Ok(Converged::present(id, current))
    }

    /// Deletes the resource. Soft mode issues one delete call; purge mode
    /// submits an asynchronous purge and polls it to completion. In both
    /// modes an already-absent resource is a success.
    #[instrument(skip_all, fields(kind = self.model.kind(), id = id))]
    pub async fn delete(&self, id: &str, mode: DeleteMode) -> Result<Converged<M::State>> {
        let _guard = self.acquire(id).await;
        match mode {
            DeleteMode::Soft => self.soft_delete(id).await,
            DeleteMode::Purge => self.purge_delete(id).await,
        }
    }

    async fn soft_delete(&self, id: &str) -> Result<Converged<M::State>> {
        let result = self
            .transport
            .call(Method::Delete, &self.model.item_path(id), None)
            .await;
        match self.config.classifier.classify(&result) {
            ClassifiedOutcome::Success(_) => Ok(Converged::absent()),
            ClassifiedOutcome::NotFound => {
                debug!("already gone");
                Ok(Converged::absent())
            }
            other => Err(ConvergeError::from_terminal(other, "delete", id)),
        }
    }

    async fn purge_delete(&self, id: &str) -> Result<Converged<M::State>> {
        let result = self
            .transport
            .call(Method::Post, &self.model.purge_path(id), Some(b""))
            .await;
        match self.config.classifier.classify(&result) {
            ClassifiedOutcome::Success(_) if result.status == Some(202) => {}
            ClassifiedOutcome::Success(_) => {
                return Err(ConvergeError::Permanent {
                    operation: "delete".to_string(),
                    resource: id.to_string(),
                    status: result.status,
                    cause: format!(
                        "purge returned unexpected status {}",
                        result.status.unwrap_or_default()
                    ),
                });
            }
            ClassifiedOutcome::NotFound => {
                debug!("already gone");
                return Ok(Converged::absent());
            }
            other => return Err(ConvergeError::from_terminal(other, "delete", id)),
        }

        let location = result.location.clone().ok_or_else(|| {
            ConvergeError::permanent("delete", id, "purge response carries no follow-up location")
        })?;

        let transport = &self.transport;
        let model = &self.model;
        self.poller
            .poll(
                "delete",
                id,
                &self.config.purge_poll,
                &self.config.classifier,
                &self.cancel,
                || {
                    let location = location.clone();
                    async move {
                        let result = transport.call(Method::Get, &location, None).await;
                        // 202 is the HTTP-level still-running signal; only
                        // final responses carry a status label body.
                        let label = if result.status == Some(202) {
                            None
                        } else {
                            result
                                .body
                                .as_deref()
                                .and_then(|body| model.purge_label(body))
                                .or_else(|| {
                                    // A final response without a status
                                    // label violates the purge contract.
                                    result
                                        .status
                                        .filter(|s| (200..300).contains(s))
                                        .map(|_| "FAILED".to_string())
                                })
                        };
                        (result, label)
                    }
                },
            )
            .await?;

        Ok(Converged::absent())
    }

    async fn acquire(&self, identifier: &str) -> Option<IdentityGuard> {
        match &self.lock {
            Some(lock) => Some(lock.acquire(identifier).await),
            None => None,
        }
    }

    fn decode(&self, operation: &str, resource: &str, payload: &[u8]) -> Result<M::State> {
        self.codec
            .decode(&ResourceSnapshot::new(payload.to_vec()))
            .map_err(|e| ConvergeError::snapshot(operation, resource, e.to_string()))
    }

    fn encode(&self, operation: &str, resource: &str, state: &M::State) -> Result<ResourceSnapshot> {
        self.codec
            .encode(state)
            .map_err(|e| ConvergeError::snapshot(operation, resource, e.to_string()))
    }
}
