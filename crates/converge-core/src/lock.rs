//! Per-identifier mutual exclusion.
//!
//! The core assumes no two reconciliations touch the same remote
//! identifier concurrently. Callers that cannot guarantee this externally
//! attach an [`IdentityLock`]; the reconciler acquires it before each
//! operation and releases it when the guard drops.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

/// Guard for one held identifier. Released on drop.
pub struct IdentityGuard {
    _held: Box<dyn Any + Send>,
}

impl IdentityGuard {
    /// Wraps any droppable lock token.
    pub fn new(held: impl Any + Send) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for IdentityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityGuard")
    }
}

/// Mutual-exclusion hook keyed by resource identifier.
#[async_trait]
pub trait IdentityLock: Send + Sync {
    /// Acquires the lock for `identifier`, waiting if it is held.
    async fn acquire(&self, identifier: &str) -> IdentityGuard;
}

/// In-process keyed lock.
///
/// Each identifier maps to its own mutex, so reconciliations of distinct
/// resources never contend.
#[derive(Debug, Default)]
pub struct KeyedLock {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLock {
    /// Creates an empty keyed lock.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityLock for KeyedLock {
    async fn acquire(&self, identifier: &str) -> IdentityGuard {
        let mutex = {
            let entry = self
                .locks
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        IdentityGuard::new(mutex.lock_owned().await)
    }
}
