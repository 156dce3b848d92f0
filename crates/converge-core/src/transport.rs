//! Transport and clock seams.
//!
//! The core never implements HTTP itself. Callers supply a [`RemoteCall`]
//! implementation over their client of choice, and optionally a [`Clock`]
//! so backoff and poll delays can be driven by virtual time in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::outcome::RemoteCallResult;

/// Request method for a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Fetch a resource.
    Get,
    /// Create a resource or submit an operation.
    Post,
    /// Replace a resource.
    Put,
    /// Apply a patch document.
    Patch,
    /// Remove a resource.
    Delete,
}

impl Method {
    /// Returns the method name in wire form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-call abstraction supplied by the caller.
///
/// Implementations must be safe for concurrent use; many reconciliations
/// may be in flight against the same transport.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Performs one call and returns the raw result.
    ///
    /// A transport failure is reported through
    /// [`RemoteCallResult::error`], never as a panic.
    async fn call(&self, method: Method, path: &str, body: Option<&[u8]>) -> RemoteCallResult;
}

#[async_trait]
impl<T: RemoteCall + ?Sized> RemoteCall for Arc<T> {
    async fn call(&self, method: Method, path: &str, body: Option<&[u8]>) -> RemoteCallResult {
        (**self).call(method, path, body).await
    }
}

/// Clock abstraction for backoff and poll delays.
///
/// Sleeps must suspend only the calling task. The production
/// implementation is [`TokioClock`]; tests substitute a manual clock.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Suspends the calling task for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-backed clock.
///
/// Under `tokio::time::pause()` this advances automatically, which keeps
/// timing tests deterministic and fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_wire_form() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(Method::Delete.as_str(), "DELETE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleep_advances() {
        let clock = TokioClock;
        let before = clock.now();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(clock.now() - before >= Duration::from_secs(5));
    }
}
