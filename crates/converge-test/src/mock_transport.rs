//! Scripted mock transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use converge_core::{Method, RemoteCall, RemoteCallResult};
use tracing::trace;

/// One recorded call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Request body, if one was sent.
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Script {
    /// One-shot responses, consumed in order.
    queue: VecDeque<RemoteCallResult>,
    /// Response repeated once the queue is drained.
    sticky: Option<RemoteCallResult>,
}

/// Mock transport keyed by method and path.
///
/// Unscripted calls answer 404, so tests only describe the remote state
/// they care about. Every call is recorded for assertions.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<(Method, String), Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response repeated for every call to `method path`.
    pub fn respond(&self, method: Method, path: impl Into<String>, result: RemoteCallResult) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry((method, path.into())).or_default().sticky = Some(result);
    }

    /// Queues a one-shot response for `method path`, consumed before any
    /// sticky response.
    pub fn enqueue(&self, method: Method, path: impl Into<String>, result: RemoteCallResult) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry((method, path.into()))
            .or_default()
            .queue
            .push_back(result);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls to `method path`.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Number of calls with `method`, regardless of path.
    pub fn count_method(&self, method: Method) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Body of the most recent call to `method path`.
    pub fn last_body(&self, method: Method, path: &str) -> Option<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.method == method && c.path == path)
            .and_then(|c| c.body.clone())
    }
}

#[async_trait]
impl RemoteCall for MockTransport {
    async fn call(&self, method: Method, path: &str, body: Option<&[u8]>) -> RemoteCallResult {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.map(<[u8]>::to_vec),
        });

        let mut scripts = self.scripts.lock().unwrap();
        let result = scripts
            .get_mut(&(method, path.to_string()))
            .and_then(|script| script.queue.pop_front().or_else(|| script.sticky.clone()))
            .unwrap_or_else(|| RemoteCallResult::status(404));
        trace!("mock {} {} -> {:?}", method, path, result.status);
        result
    }
}
