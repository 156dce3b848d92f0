//! Structural snapshot diffing.
//!
//! Computes the minimal set of change operations between two serialized
//! (JSON-shaped) resource snapshots. The emitted patch is an RFC 6902
//! subset (`replace`/`add`/`remove` with JSON Pointer paths) in document
//! traversal order, so identical inputs always yield byte-identical
//! patches. [`apply`] is the inverse: applying `diff(before, after)` to
//! `before` yields a document equal to `after`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque serialized resource state at a point in time.
///
/// Only the differ interprets snapshot contents; the rest of the core
/// treats them as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot(Vec<u8>);

impl ResourceSnapshot {
    /// Wraps serialized bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the snapshot, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for ResourceSnapshot {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Errors from snapshot parsing, diffing, or patch application.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The snapshot is not valid JSON.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),

    /// A patch operation does not apply to the document.
    #[error("patch path '{path}' does not apply: {reason}")]
    BadPath {
        /// The JSON Pointer that failed to resolve.
        path: String,
        /// Why it failed.
        reason: String,
    },
}

impl DiffError {
    fn bad_path(path: &str, reason: impl Into<String>) -> Self {
        Self::BadPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// One patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Replace the value at `path`.
    Replace {
        /// JSON Pointer to the value.
        path: String,
        /// The new value.
        value: Value,
    },
    /// Add a value at `path`.
    Add {
        /// JSON Pointer to the new location.
        path: String,
        /// The value to add.
        value: Value,
    },
    /// Remove the value at `path`.
    Remove {
        /// JSON Pointer to the value.
        path: String,
    },
}

/// Ordered sequence of change operations between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The operations in application order.
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Serializes the patch to a JSON document for submission.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, DiffError> {
        Ok(serde_json::to_vec(&self.ops)?)
    }

    /// Parses a patch from its JSON document form.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DiffError> {
        Ok(Self {
            ops: serde_json::from_slice(bytes)?,
        })
    }
}

/// Computes the patch transforming `before` into `after`.
///
/// `diff(x, x)` is empty for any valid snapshot `x`.
pub fn diff(
    before: &ResourceSnapshot,
    after: &ResourceSnapshot,
) -> std::result::Result<Patch, DiffError> {
    let before: Value = serde_json::from_slice(before.as_bytes())?;
    let after: Value = serde_json::from_slice(after.as_bytes())?;
    let mut ops = Vec::new();
    diff_values("", &before, &after, &mut ops);
    Ok(Patch { ops })
}

/// Applies a patch to a snapshot, returning the patched snapshot.
pub fn apply(
    snapshot: &ResourceSnapshot,
    patch: &Patch,
) -> std::result::Result<ResourceSnapshot, DiffError> {
    let mut doc: Value = serde_json::from_slice(snapshot.as_bytes())?;
    for op in &patch.ops {
        match op {
            PatchOp::Replace { path, value } => {
                *resolve_mut(&mut doc, path)? = value.clone();
            }
            PatchOp::Add { path, value } => add_at(&mut doc, path, value.clone())?,
            PatchOp::Remove { path } => remove_at(&mut doc, path)?,
        }
    }
    Ok(ResourceSnapshot::new(serde_json::to_vec(&doc)?))
}

fn diff_values(path: &str, before: &Value, after: &Value, ops: &mut Vec<PatchOp>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (key, before_value) in b {
                let child = format!("{path}/{}", escape_pointer(key));
                match a.get(key) {
                    Some(after_value) => diff_values(&child, before_value, after_value, ops),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, after_value) in a {
                if !b.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: format!("{path}/{}", escape_pointer(key)),
                        value: after_value.clone(),
                    });
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            let common = b.len().min(a.len());
            for index in 0..common {
                diff_values(&format!("{path}/{index}"), &b[index], &a[index], ops);
            }
            for index in common..a.len() {
                ops.push(PatchOp::Add {
                    path: format!("{path}/{index}"),
                    value: a[index].clone(),
                });
            }
            // Remove trailing excess highest-index first so earlier removes
            // do not shift the indices of later ones.
            for index in (common..b.len()).rev() {
                ops.push(PatchOp::Remove {
                    path: format!("{path}/{index}"),
                });
            }
        }
        (b, a) if b != a => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: a.clone(),
        }),
        _ => {}
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn tokens(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').skip(1).map(unescape_pointer).collect()
}

fn resolve_mut<'a>(
    doc: &'a mut Value,
    path: &str,
) -> std::result::Result<&'a mut Value, DiffError> {
    let mut current = doc;
    for token in tokens(path) {
        current = match current {
            Value::Object(map) => map
                .get_mut(&token)
                .ok_or_else(|| DiffError::bad_path(path, format!("missing key '{token}'")))?,
            Value::Array(items) => {
                let index: usize = token
                    .parse()
                    .map_err(|_| DiffError::bad_path(path, format!("bad index '{token}'")))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| DiffError::bad_path(path, format!("index {index} out of bounds")))?
            }
            _ => return Err(DiffError::bad_path(path, "not a container")),
        };
    }
    Ok(current)
}

fn split_parent(path: &str) -> std::result::Result<(&str, String), DiffError> {
    let split = path
        .rfind('/')
        .ok_or_else(|| DiffError::bad_path(path, "missing leading '/'"))?;
    Ok((&path[..split], unescape_pointer(&path[split + 1..])))
}

fn add_at(doc: &mut Value, path: &str, value: Value) -> std::result::Result<(), DiffError> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    let (parent_path, last) = split_parent(path)?;
    match resolve_mut(doc, parent_path)? {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = last
                .parse()
                .map_err(|_| DiffError::bad_path(path, format!("bad index '{last}'")))?;
            if index > items.len() {
                return Err(DiffError::bad_path(path, format!("index {index} out of bounds")));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(DiffError::bad_path(path, "parent is not a container")),
    }
}

fn remove_at(doc: &mut Value, path: &str) -> std::result::Result<(), DiffError> {
    let (parent_path, last) = split_parent(path)?;
    match resolve_mut(doc, parent_path)? {
        Value::Object(map) => {
            map.remove(&last)
                .ok_or_else(|| DiffError::bad_path(path, format!("missing key '{last}'")))?;
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = last
                .parse()
                .map_err(|_| DiffError::bad_path(path, format!("bad index '{last}'")))?;
            if index >= items.len() {
                return Err(DiffError::bad_path(path, format!("index {index} out of bounds")));
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(DiffError::bad_path(path, "parent is not a container")),
    }
}

/// Serialization seam between typed state and opaque snapshots.
pub trait SnapshotCodec<T>: Send + Sync {
    /// Serializes state into a snapshot.
    fn encode(&self, state: &T) -> std::result::Result<ResourceSnapshot, DiffError>;

    /// Deserializes state from a snapshot.
    fn decode(&self, snapshot: &ResourceSnapshot) -> std::result::Result<T, DiffError>;
}

/// JSON codec, the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> SnapshotCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, state: &T) -> std::result::Result<ResourceSnapshot, DiffError> {
        Ok(ResourceSnapshot::new(serde_json::to_vec(state)?))
    }

    fn decode(&self, snapshot: &ResourceSnapshot) -> std::result::Result<T, DiffError> {
        Ok(serde_json::from_slice(snapshot.as_bytes())?)
    }
}
