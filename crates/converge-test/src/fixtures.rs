//! Resource-model fixtures.
//!
//! `OrgModel` is a tenant-organization resource in the shape most remote
//! identity APIs use: created under a collection path, looked up by a
//! name-based natural key, patched field by field, and purged through an
//! asynchronous operation.

use converge_core::ResourceModel;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tenant organization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgState {
    /// Remote-assigned identifier. Absent until onboarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique organization name (the natural key).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Human-readable display name.
    #[serde(default)]
    pub display_name: String,
    /// Parent organization identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Whether the organization is active. Computed remotely.
    #[serde(default)]
    pub active: bool,
}

/// Creates a desired organization state with the given name.
pub fn org(name: &str) -> OrgState {
    OrgState {
        id: None,
        name: name.to_string(),
        description: String::new(),
        display_name: String::new(),
        parent_id: None,
        active: false,
    }
}

/// Serializes an organization body as the remote would return it.
pub fn org_body(id: &str, name: &str, description: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": id,
        "name": name,
        "description": description,
        "display_name": "",
        "active": true,
    }))
    .expect("fixture body serializes")
}

/// Serializes a purge status body with the given label.
pub fn purge_status_body(label: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({ "status": label })).expect("fixture body serializes")
}

/// Resource model for tenant organizations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgModel;

/// Collection path used by [`OrgModel`].
pub const ORG_COLLECTION: &str = "/identity/Organization";

impl ResourceModel for OrgModel {
    type State = OrgState;

    fn kind(&self) -> &str {
        "organization"
    }

    fn collection_path(&self) -> String {
        ORG_COLLECTION.to_string()
    }

    fn item_path(&self, id: &str) -> String {
        format!("{ORG_COLLECTION}/{id}")
    }

    fn natural_key_path(&self, desired: &Self::State) -> String {
        format!("{ORG_COLLECTION}?name={}", desired.name)
    }

    fn id_of(&self, state: &Self::State) -> Option<String> {
        state.id.clone()
    }

    fn merge_desired(&self, current: &mut Self::State, desired: &Self::State) -> bool {
        let mut changed = false;
        if current.name != desired.name {
            current.name = desired.name.clone();
            changed = true;
        }
        if current.description != desired.description {
            current.description = desired.description.clone();
            changed = true;
        }
        if current.display_name != desired.display_name {
            current.display_name = desired.display_name.clone();
            changed = true;
        }
        if current.parent_id != desired.parent_id {
            current.parent_id = desired.parent_id.clone();
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths() {
        let model = OrgModel;
        assert_eq!(model.item_path("org-1"), "/identity/Organization/org-1");
        assert_eq!(
            model.natural_key_path(&org("acme")),
            "/identity/Organization?name=acme"
        );
        assert_eq!(
            model.purge_path("org-1"),
            "/identity/Organization/org-1/$purge"
        );
    }

    #[test]
    fn test_merge_detects_field_changes() {
        let model = OrgModel;
        let mut current = org("acme");
        current.id = Some("org-1".to_string());

        let unchanged = org("acme");
        assert!(!model.merge_desired(&mut current.clone(), &unchanged));

        let mut desired = org("acme");
        desired.description = "updated".to_string();
        let mut target = current.clone();
        assert!(model.merge_desired(&mut target, &desired));
        assert_eq!(target.description, "updated");
        // Computed and identity fields are untouched.
        assert_eq!(target.id, Some("org-1".to_string()));
    }

    #[test]
    fn test_purge_label_default_extraction() {
        let model = OrgModel;
        assert_eq!(
            model.purge_label(&purge_status_body("PURGING")),
            Some("PURGING".to_string())
        );
        assert_eq!(model.purge_label(b"not json"), None);
    }
}
