//! Convenience types for provider implementations.
//!
//! These types provide a more ergonomic API over the raw protobuf types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: change
                .before
                .map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default(),
            after: change
                .after
                .map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default(),
        }
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create an in-place plan by diffing the planned state against the prior state.
    ///
    /// Null planned attributes are unknown until apply and are not reported.
    pub fn in_place(prior_state: Option<&Value>, planned_state: Value) -> Self {
        let changes = diff_states(prior_state, &planned_state);
        Self {
            planned_state,
            changes,
            requires_replace: false,
        }
    }

    /// Create a destroy plan: the planned state is null and every known
    /// prior attribute is reported as removed.
    pub fn destroy(prior_state: Option<&Value>) -> Self {
        let changes: Vec<AttributeChange> = prior_state
            .and_then(Value::as_object)
            .map(|prior| {
                prior
                    .iter()
                    .filter(|(_, before)| !before.is_null())
                    .map(|(path, before)| AttributeChange::removed(path, before.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            planned_state: Value::Null,
            changes,
            requires_replace: false,
        }
    }
}

/// Compute the top-level attribute changes between two JSON object states.
pub fn diff_states(prior: Option<&Value>, planned: &Value) -> Vec<AttributeChange> {
    let Some(planned) = planned.as_object() else {
        return Vec::new();
    };
    let prior = prior.and_then(Value::as_object);

    planned
        .iter()
        .filter(|(_, after)| !after.is_null())
        .filter_map(|(path, after)| match prior.and_then(|p| p.get(path)) {
            None | Some(Value::Null) => Some(AttributeChange::added(path, after.clone())),
            Some(before) if before != after => {
                Some(AttributeChange::modified(path, before.clone(), after.clone()))
            }
            Some(_) => None,
        })
        .collect()
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// The provider type name, used as the prefix of every resource type.
    pub type_name: String,
    /// The provider version.
    pub version: String,
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// A configuration value that may not be known yet.
///
/// The host sends `null` for attributes that are unset and lists attributes
/// whose values depend on not-yet-applied resources as unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue<T> {
    /// The value will only be known later.
    Unknown,
    /// The attribute is not set.
    Null,
    /// The attribute has a concrete value.
    Known(T),
}

impl<T> AttrValue<T> {
    /// Whether the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Whether the attribute is unset.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Provider configuration as received from the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigValue {
    value: Value,
    unknown: BTreeSet<String>,
}

impl ConfigValue {
    /// Wrap a fully known configuration object.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            unknown: BTreeSet::new(),
        }
    }

    /// Mark a top-level attribute as unknown.
    pub fn with_unknown(mut self, path: impl Into<String>) -> Self {
        self.unknown.insert(path.into());
        self
    }

    /// The raw JSON value. Unknown attributes are absent or null here.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Read a string attribute.
    pub fn get_string(&self, name: &str) -> Result<AttrValue<String>, ProviderError> {
        if self.unknown.contains(name) {
            return Ok(AttrValue::Unknown);
        }

        match self.value.get(name) {
            None | Some(Value::Null) => Ok(AttrValue::Null),
            Some(Value::String(s)) => Ok(AttrValue::Known(s.clone())),
            Some(other) => Err(ProviderError::Validation(format!(
                "attribute '{}' must be a string, got {}",
                name,
                crate::validation::value_type_name(other)
            ))),
        }
    }
}

impl<I, S> From<(Value, I)> for ConfigValue
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from((value, unknown): (Value, I)) -> Self {
        Self {
            value,
            unknown: unknown.into_iter().map(Into::into).collect(),
        }
    }
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by providers.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("application_title", json!("overseerr"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("overseerr")));

        let modified = AttributeChange::modified("hide_available", json!(false), json!(true));
        assert_eq!(modified.before, Some(json!(false)));
        assert_eq!(modified.after, Some(json!(true)));
    }

    #[test]
    fn test_attribute_change_to_proto() {
        let change = AttributeChange::modified("application_title", json!("old"), json!("new"));
        let proto: crate::generated::AttributeChange = change.into();
        assert_eq!(proto.path, "application_title");
        assert_eq!(proto.before, b"\"old\"".to_vec());
        assert_eq!(proto.after, b"\"new\"".to_vec());

        let added: crate::generated::AttributeChange =
            AttributeChange::added("id", json!("settings")).into();
        assert!(added.before.is_empty());
    }

    #[test]
    fn test_diff_states_on_create() {
        let planned = json!({"application_title": "overseerr", "id": null});
        let changes = diff_states(None, &planned);
        assert_eq!(changes, vec![AttributeChange::added("application_title", json!("overseerr"))]);
    }

    #[test]
    fn test_diff_states_on_update() {
        let prior =
            json!({"application_title": "overseerr", "trust_proxy": true, "id": "settings"});
        let planned =
            json!({"application_title": "overseerrTest", "trust_proxy": true, "id": "settings"});
        let changes = diff_states(Some(&prior), &planned);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "application_title");
        assert_eq!(changes[0].before, Some(json!("overseerr")));
    }

    #[test]
    fn test_plan_result() {
        let state = json!({"id": "settings"});
        let no_change = PlanResult::no_change(state.clone());
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);

        let unchanged = PlanResult::in_place(Some(&state), state.clone());
        assert!(unchanged.changes.is_empty());
    }

    #[test]
    fn test_plan_result_destroy() {
        let prior =
            json!({"id": "settings", "application_title": "overseerr", "application_url": null});
        let plan = PlanResult::destroy(Some(&prior));

        assert!(plan.planned_state.is_null());
        assert!(!plan.requires_replace);
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.contains(&AttributeChange::removed("id", json!("settings"))));
        assert!(plan
            .changes
            .iter()
            .all(|change| change.after.is_none() && change.path != "application_url"));

        assert!(PlanResult::destroy(None).changes.is_empty());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("overseerr_settings", json!({"id": "settings"}));
        assert_eq!(imported.resource_type, "overseerr_settings");
        assert_eq!(imported.state["id"], "settings");
    }

    #[test]
    fn test_config_value_strings() {
        let config = ConfigValue::new(json!({"url": "http://localhost:5055", "api_key": null}))
            .with_unknown("other");

        assert_eq!(
            config.get_string("url").unwrap(),
            AttrValue::Known("http://localhost:5055".to_string())
        );
        assert!(config.get_string("api_key").unwrap().is_null());
        assert!(config.get_string("missing").unwrap().is_null());
        assert!(config.get_string("other").unwrap().is_unknown());
    }

    #[test]
    fn test_config_value_wrong_type() {
        let config = ConfigValue::new(json!({"url": 5055}));
        let err = config.get_string("url").unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_config_value_from_tuple() {
        let config = ConfigValue::from((json!({}), ["url"]));
        assert!(config.get_string("url").unwrap().is_unknown());
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "HEMMER_PROVIDER");
    }
}
