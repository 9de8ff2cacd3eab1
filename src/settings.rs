//! The `overseerr_settings` resource.
//!
//! Overseerr keeps one global "main" settings object. It cannot be created
//! or deleted, only reconfigured, so create and update both commit the
//! planned values, read replaces state with the server's copy, and delete
//! only stops tracking it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use crate::client::{MainSettings, OverseerrClient};
use crate::error::ProviderError;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::types::{ImportedResource, PlanResult};

/// Resource name, appended to the provider type name.
pub const SETTINGS_RESOURCE_NAME: &str = "settings";

/// Identifier of the singleton settings object.
pub const SETTINGS_ID: &str = "settings";

const DEFAULT_APP_LANGUAGE: &str = "en";
const DEFAULT_TRUST_PROXY: bool = true;
const DEFAULT_CSRF_PROTECTION: bool = true;
const DEFAULT_HIDE_AVAILABLE: bool = false;
const DEFAULT_PARTIAL_REQUESTS_ENABLED: bool = true;

/// Local state of the settings resource.
///
/// `None` fields serialize as `null`: unset in configuration, or not known
/// until the server answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Always [`SETTINGS_ID`] once known.
    pub id: Option<String>,
    /// Permission bitmask granted to new users.
    pub default_permissions: Option<f64>,
    /// Interface language.
    pub app_language: Option<String>,
    /// Instance name.
    pub application_title: Option<String>,
    /// Public URL of the instance.
    pub application_url: Option<String>,
    /// Whether proxy headers are trusted.
    pub trust_proxy: Option<bool>,
    /// Whether CSRF protection is enabled.
    pub csrf_protection: Option<bool>,
    /// Whether available media is hidden.
    pub hide_available: Option<bool>,
    /// Whether partial series requests are allowed.
    pub partial_requests_enabled: Option<bool>,
    /// Whether local sign-in is enabled.
    pub local_login: Option<bool>,
    /// Whether new Plex users may sign in.
    pub new_plex_login: Option<bool>,
}

impl Settings {
    /// Build local state from the server's settings object.
    pub fn from_remote(remote: &MainSettings) -> Self {
        Self {
            id: Some(SETTINGS_ID.to_string()),
            default_permissions: Some(f64::from(remote.default_permissions.unwrap_or_default())),
            app_language: Some(remote.app_language.clone().unwrap_or_default()),
            application_title: Some(remote.application_title.clone().unwrap_or_default()),
            application_url: Some(remote.application_url.clone().unwrap_or_default()),
            trust_proxy: Some(remote.trust_proxy.unwrap_or_default()),
            csrf_protection: Some(remote.csrf_protection.unwrap_or_default()),
            hide_available: Some(remote.hide_available.unwrap_or_default()),
            partial_requests_enabled: Some(remote.partial_requests_enabled.unwrap_or_default()),
            local_login: Some(remote.local_login.unwrap_or_default()),
            new_plex_login: Some(remote.new_plex_login.unwrap_or_default()),
        }
    }

    /// Build the object sent to the server. Unset values are sent as zero values.
    pub fn to_remote(&self) -> MainSettings {
        MainSettings {
            api_key: None,
            app_language: Some(self.app_language.clone().unwrap_or_default()),
            application_title: Some(self.application_title.clone().unwrap_or_default()),
            application_url: Some(self.application_url.clone().unwrap_or_default()),
            trust_proxy: Some(self.trust_proxy.unwrap_or_default()),
            csrf_protection: Some(self.csrf_protection.unwrap_or_default()),
            hide_available: Some(self.hide_available.unwrap_or_default()),
            partial_requests_enabled: Some(self.partial_requests_enabled.unwrap_or_default()),
            local_login: Some(self.local_login.unwrap_or_default()),
            new_plex_login: Some(self.new_plex_login.unwrap_or_default()),
            // The server stores a 32-bit float.
            default_permissions: Some(self.default_permissions.unwrap_or_default() as f32),
        }
    }

    fn apply_defaults(&mut self) {
        self.app_language
            .get_or_insert_with(|| DEFAULT_APP_LANGUAGE.to_string());
        self.trust_proxy.get_or_insert(DEFAULT_TRUST_PROXY);
        self.csrf_protection.get_or_insert(DEFAULT_CSRF_PROTECTION);
        self.hide_available.get_or_insert(DEFAULT_HIDE_AVAILABLE);
        self.partial_requests_enabled
            .get_or_insert(DEFAULT_PARTIAL_REQUESTS_ENABLED);
    }

    fn carry_computed(&mut self, prior: &Settings) {
        self.id = prior.id.clone();
        self.default_permissions = prior.default_permissions;
        self.local_login = prior.local_login;
        self.new_plex_login = prior.new_plex_login;
        if self.application_url.is_none() {
            self.application_url = prior.application_url.clone();
        }
    }
}

/// Manages Overseerr's global settings.
#[derive(Debug, Default)]
pub struct SettingsResource {
    client: Option<ProviderData>,
}

impl SettingsResource {
    /// Create an unconfigured resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory used by the provider's resource registry.
    pub fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    fn client(&self) -> Result<&OverseerrClient, ProviderError> {
        self.client.as_deref().ok_or_else(|| {
            ProviderError::Configuration(
                "Unconfigured provider client: the provider must be configured before managing settings"
                    .to_string(),
            )
        })
    }

    async fn commit(&self, planned_state: Value, action: &str) -> Result<Value, ProviderError> {
        let settings: Settings = serde_json::from_value(planned_state)?;
        let request = settings.to_remote();

        let response = self
            .client()?
            .create_main_settings(&request)
            .await
            .map_err(|e| {
                ProviderError::client(format!("Unable to {} config, got error: {}", action, e))
            })?;

        Ok(serde_json::to_value(Settings::from_remote(&response))?)
    }
}

#[async_trait::async_trait]
impl Resource for SettingsResource {
    fn metadata(&self, provider_type_name: &str) -> String {
        format!("{}_{}", provider_type_name, SETTINGS_RESOURCE_NAME)
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Settings resource.\nFor more information refer to \
                 [Settings](https://docs.overseerr.dev/using-overseerr/settings#general) documentation.",
            )
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Settings identifier."),
            )
            .with_attribute(
                "new_plex_login",
                Attribute::computed_bool().with_description("New Plex login."),
            )
            .with_attribute(
                "local_login",
                Attribute::computed_bool().with_description("Local login."),
            )
            .with_attribute(
                "partial_requests_enabled",
                Attribute::optional_computed_bool()
                    .with_description("Partial requests enabled.")
                    .with_default(json!(DEFAULT_PARTIAL_REQUESTS_ENABLED)),
            )
            .with_attribute(
                "hide_available",
                Attribute::optional_computed_bool()
                    .with_description("Hide available.")
                    .with_default(json!(DEFAULT_HIDE_AVAILABLE)),
            )
            .with_attribute(
                "csrf_protection",
                Attribute::optional_computed_bool()
                    .with_description("CSRF protection.")
                    .with_default(json!(DEFAULT_CSRF_PROTECTION)),
            )
            .with_attribute(
                "trust_proxy",
                Attribute::optional_computed_bool()
                    .with_description("Trust proxy.")
                    .with_default(json!(DEFAULT_TRUST_PROXY)),
            )
            .with_attribute(
                "default_permissions",
                Attribute::computed_float64().with_description("Default permissions."),
            )
            .with_attribute(
                "application_url",
                Attribute::optional_computed_string().with_description("Application URL."),
            )
            .with_attribute(
                "application_title",
                Attribute::required_string().with_description("Instance name."),
            )
            .with_attribute(
                "app_language",
                Attribute::optional_computed_string()
                    .with_description("Application language.")
                    .with_default(json!(DEFAULT_APP_LANGUAGE)),
            )
    }

    fn configure(&mut self, data: Option<ProviderData>) -> Result<(), ProviderError> {
        // Nothing to do until the provider has been configured.
        if let Some(client) = data {
            self.client = Some(client);
        }
        Ok(())
    }

    async fn plan(
        &self,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        // Destroy: nothing to decode, state is dropped locally.
        if proposed_state.is_null() {
            return Ok(PlanResult::destroy(prior_state.as_ref()));
        }

        let mut planned: Settings = serde_json::from_value(proposed_state)?;
        planned.apply_defaults();

        let prior = prior_state
            .map(serde_json::from_value::<Settings>)
            .transpose()?;
        match &prior {
            Some(prior) => planned.carry_computed(prior),
            None => {
                // Known after apply
                planned.id = None;
                planned.default_permissions = None;
                planned.local_login = None;
                planned.new_plex_login = None;
            }
        }

        let prior = prior.map(serde_json::to_value).transpose()?;
        let planned = serde_json::to_value(planned)?;
        Ok(PlanResult::in_place(prior.as_ref(), planned))
    }

    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        let state = self.commit(planned_state, "create").await?;
        trace!("created {}", SETTINGS_RESOURCE_NAME);
        Ok(state)
    }

    async fn read(&self, _current_state: Value) -> Result<Value, ProviderError> {
        let response = self.client()?.get_main_settings().await.map_err(|e| {
            ProviderError::client(format!("Unable to read config, got error: {}", e))
        })?;

        trace!("read {}", SETTINGS_RESOURCE_NAME);
        Ok(serde_json::to_value(Settings::from_remote(&response))?)
    }

    async fn update(
        &self,
        _prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let state = self.commit(planned_state, "update").await?;
        trace!("updated {}", SETTINGS_RESOURCE_NAME);
        Ok(state)
    }

    async fn delete(&self, _current_state: Value) -> Result<(), ProviderError> {
        // Settings cannot be deleted remotely, only decoupled from state.
        trace!("decoupled {}", SETTINGS_RESOURCE_NAME);
        Ok(())
    }

    async fn import_state(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        trace!(id = %id, "imported {}", SETTINGS_RESOURCE_NAME);
        let state = Settings {
            id: Some(SETTINGS_ID.to_string()),
            ..Default::default()
        };
        Ok(vec![ImportedResource::new(
            resource_type,
            serde_json::to_value(state)?,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn remote() -> MainSettings {
        MainSettings {
            api_key: Some("secret".to_string()),
            app_language: Some("en".to_string()),
            application_title: Some("overseerr".to_string()),
            application_url: Some("https://requests.example.com".to_string()),
            trust_proxy: Some(true),
            csrf_protection: Some(false),
            hide_available: Some(false),
            partial_requests_enabled: Some(true),
            local_login: Some(true),
            new_plex_login: Some(false),
            default_permissions: Some(32.0),
        }
    }

    #[test]
    fn test_from_remote_copies_every_field() {
        let settings = Settings::from_remote(&remote());
        assert_eq!(settings.id.as_deref(), Some(SETTINGS_ID));
        assert_eq!(settings.default_permissions, Some(32.0));
        assert_eq!(settings.app_language.as_deref(), Some("en"));
        assert_eq!(settings.application_title.as_deref(), Some("overseerr"));
        assert_eq!(
            settings.application_url.as_deref(),
            Some("https://requests.example.com")
        );
        assert_eq!(settings.trust_proxy, Some(true));
        assert_eq!(settings.csrf_protection, Some(false));
        assert_eq!(settings.hide_available, Some(false));
        assert_eq!(settings.partial_requests_enabled, Some(true));
        assert_eq!(settings.local_login, Some(true));
        assert_eq!(settings.new_plex_login, Some(false));
    }

    #[test]
    fn test_from_remote_fills_zero_values() {
        let settings = Settings::from_remote(&MainSettings::default());
        assert_eq!(settings.application_title.as_deref(), Some(""));
        assert_eq!(settings.trust_proxy, Some(false));
        assert_eq!(settings.default_permissions, Some(0.0));
    }

    #[test]
    fn test_to_remote_round_trips_through_local_state() {
        let mut expected = remote();
        expected.api_key = None;
        assert_eq!(Settings::from_remote(&remote()).to_remote(), expected);
    }

    #[test]
    fn test_state_serializes_every_attribute() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        let obj = value.as_object().unwrap();
        let schema = SettingsResource::new().schema();
        assert_eq!(obj.len(), schema.block.attributes.len());
        for name in schema.block.attributes.keys() {
            assert!(obj.contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn test_metadata_and_schema() {
        let resource = SettingsResource::new();
        assert_eq!(resource.metadata("overseerr"), "overseerr_settings");

        let schema = resource.schema();
        let title = schema.attribute("application_title").unwrap();
        assert!(title.flags.required);

        let required: Vec<_> = schema
            .block
            .attributes
            .values()
            .filter(|a| a.flags.required)
            .collect();
        assert_eq!(required.len(), 1);

        let read_only: Vec<_> = schema
            .block
            .attributes
            .iter()
            .filter(|(_, a)| a.flags.is_read_only())
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(read_only.len(), 4);
        assert!(read_only.contains(&"default_permissions"));

        assert_eq!(
            schema.attribute("app_language").unwrap().default,
            Some(json!("en"))
        );
        assert_eq!(
            schema.attribute("hide_available").unwrap().default,
            Some(json!(false))
        );
    }

    #[tokio::test]
    async fn test_plan_create_applies_defaults() {
        let resource = SettingsResource::new();
        let plan = resource
            .plan(None, json!({"application_title": "overseerr"}))
            .await
            .unwrap();

        let planned = &plan.planned_state;
        assert_eq!(planned["application_title"], "overseerr");
        assert_eq!(planned["app_language"], "en");
        assert_eq!(planned["trust_proxy"], true);
        assert_eq!(planned["csrf_protection"], true);
        assert_eq!(planned["hide_available"], false);
        assert_eq!(planned["partial_requests_enabled"], true);
        assert!(planned["id"].is_null());
        assert!(planned["default_permissions"].is_null());
        assert!(planned["application_url"].is_null());
        assert!(!plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_update_carries_computed_values() {
        let resource = SettingsResource::new();
        let prior = serde_json::to_value(Settings::from_remote(&remote())).unwrap();

        let plan = resource
            .plan(
                Some(prior),
                json!({"application_title": "overseerrTest", "csrf_protection": false}),
            )
            .await
            .unwrap();

        assert_eq!(plan.planned_state["id"], SETTINGS_ID);
        assert_eq!(plan.planned_state["default_permissions"], 32.0);
        assert_eq!(
            plan.planned_state["application_url"],
            "https://requests.example.com"
        );
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "application_title");
    }

    #[tokio::test]
    async fn test_plan_without_changes() {
        let resource = SettingsResource::new();
        let prior = serde_json::to_value(Settings::from_remote(&remote())).unwrap();

        let plan = resource
            .plan(
                Some(prior),
                json!({"application_title": "overseerr", "csrf_protection": false}),
            )
            .await
            .unwrap();

        assert!(plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        // Unconfigured on purpose: destroy planning never needs the client.
        let resource = SettingsResource::new();
        let prior = serde_json::to_value(Settings::from_remote(&remote())).unwrap();

        let plan = resource.plan(Some(prior), Value::Null).await.unwrap();

        assert!(plan.planned_state.is_null());
        assert!(!plan.requires_replace);
        assert_eq!(plan.changes.len(), 11);
        assert!(plan.changes.iter().all(|change| change.after.is_none()));
    }

    #[tokio::test]
    async fn test_unconfigured_resource() {
        let mut resource = SettingsResource::new();
        resource.configure(None).unwrap();

        let err = resource.read(Value::Null).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        // Delete never needs the client.
        resource.delete(Value::Null).await.unwrap();
    }

    #[tokio::test]
    async fn test_configure_keeps_client() {
        let client = Arc::new(OverseerrClient::new("http://localhost:5055", "key").unwrap());
        let mut resource = SettingsResource::new();
        resource.configure(Some(client)).unwrap();
        assert!(resource.client().is_ok());
    }

    #[test]
    fn test_import_ignores_identifier() {
        let resource = SettingsResource::new();
        let imported =
            tokio_test::block_on(resource.import_state("overseerr_settings", "anything-at-all"))
                .unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "overseerr_settings");
        assert_eq!(imported[0].state["id"], SETTINGS_ID);
        assert!(imported[0].state["application_title"].is_null());
    }
}
