//! The Overseerr provider: configuration, schema and resource dispatch.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use crate::client::OverseerrClient;
use crate::error::ProviderError;
use crate::resource::{ProviderData, Resource, ResourceFactory};
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::settings::SettingsResource;
use crate::types::{AttrValue, ConfigValue, ImportedResource, PlanResult};
use crate::validation::validate;

/// Provider type name; prefix of every resource type.
pub const TYPE_NAME: &str = "overseerr";

/// Environment variable read when `url` is not configured.
pub const URL_ENV: &str = "OVERSEERR_URL";

/// Environment variable read when `api_key` is not configured.
pub const API_KEY_ENV: &str = "OVERSEERR_API_KEY";

const RESOURCES: &[ResourceFactory] = &[SettingsResource::boxed];

/// Looks up an environment variable.
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// The Overseerr provider.
///
/// Holds the client published by the last successful Configure. Every
/// resource call gets a fresh resource instance configured with it.
pub struct OverseerrProvider {
    version: String,
    env: EnvLookup,
    client: RwLock<Option<ProviderData>>,
}

impl OverseerrProvider {
    /// Create an unconfigured provider reporting `version`.
    pub fn new(version: impl Into<String>) -> Self {
        Self::with_env(version, process_env)
    }

    /// Create a provider that reads fallback values through `env`.
    pub fn with_env(version: impl Into<String>, env: EnvLookup) -> Self {
        Self {
            version: version.into(),
            env,
            client: RwLock::new(None),
        }
    }

    /// The client published by Configure, if any.
    pub fn client(&self) -> Option<ProviderData> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, client: OverseerrClient) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(client));
    }

    fn provider_config_schema() -> Schema {
        Schema::v0()
            .with_description(
                "The Overseerr provider is used to interact with any [Overseerr](https://overseerr.dev/) installation.\n\
                 You must configure the provider with the proper [credentials](#api_key) before you can use it.\n\
                 Use the left navigation to read about the available resources.",
            )
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .with_description(
                        "API key for Overseerr authentication. \
                         Can be specified via the `OVERSEERR_API_KEY` environment variable.",
                    )
                    .sensitive(),
            )
            .with_attribute(
                "url",
                Attribute::optional_string().with_description(
                    "Full Overseerr URL with protocol and port (e.g. `https://test.overseerr.tv:5055`). \
                     You should **NOT** supply any path (`/api`), the provider will use the appropriate paths. \
                     Can be specified via the `OVERSEERR_URL` environment variable.",
                ),
            )
    }

    /// Build and configure the resource registered under `resource_type`.
    fn resource(&self, resource_type: &str) -> Result<Box<dyn Resource>, ProviderError> {
        let mut resource = RESOURCES
            .iter()
            .map(|factory| factory())
            .find(|resource| resource.metadata(TYPE_NAME) == resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;

        resource.configure(self.client())?;
        Ok(resource)
    }
}

/// How an unset value is reported.
struct Missing {
    attribute: &'static str,
    env: &'static str,
    summary: &'static str,
    detail: &'static str,
}

const MISSING_URL: Missing = Missing {
    attribute: "url",
    env: URL_ENV,
    summary: "Unable to find URL",
    detail: "URL cannot be an empty string",
};

const MISSING_API_KEY: Missing = Missing {
    attribute: "api_key",
    env: API_KEY_ENV,
    summary: "Unable to find API key",
    detail: "API key cannot be an empty string",
};

/// Resolve one provider setting: configured value first, then the
/// environment. Unknown values stop configuration with a warning, empty
/// values with an error.
fn resolve_setting(
    value: AttrValue<String>,
    missing: &Missing,
    env: EnvLookup,
) -> Result<String, Diagnostic> {
    let resolved = match value {
        AttrValue::Unknown => {
            return Err(Diagnostic::warning("Unable to create client")
                .with_detail(format!("Cannot use unknown value as {}", missing.attribute))
                .with_attribute(missing.attribute));
        }
        AttrValue::Null => env(missing.env).unwrap_or_default(),
        AttrValue::Known(value) => value,
    };

    if resolved.is_empty() {
        return Err(Diagnostic::error(missing.summary)
            .with_detail(missing.detail)
            .with_attribute(missing.attribute));
    }
    Ok(resolved)
}

#[async_trait::async_trait]
impl ProviderService for OverseerrProvider {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn schema(&self) -> ProviderSchema {
        let resources: HashMap<String, Schema> = RESOURCES
            .iter()
            .map(|factory| {
                let resource = factory();
                (resource.metadata(TYPE_NAME), resource.schema())
            })
            .collect();

        ProviderSchema {
            provider: Self::provider_config_schema(),
            resources,
            data_sources: HashMap::new(),
        }
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::provider_config_schema(), &config))
    }

    async fn configure(&self, config: ConfigValue) -> Result<Vec<Diagnostic>, ProviderError> {
        let url = match resolve_setting(config.get_string("url")?, &MISSING_URL, self.env) {
            Ok(url) => url,
            Err(diagnostic) => return Ok(vec![diagnostic]),
        };
        let api_key = config.get_string("api_key")?;
        let api_key = match resolve_setting(api_key, &MISSING_API_KEY, self.env) {
            Ok(api_key) => api_key,
            Err(diagnostic) => return Ok(vec![diagnostic]),
        };

        let client = match OverseerrClient::new(&url, &api_key) {
            Ok(client) => client,
            Err(e) => {
                return Ok(vec![
                    Diagnostic::error("Unable to create client").with_detail(e.to_string())
                ]);
            }
        };

        info!(url = %client.base_url(), "Configured Overseerr client");
        self.publish(client);
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(validate(&resource.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.resource(resource_type)?
            .plan(prior_state, proposed_state)
            .await
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.create(planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type)?.delete(current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        debug!(resource_type = %resource_type, "Importing resource");
        self.resource(resource_type)?
            .import_state(resource_type, id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{has_errors, DiagnosticSeverity};
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn fake_env(name: &str) -> Option<String> {
        match name {
            URL_ENV => Some("http://env.example.com:5055".to_string()),
            API_KEY_ENV => Some("env-key".to_string()),
            _ => None,
        }
    }

    fn known(config: Value) -> ConfigValue {
        ConfigValue::new(config)
    }

    #[test]
    fn test_metadata() {
        let provider = OverseerrProvider::new("1.2.3");
        let metadata = provider.metadata();
        assert_eq!(metadata.type_name, "overseerr");
        assert_eq!(metadata.version, "1.2.3");
        assert_eq!(metadata.resources, vec!["overseerr_settings".to_string()]);
        assert!(metadata.data_sources.is_empty());
    }

    #[test]
    fn test_schema() {
        let schema = OverseerrProvider::new("test").schema();

        let api_key = schema.provider.attribute("api_key").unwrap();
        assert!(api_key.flags.optional);
        assert!(api_key.flags.sensitive);
        let url = schema.provider.attribute("url").unwrap();
        assert!(url.flags.optional);
        assert!(!url.flags.sensitive);

        assert!(schema.resources.contains_key("overseerr_settings"));
        assert!(schema.data_sources.is_empty());
    }

    #[test]
    fn test_resolve_setting() {
        assert_eq!(
            resolve_setting(AttrValue::Known("x".to_string()), &MISSING_URL, fake_env).unwrap(),
            "x"
        );
        assert_eq!(
            resolve_setting(AttrValue::Null, &MISSING_URL, fake_env).unwrap(),
            "http://env.example.com:5055"
        );

        let unknown = resolve_setting(AttrValue::Unknown, &MISSING_API_KEY, fake_env).unwrap_err();
        assert_eq!(unknown.severity, DiagnosticSeverity::Warning);
        assert_eq!(unknown.summary, "Unable to create client");
        assert_eq!(unknown.detail.as_deref(), Some("Cannot use unknown value as api_key"));

        let empty =
            resolve_setting(AttrValue::Known(String::new()), &MISSING_URL, fake_env).unwrap_err();
        assert_eq!(empty.severity, DiagnosticSeverity::Error);
        assert_eq!(empty.summary, "Unable to find URL");
        assert_eq!(empty.detail.as_deref(), Some("URL cannot be an empty string"));

        let unset = resolve_setting(AttrValue::Null, &MISSING_API_KEY, no_env).unwrap_err();
        assert_eq!(unset.summary, "Unable to find API key");
        assert_eq!(unset.detail.as_deref(), Some("API key cannot be an empty string"));
    }

    #[tokio::test]
    async fn test_configure_publishes_client() {
        let provider = OverseerrProvider::with_env("test", no_env);
        assert!(provider.client().is_none());

        let diagnostics = provider
            .configure(known(json!({"url": "http://localhost:5055/", "api_key": "key"})))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());

        let client = provider.client().unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5055/");
    }

    #[tokio::test]
    async fn test_configure_falls_back_to_env() {
        let provider = OverseerrProvider::with_env("test", fake_env);
        let diagnostics = provider.configure(known(json!({}))).await.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(
            provider.client().unwrap().base_url().as_str(),
            "http://env.example.com:5055/"
        );
    }

    #[tokio::test]
    async fn test_configure_replaces_client() {
        let provider = OverseerrProvider::with_env("test", no_env);
        provider
            .configure(known(json!({"url": "http://one:5055", "api_key": "key"})))
            .await
            .unwrap();
        provider
            .configure(known(json!({"url": "http://two:5055", "api_key": "key"})))
            .await
            .unwrap();

        assert_eq!(provider.client().unwrap().base_url().as_str(), "http://two:5055/");
    }

    #[tokio::test]
    async fn test_configure_unknown_url_warns() {
        let provider = OverseerrProvider::with_env("test", fake_env);
        let config = known(json!({"api_key": "key"})).with_unknown("url");

        let diagnostics = provider.configure(config).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Cannot use unknown value as url")
        );
        assert!(provider.client().is_none());
    }

    #[tokio::test]
    async fn test_configure_missing_url_checked_before_api_key() {
        let provider = OverseerrProvider::with_env("test", no_env);
        let config = known(json!({"url": ""})).with_unknown("api_key");

        let diagnostics = provider.configure(config).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Unable to find URL");
        assert!(provider.client().is_none());
    }

    #[tokio::test]
    async fn test_configure_missing_api_key() {
        let provider = OverseerrProvider::with_env("test", no_env);
        let diagnostics = provider
            .configure(known(json!({"url": "http://localhost:5055"})))
            .await
            .unwrap();

        assert!(has_errors(&diagnostics));
        assert_eq!(diagnostics[0].summary, "Unable to find API key");
    }

    #[tokio::test]
    async fn test_configure_invalid_url() {
        let provider = OverseerrProvider::with_env("test", no_env);
        let diagnostics = provider
            .configure(known(json!({"url": "localhost", "api_key": "key"})))
            .await
            .unwrap();

        assert!(has_errors(&diagnostics));
        assert_eq!(diagnostics[0].summary, "Unable to create client");
        assert!(provider.client().is_none());
    }

    #[tokio::test]
    async fn test_configure_wrong_type() {
        let provider = OverseerrProvider::with_env("test", no_env);
        let err = provider
            .configure(known(json!({"url": 5055, "api_key": "key"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let provider = OverseerrProvider::new("test");
        assert!(provider
            .validate_provider_config(json!({"url": "http://localhost:5055"}))
            .await
            .unwrap()
            .is_empty());
        assert!(provider
            .validate_provider_config(Value::Null)
            .await
            .unwrap()
            .is_empty());

        let diagnostics = provider
            .validate_provider_config(json!({"url": true}))
            .await
            .unwrap();
        assert!(has_errors(&diagnostics));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let provider = OverseerrProvider::new("test");

        let ok = provider
            .validate_resource_config(
                "overseerr_settings",
                json!({"application_title": "overseerr"}),
            )
            .await
            .unwrap();
        assert!(ok.is_empty());

        let missing = provider
            .validate_resource_config("overseerr_settings", json!({"trust_proxy": true}))
            .await
            .unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].attribute.as_deref(), Some("application_title"));

        let read_only = provider
            .validate_resource_config(
                "overseerr_settings",
                json!({"application_title": "overseerr", "local_login": true}),
            )
            .await
            .unwrap();
        assert_eq!(read_only.len(), 1);
        assert_eq!(read_only[0].attribute.as_deref(), Some("local_login"));
    }

    #[tokio::test]
    async fn test_plan_destroy_settings() {
        let provider = OverseerrProvider::new("test");
        let prior = json!({
            "id": "settings",
            "application_title": "overseerr",
            "app_language": "en",
            "application_url": "",
            "trust_proxy": true,
            "csrf_protection": true,
            "hide_available": false,
            "partial_requests_enabled": true,
            "local_login": true,
            "new_plex_login": true,
            "default_permissions": 32.0
        });

        let plan = provider
            .plan("overseerr_settings", Some(prior), Value::Null, Value::Null)
            .await
            .unwrap();

        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 11);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = OverseerrProvider::new("test");
        let err = provider.read("overseerr_user", json!({})).await.unwrap_err();
        assert!(
            matches!(err, ProviderError::UnknownResource(ref name) if name == "overseerr_user")
        );
    }

    #[tokio::test]
    async fn test_unconfigured_read_fails() {
        let provider = OverseerrProvider::new("test");
        let err = provider
            .read("overseerr_settings", json!({"id": "settings"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
