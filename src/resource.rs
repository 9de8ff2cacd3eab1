//! The lifecycle contract every managed resource implements.
//!
//! The provider builds a fresh resource instance for each request, hands
//! it the typed provider data through [`Resource::configure`], and then
//! calls exactly one lifecycle method.

use std::sync::Arc;

use serde_json::Value;

use crate::client::OverseerrClient;
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::types::{ImportedResource, PlanResult};

/// Data the provider shares with every resource after a successful configure.
pub type ProviderData = Arc<OverseerrClient>;

/// Builds an unconfigured resource instance.
pub type ResourceFactory = fn() -> Box<dyn Resource>;

/// A managed resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// The full resource type name, derived from the provider's type name.
    fn metadata(&self, provider_type_name: &str) -> String;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Receive the provider data.
    ///
    /// `None` means the provider has not been configured yet; this is not
    /// an error.
    fn configure(&mut self, data: Option<ProviderData>) -> Result<(), ProviderError>;

    /// Plan changes for the resource. `prior_state` is `None` on create.
    async fn plan(
        &self,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the resource from the planned state, returning the new state.
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh the resource, returning its current state.
    async fn read(&self, current_state: Value) -> Result<Value, ProviderError>;

    /// Apply the planned state to an existing resource, returning the new state.
    async fn update(&self, prior_state: Value, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Stop managing the resource.
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError>;

    /// Bring an existing object under management.
    ///
    /// The returned states are refreshed by a following read.
    async fn import_state(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;
}
