//! Overseerr provider
//!
//! An infrastructure-as-code provider plugin that manages the global
//! settings of an [Overseerr](https://overseerr.dev/) instance. The plugin
//! speaks a gRPC protocol modeled on
//! [terraform-plugin-go](https://github.com/hashicorp/terraform-plugin-go)
//! and calls the Overseerr REST API on the host's behalf.
//!
//! # Overview
//!
//! - **Protocol Buffers types**: Pre-compiled Rust types for the provider protocol
//! - **Schema types**: Types for describing provider and resource schemas
//! - **ProviderService trait**: The high-level trait served over gRPC
//! - **OverseerrProvider**: Configuration and dispatch for the `overseerr` provider
//! - **SettingsResource**: The `overseerr_settings` resource
//! - **OverseerrClient**: Async HTTP client for the Overseerr API
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```no_run
//! use overseerr_provider::{init_logging, serve, OverseerrProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(OverseerrProvider::new(env!("CARGO_PKG_VERSION"))).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it outputs a handshake string to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
//!
//! The host spawns the provider as a subprocess and connects via gRPC.
//!
//! # Provider Protocol
//!
//! - **GetMetadata**: Returns the type name, version and resource names
//! - **GetSchema**: Returns full schema for provider config and resources
//! - **ValidateProviderConfig**: Validates provider configuration
//! - **Configure**: Builds the Overseerr client from `url` and `api_key`
//! - **Stop**: Gracefully shuts down the provider
//! - **ValidateResourceConfig**: Validates resource configuration
//! - **UpgradeResourceState**: Migrates state from older schema versions
//! - **Plan**: Calculates required changes
//! - **Create/Read/Update/Delete**: Lifecycle operations for resources
//! - **ImportResourceState**: Imports existing settings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod settings;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use client::{MainSettings, OverseerrClient};
pub use error::{ClientError, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::OverseerrProvider;
pub use resource::{ProviderData, Resource};
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use settings::{Settings, SettingsResource};
pub use types::{
    AttrValue, AttributeChange, ConfigValue, ImportedResource, PlanResult, ProviderMetadata,
    ServerCapabilities, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};
