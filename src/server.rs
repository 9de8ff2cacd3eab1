//! Server helpers for running the provider.
//!
//! This module provides the `ProviderService` trait the provider implements,
//! and the `serve` function to start a gRPC server with the handshake protocol.
//!
//! # Signal Handling
//!
//! The server handles OS signals (SIGTERM, SIGINT) for graceful shutdown.
//! When a signal is received, the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete (with configurable timeout)
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as proto;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    ConfigValue, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};

/// Trait the provider implements.
///
/// This is a higher-level API than the raw gRPC trait, using
/// Rust types instead of protobuf types. Errors returned from any method
/// reach the host as error diagnostics.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// The provider type name. Every resource type is prefixed with it.
    fn type_name(&self) -> &str;

    /// The provider version.
    fn version(&self) -> &str;

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        let mut resources: Vec<String> = schema.resources.keys().cloned().collect();
        resources.sort();
        ProviderMetadata {
            type_name: self.type_name().to_string(),
            version: self.version().to_string(),
            resources,
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider. Returns diagnostics (errors and warnings).
    async fn configure(&self, config: ConfigValue) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade resource state from an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Sdk(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| proto::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: &ProviderError) -> Vec<proto::Diagnostic> {
    diagnostics_to_proto(vec![err.to_diagnostic()])
}

/// Decode a JSON payload. An empty payload is `null`.
fn decode(payload: &[u8], field: &str) -> Result<Value, ProviderError> {
    if payload.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(payload)
        .map_err(|e| ProviderError::InvalidRequest(format!("malformed {} payload: {}", field, e)))
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn schema_to_proto(schema: &crate::schema::Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &crate::schema::Block) -> proto::Block {
    let mut attributes: Vec<proto::Attribute> = block
        .attributes
        .iter()
        .map(|(name, attr)| proto::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: attr.default.as_ref().map(encode).unwrap_or_default(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    proto::Block {
        attributes,
        description: block.description.clone().unwrap_or_default(),
    }
}

fn log_diagnostics(rpc: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(diagnostics = diagnostics.len(), "{} completed with errors", rpc);
    } else {
        info!(diagnostics = diagnostics.len(), "{} completed successfully", rpc);
    }
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<proto::GetMetadataRequest>,
    ) -> Result<tonic::Response<proto::GetMetadataResponse>, tonic::Status> {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(
            type_name = %metadata.type_name,
            resources = metadata.resources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(proto::GetMetadataResponse {
            server_capabilities: Some(proto::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
            type_name: metadata.type_name,
            version: metadata.version,
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<proto::GetSchemaRequest>,
    ) -> Result<tonic::Response<proto::GetSchemaResponse>, tonic::Status> {
        debug!("GetSchema called");
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(tonic::Response::new(proto::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<tonic::Response<proto::ValidateProviderConfigResponse>, tonic::Status> {
        debug!("ValidateProviderConfig called");
        let result = match decode(&request.into_inner().config, "config") {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateProviderConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(proto::ValidateProviderConfigResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<proto::ConfigureRequest>,
    ) -> Result<tonic::Response<proto::ConfigureResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(unknown = req.unknown_paths.len(), "Configure called");
        let result = match decode(&req.config, "config") {
            Ok(config) => {
                let config = ConfigValue::from((config, req.unknown_paths));
                self.provider.configure(config).await
            }
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("Configure", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(proto::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<proto::StopRequest>,
    ) -> Result<tonic::Response<proto::StopResponse>, tonic::Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                String::new()
            }
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(tonic::Response::new(proto::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<proto::ValidateResourceConfigResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");
        let result = match decode(&req.config, "config") {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            }
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "ValidateResourceConfig failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(proto::ValidateResourceConfigResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.upgrade_resource_state")]
    async fn upgrade_resource_state(
        &self,
        request: tonic::Request<proto::UpgradeResourceStateRequest>,
    ) -> Result<tonic::Response<proto::UpgradeResourceStateResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, version = req.version, "UpgradeResourceState called");
        let result = match decode(&req.raw_state, "raw_state") {
            Ok(state) => {
                self.provider
                    .upgrade_resource_state(&req.resource_type, req.version, state)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(upgraded) => {
                info!(resource_type = %req.resource_type, from_version = req.version, "UpgradeResourceState completed");
                Ok(tonic::Response::new(proto::UpgradeResourceStateResponse {
                    upgraded_state: encode(&upgraded),
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, version = req.version, error = %e, "UpgradeResourceState failed");
                Ok(tonic::Response::new(proto::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<proto::PlanRequest>,
    ) -> Result<tonic::Response<proto::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, is_create = req.prior_state.is_empty(), "Plan called");

        let decoded = (
            decode(&req.prior_state, "prior_state"),
            decode(&req.proposed_state, "proposed_state"),
            decode(&req.config, "config"),
        );
        let result = match decoded {
            (Ok(prior_state), Ok(proposed_state), Ok(config)) => {
                let prior_state = (!prior_state.is_null()).then_some(prior_state);
                self.provider
                    .plan(&req.resource_type, prior_state, proposed_state, config)
                    .await
            }
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => Err(e),
        };

        match result {
            Ok(result) => {
                info!(
                    resource_type = %req.resource_type,
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(tonic::Response::new(proto::PlanResponse {
                    planned_state: encode(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Plan failed");
                Ok(tonic::Response::new(proto::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<proto::CreateRequest>,
    ) -> Result<tonic::Response<proto::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Create called");
        let result = match decode(&req.planned_state, "planned_state") {
            Ok(planned_state) => self.provider.create(&req.resource_type, planned_state).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(resource_type = %req.resource_type, "Create completed successfully");
                Ok(tonic::Response::new(proto::CreateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Create failed");
                Ok(tonic::Response::new(proto::CreateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<proto::ReadRequest>,
    ) -> Result<tonic::Response<proto::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Read called");
        let result = match decode(&req.current_state, "current_state") {
            Ok(current_state) => self.provider.read(&req.resource_type, current_state).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                debug!(resource_type = %req.resource_type, "Read completed successfully");
                Ok(tonic::Response::new(proto::ReadResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Read failed");
                Ok(tonic::Response::new(proto::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<proto::UpdateRequest>,
    ) -> Result<tonic::Response<proto::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Update called");
        let decoded = (
            decode(&req.prior_state, "prior_state"),
            decode(&req.planned_state, "planned_state"),
        );
        let result = match decoded {
            (Ok(prior_state), Ok(planned_state)) => {
                self.provider
                    .update(&req.resource_type, prior_state, planned_state)
                    .await
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(resource_type = %req.resource_type, "Update completed successfully");
                Ok(tonic::Response::new(proto::UpdateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Update failed");
                Ok(tonic::Response::new(proto::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<proto::DeleteRequest>,
    ) -> Result<tonic::Response<proto::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Delete called");
        let result = match decode(&req.current_state, "current_state") {
            Ok(current_state) => self.provider.delete(&req.resource_type, current_state).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(()) => {
                info!(resource_type = %req.resource_type, "Delete completed successfully");
                vec![]
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Delete failed");
                error_to_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(proto::DeleteResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.import_resource_state")]
    async fn import_resource_state(
        &self,
        request: tonic::Request<proto::ImportResourceStateRequest>,
    ) -> Result<tonic::Response<proto::ImportResourceStateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "ImportResourceState called");

        match self
            .provider
            .import_resource(&req.resource_type, &req.id)
            .await
        {
            Ok(imported) => {
                info!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    imported_count = imported.len(),
                    "ImportResourceState completed"
                );
                Ok(tonic::Response::new(proto::ImportResourceStateResponse {
                    imported: imported
                        .into_iter()
                        .map(|r| proto::ImportedResource {
                            state: encode(&r.state),
                            resource_type: r.resource_type,
                        })
                        .collect(),
                    diagnostics: vec![],
                }))
            }
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "ImportResourceState failed");
                Ok(tonic::Response::new(proto::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            }
        }
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Timeout for graceful shutdown. After receiving a shutdown signal,
    /// the server will wait this long for in-flight requests to complete.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT; CTRL+C on Windows).
///
/// If a handler cannot be installed the error is logged and the server
/// keeps running until the host kills it.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending::<()>().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, initiating graceful shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve a provider implementation as a gRPC server.
///
/// This function:
/// 1. Binds to an available local port
/// 2. Starts the gRPC server
/// 3. Outputs the handshake string to stdout
/// 4. Handles shutdown signals (SIGTERM/SIGINT) gracefully
///
/// The handshake format is: `HEMMER_PROVIDER|<version>|<address>`
///
/// For custom configuration, use [`serve_with_options`].
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    serve_on_listener(provider, listener, addr, options, wait_for_shutdown_signal()).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    serve_on_listener(provider, listener, actual_addr, options, wait_for_shutdown_signal()).await
}

async fn serve_on_listener<P, S>(
    provider: P,
    listener: TcpListener,
    addr: SocketAddr,
    options: ServeOptions,
    shutdown_signal: S,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    S: std::future::Future<Output = ()>,
{
    // stdout carries nothing but this line
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);

    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };
    let server = proto::provider_server::ProviderServer::new(grpc_service);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_future = Server::builder()
        .add_service(server)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async {
                let _ = shutdown_rx.await;
            },
        );
    tokio::pin!(server_future);

    tokio::select! {
        result = &mut server_future => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
        },
        _ = shutdown_signal => {
            let _ = shutdown_tx.send(());
            // Only the drain after the signal is bounded.
            match tokio::time::timeout(options.shutdown_timeout, &mut server_future).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                }
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        },
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::provider_server::Provider as _;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct EchoProvider {
        stopped: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ProviderService for EchoProvider {
        fn type_name(&self) -> &str {
            "echo"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_provider_config(
                    Schema::v0().with_attribute("url", Attribute::optional_string()),
                )
                .with_resource(
                    "echo_thing",
                    Schema::v0()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("id", Attribute::computed_string()),
                )
        }

        async fn configure(&self, config: ConfigValue) -> Result<Vec<Diagnostic>, ProviderError> {
            if config.get_string("url")?.is_unknown() {
                return Ok(vec![Diagnostic::warning("unknown url")]);
            }
            Ok(vec![])
        }

        async fn stop(&self) -> Result<(), ProviderError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn plan(
            &self,
            _resource_type: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            Ok(PlanResult::in_place(prior_state.as_ref(), proposed_state))
        }

        async fn create(
            &self,
            _resource_type: &str,
            planned_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn read(
            &self,
            resource_type: &str,
            _current_state: Value,
        ) -> Result<Value, ProviderError> {
            Err(ProviderError::client(format!("Unable to read {}", resource_type)))
        }

        async fn update(
            &self,
            _resource_type: &str,
            _prior_state: Value,
            planned_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn delete(
            &self,
            _resource_type: &str,
            _current_state: Value,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn service() -> ProviderGrpcService<EchoProvider> {
        ProviderGrpcService {
            provider: Arc::new(EchoProvider::default()),
        }
    }

    #[tokio::test]
    async fn test_get_metadata() {
        let response = service()
            .get_metadata(tonic::Request::new(proto::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.type_name, "echo");
        assert_eq!(response.version, "0.0.1");
        assert_eq!(response.resources, vec!["echo_thing".to_string()]);
        assert!(response.data_sources.is_empty());
    }

    #[tokio::test]
    async fn test_get_schema() {
        let response = service()
            .get_schema(tonic::Request::new(proto::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        let resource = &response.resources["echo_thing"];
        let block = resource.block.as_ref().unwrap();
        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(block.attributes[0].r#type, b"\"string\"".to_vec());
        assert!(block.attributes[0].computed);
    }

    #[tokio::test]
    async fn test_configure_passes_unknown_paths() {
        let response = service()
            .configure(tonic::Request::new(proto::ConfigureRequest {
                config: b"{}".to_vec(),
                unknown_paths: vec!["url".to_string()],
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            proto::diagnostic::Severity::Warning as i32
        );
    }

    #[tokio::test]
    async fn test_configure_error_becomes_diagnostic() {
        let response = service()
            .configure(tonic::Request::new(proto::ConfigureRequest {
                config: br#"{"url": 5055}"#.to_vec(),
                unknown_paths: vec![],
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            proto::diagnostic::Severity::Error as i32
        );
    }

    #[tokio::test]
    async fn test_plan_and_create_round_trip_payloads() {
        let svc = service();
        let plan = svc
            .plan(tonic::Request::new(proto::PlanRequest {
                resource_type: "echo_thing".to_string(),
                prior_state: vec![],
                proposed_state: br#"{"name":"a"}"#.to_vec(),
                config: br#"{"name":"a"}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(plan.changes.len(), 1);
        assert!(plan.diagnostics.is_empty());

        let created = svc
            .create(tonic::Request::new(proto::CreateRequest {
                resource_type: "echo_thing".to_string(),
                planned_state: plan.planned_state,
            }))
            .await
            .unwrap()
            .into_inner();
        let state: Value = serde_json::from_slice(&created.state).unwrap();
        assert_eq!(state, json!({"name": "a"}));
    }

    #[tokio::test]
    async fn test_destroy_plan_with_empty_proposed_state() {
        let svc = ProviderGrpcService {
            provider: Arc::new(crate::provider::OverseerrProvider::new("test")),
        };
        let plan = svc
            .plan(tonic::Request::new(proto::PlanRequest {
                resource_type: "overseerr_settings".to_string(),
                prior_state: br#"{"id":"settings","application_title":"overseerr"}"#.to_vec(),
                proposed_state: vec![],
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.planned_state, b"null".to_vec());
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|change| change.after.is_empty()));
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_client_error_keeps_summary_and_detail() {
        let response = service()
            .read(tonic::Request::new(proto::ReadRequest {
                resource_type: "echo_thing".to_string(),
                current_state: b"{}".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Client Error");
        assert_eq!(response.diagnostics[0].detail, "Unable to read echo_thing");
    }

    #[tokio::test]
    async fn test_import_unsupported_by_default() {
        let response = service()
            .import_resource_state(tonic::Request::new(proto::ImportResourceStateRequest {
                resource_type: "echo_thing".to_string(),
                id: "x".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.imported.is_empty());
        assert!(response.diagnostics[0].summary.contains("Import not supported"));
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode(&[], "config").unwrap(), Value::Null);
        assert_eq!(decode(b"{\"a\":1}", "config").unwrap(), json!({"a": 1}));

        let err = decode(b"not json", "config").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload_becomes_diagnostic() {
        let response = service()
            .create(tonic::Request::new(proto::CreateRequest {
                resource_type: "echo_thing".to_string(),
                planned_state: b"{not json".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.state.is_empty());
        assert!(response.diagnostics[0]
            .summary
            .starts_with("Invalid request: malformed planned_state"));
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_serve_returns_after_shutdown_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let provider = EchoProvider::default();

        let result = serve_on_listener(
            provider,
            listener,
            addr,
            ServeOptions::new().with_shutdown_timeout(Duration::from_secs(1)),
            async {},
        )
        .await;

        assert!(result.is_ok());
    }
}
