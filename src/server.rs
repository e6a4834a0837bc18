//! The `ProviderService` trait and the plugin server loop.
//!
//! [`serve`] binds a local TCP port, prints the handshake line to stdout so
//! the host can connect, then answers [`crate::protocol`] frames until a
//! shutdown signal arrives.
//!
//! # Signal handling
//!
//! SIGTERM and SIGINT trigger a graceful shutdown: the listener stops
//! accepting, in-flight connections get [`ServeOptions::shutdown_timeout`] to
//! drain, and the provider's `stop()` hook runs last.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_stream::{wrappers::TcpListenerStream, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::protocol::{
    Call, DiagnosticsResponse, GetMetadataResponse, GetSchemaResponse,
    ImportResourceStateResponse, PlanResponse, RequestFrame, ResponseFrame, StateResponse,
    StopResponse, UpgradeResourceStateResponse,
};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Trait implemented by the provider.
///
/// Lifecycle methods operate on `serde_json::Value` states shaped by the
/// resource schemas; errors become error diagnostics on the wire.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// The provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Provider metadata; derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(
        &self,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with endpoints and credentials.
    async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade resource state from an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<serde_json::Value>,
        proposed_state: serde_json::Value,
        config: serde_json::Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Read the current state of a resource. Null means the resource is gone.
    async fn read(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: serde_json::Value,
        planned_state: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: serde_json::Value,
    ) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: serde_json::Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::UnknownResource(
            data_source_type.to_string(),
        ))
    }
}

fn error_diagnostics(err: ProviderError) -> Vec<Diagnostic> {
    vec![err.into_diagnostic()]
}

fn to_result<T: serde::Serialize>(response: &T) -> serde_json::Value {
    serde_json::to_value(response).unwrap_or(serde_json::Value::Null)
}

/// Dispatch a single RPC to the provider and produce the response payload.
///
/// Lifecycle failures are reported in-band as diagnostics; this function
/// never fails.
#[instrument(skip_all, fields(method = call.method()))]
pub async fn dispatch<P: ProviderService>(provider: &P, call: Call) -> serde_json::Value {
    match call {
        Call::GetMetadata => {
            let metadata = provider.metadata();
            debug!(
                resources = metadata.resources.len(),
                data_sources = metadata.data_sources.len(),
                "GetMetadata completed"
            );
            to_result(&GetMetadataResponse {
                resources: metadata.resources,
                data_sources: metadata.data_sources,
                server_capabilities: metadata.capabilities,
                diagnostics: vec![],
            })
        }
        Call::GetSchema => {
            let schema = provider.schema();
            debug!(
                resources = schema.resources.len(),
                data_sources = schema.data_sources.len(),
                "GetSchema completed"
            );
            to_result(&GetSchemaResponse::from(schema))
        }
        Call::ValidateProviderConfig { config } => {
            let response = match provider.validate_provider_config(config).await {
                Ok(diagnostics) => DiagnosticsResponse { diagnostics },
                Err(e) => {
                    error!(error = %e, "ValidateProviderConfig failed");
                    DiagnosticsResponse {
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Configure { config } => {
            let response = match provider.configure(config).await {
                Ok(diagnostics) => {
                    if has_errors(&diagnostics) {
                        warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
                    } else {
                        info!("Configure completed");
                    }
                    DiagnosticsResponse { diagnostics }
                }
                Err(e) => {
                    error!(error = %e, "Configure failed");
                    DiagnosticsResponse {
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Stop => {
            info!("Stop called");
            let response = match provider.stop().await {
                Ok(()) => StopResponse::default(),
                Err(e) => {
                    error!(error = %e, "Stop failed");
                    StopResponse {
                        error: e.to_string(),
                    }
                }
            };
            to_result(&response)
        }
        Call::ValidateResourceConfig {
            resource_type,
            config,
        } => {
            let response = match provider
                .validate_resource_config(&resource_type, config)
                .await
            {
                Ok(diagnostics) => DiagnosticsResponse { diagnostics },
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "ValidateResourceConfig failed");
                    DiagnosticsResponse {
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::UpgradeResourceState {
            resource_type,
            version,
            state,
        } => {
            let response = match provider
                .upgrade_resource_state(&resource_type, version, state)
                .await
            {
                Ok(upgraded_state) => UpgradeResourceStateResponse {
                    upgraded_state,
                    diagnostics: vec![],
                },
                Err(e) => {
                    error!(resource_type = %resource_type, version, error = %e, "UpgradeResourceState failed");
                    UpgradeResourceStateResponse {
                        upgraded_state: serde_json::Value::Null,
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Plan {
            resource_type,
            prior_state,
            proposed_state,
            config,
        } => {
            let response = match provider
                .plan(&resource_type, prior_state, proposed_state, config)
                .await
            {
                Ok(result) => {
                    info!(
                        resource_type = %resource_type,
                        changes = result.changes.len(),
                        requires_replace = result.requires_replace,
                        "Plan completed"
                    );
                    PlanResponse {
                        planned_state: result.planned_state,
                        changes: result.changes,
                        requires_replace: result.requires_replace,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Plan failed");
                    PlanResponse {
                        diagnostics: error_diagnostics(e),
                        ..Default::default()
                    }
                }
            };
            to_result(&response)
        }
        Call::Create {
            resource_type,
            planned_state,
        } => {
            let response = match provider.create(&resource_type, planned_state).await {
                Ok(state) => {
                    info!(resource_type = %resource_type, "Create completed");
                    StateResponse {
                        state,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Create failed");
                    StateResponse {
                        state: serde_json::Value::Null,
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Read {
            resource_type,
            current_state,
        } => {
            let response = match provider.read(&resource_type, current_state).await {
                Ok(state) => {
                    debug!(resource_type = %resource_type, "Read completed");
                    StateResponse {
                        state,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Read failed");
                    StateResponse {
                        state: serde_json::Value::Null,
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Update {
            resource_type,
            prior_state,
            planned_state,
        } => {
            let response = match provider
                .update(&resource_type, prior_state, planned_state)
                .await
            {
                Ok(state) => {
                    info!(resource_type = %resource_type, "Update completed");
                    StateResponse {
                        state,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Update failed");
                    StateResponse {
                        state: serde_json::Value::Null,
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::Delete {
            resource_type,
            current_state,
        } => {
            let response = match provider.delete(&resource_type, current_state).await {
                Ok(()) => {
                    info!(resource_type = %resource_type, "Delete completed");
                    DiagnosticsResponse::default()
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Delete failed");
                    DiagnosticsResponse {
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::ImportResourceState { resource_type, id } => {
            let response = match provider.import_resource(&resource_type, &id).await {
                Ok(imported) => {
                    info!(resource_type = %resource_type, id = %id, imported = imported.len(), "Import completed");
                    ImportResourceStateResponse {
                        imported,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, id = %id, error = %e, "Import failed");
                    ImportResourceStateResponse {
                        imported: vec![],
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::ValidateDataSourceConfig {
            data_source_type,
            config,
        } => {
            let response = match provider
                .validate_data_source_config(&data_source_type, config)
                .await
            {
                Ok(diagnostics) => DiagnosticsResponse { diagnostics },
                Err(e) => {
                    error!(data_source_type = %data_source_type, error = %e, "ValidateDataSourceConfig failed");
                    DiagnosticsResponse {
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
        Call::ReadDataSource {
            data_source_type,
            config,
        } => {
            let response = match provider.read_data_source(&data_source_type, config).await {
                Ok(state) => {
                    info!(data_source_type = %data_source_type, "ReadDataSource completed");
                    StateResponse {
                        state,
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    error!(data_source_type = %data_source_type, error = %e, "ReadDataSource failed");
                    StateResponse {
                        state: serde_json::Value::Null,
                        diagnostics: error_diagnostics(e),
                    }
                }
            };
            to_result(&response)
        }
    }
}

async fn handle_connection<P: ProviderService>(provider: Arc<P>, socket: TcpStream) {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!(peer = %peer, "Host connected");

    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Connection read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: RequestFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                // Without a parseable frame there is no id to answer on.
                warn!(peer = %peer, error = %e, "Dropping malformed frame");
                continue;
            }
        };

        let result = dispatch(provider.as_ref(), frame.call).await;
        let response = ResponseFrame {
            id: frame.id,
            result,
        };

        let mut out = match serde_json::to_vec(&response) {
            Ok(out) => out,
            Err(e) => {
                error!(peer = %peer, error = %e, "Failed to encode response");
                continue;
            }
        };
        out.push(b'\n');
        if let Err(e) = write_half.write_all(&out).await {
            warn!(peer = %peer, error = %e, "Connection write failed");
            break;
        }
    }

    debug!(peer = %peer, "Host disconnected");
}

/// Options for the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight connections get to drain after a shutdown signal.
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
    /// Create serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                eprintln!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                eprintln!("Received SIGINT, initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
        eprintln!("Received CTRL+C, initiating graceful shutdown...");
    }
}

/// Serve a provider on an OS-assigned local port.
///
/// Binds `127.0.0.1:0`, prints the `HEMMER_PROVIDER|<version>|<address>`
/// handshake on stdout, and runs until a shutdown signal.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    serve_on_listener(provider, listener, addr, options).await
}

/// Serve a provider on a specific address instead of an OS-assigned port.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    serve_on_listener(provider, listener, actual_addr, ServeOptions::default()).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    // The handshake is the only thing ever written to stdout.
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);

    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let mut incoming = TcpListenerStream::new(listener);
    let mut connections = JoinSet::new();

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            maybe_conn = incoming.next() => match maybe_conn {
                Some(Ok(socket)) => {
                    connections.spawn(handle_connection(Arc::clone(&provider), socket));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                }
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }

    // Give in-flight connections a bounded grace period.
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(options.shutdown_timeout, drain)
        .await
        .is_err()
    {
        warn!(
            timeout = ?options.shutdown_timeout,
            "Shutdown timeout exceeded, aborting remaining connections"
        );
        connections.abort_all();
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}
