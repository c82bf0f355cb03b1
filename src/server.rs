//! Server helpers for running the provider.
//!
//! This module provides the [`ProviderService`] trait and the [`serve`]
//! family of functions. The server speaks newline-delimited JSON over TCP:
//! every line the host writes is one [`Request`], and every line the
//! provider answers with is one [`Response`].
//!
//! # Signal Handling
//!
//! The server handles OS signals (SIGTERM, SIGINT) for graceful shutdown.
//! When a signal is received, the server:
//! 1. Stops accepting new connections
//! 2. Waits for open connections to finish (bounded by the shutdown timeout)
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::types::{PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};

/// Trait that provider implementations must implement.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
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
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

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
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError>;
}

/// One request line sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Return [`ProviderMetadata`].
    GetMetadata,
    /// Return the [`ProviderSchema`].
    GetSchema,
    /// Validate provider configuration.
    ValidateProviderConfig {
        /// Raw configuration.
        #[serde(default)]
        config: Value,
    },
    /// Configure the provider.
    Configure {
        /// Raw configuration.
        #[serde(default)]
        config: Value,
    },
    /// Stop the provider.
    Stop,
    /// Validate resource configuration.
    ValidateResourceConfig {
        /// Resource type name.
        resource_type: String,
        /// Raw configuration.
        #[serde(default)]
        config: Value,
    },
    /// Plan a change.
    Plan {
        /// Resource type name.
        resource_type: String,
        /// Stored state; absent when creating.
        #[serde(default)]
        prior_state: Option<Value>,
        /// Proposed state; null when destroying.
        #[serde(default)]
        proposed_state: Value,
        /// Raw configuration.
        #[serde(default)]
        config: Value,
    },
    /// Create a resource.
    Create {
        /// Resource type name.
        resource_type: String,
        /// State produced by plan.
        planned_state: Value,
    },
    /// Refresh a resource.
    Read {
        /// Resource type name.
        resource_type: String,
        /// Stored state.
        current_state: Value,
    },
    /// Update a resource in place.
    Update {
        /// Resource type name.
        resource_type: String,
        /// Stored state.
        prior_state: Value,
        /// State produced by plan.
        planned_state: Value,
    },
    /// Delete a resource.
    Delete {
        /// Resource type name.
        resource_type: String,
        /// Stored state.
        current_state: Value,
    },
}

impl Request {
    /// The wire name of this request.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetMetadata => "get_metadata",
            Self::GetSchema => "get_schema",
            Self::ValidateProviderConfig { .. } => "validate_provider_config",
            Self::Configure { .. } => "configure",
            Self::Stop => "stop",
            Self::ValidateResourceConfig { .. } => "validate_resource_config",
            Self::Plan { .. } => "plan",
            Self::Create { .. } => "create",
            Self::Read { .. } => "read",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// One response line written by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Response {
    /// The operation's result, absent on failure or for operations without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Errors and warnings raised by the operation.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Response {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(result) => Self {
                result: Some(result),
                diagnostics: vec![],
            },
            Err(e) => Self::from_error(e.into()),
        }
    }

    fn diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            result: None,
            diagnostics,
        }
    }

    fn from_error(err: ProviderError) -> Self {
        Self::diagnostics(vec![err.into()])
    }

    /// Whether the response carries an error diagnostic.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Dispatch one request to the provider.
///
/// Provider errors never escape: they are returned as an error diagnostic.
#[instrument(skip(provider, request), fields(method = request.method()))]
pub async fn handle_request<P: ProviderService>(provider: &P, request: Request) -> Response {
    match request {
        Request::GetMetadata => {
            let metadata = provider.metadata();
            info!(resources = metadata.resources.len(), "GetMetadata completed");
            Response::ok(&metadata)
        }
        Request::GetSchema => {
            let schema = provider.schema();
            info!(resources = schema.resources.len(), "GetSchema completed");
            Response::ok(&schema)
        }
        Request::ValidateProviderConfig { config } => diagnostics_response(
            "ValidateProviderConfig",
            provider.validate_provider_config(config).await,
        ),
        Request::Configure { config } => {
            diagnostics_response("Configure", provider.configure(config).await)
        }
        Request::Stop => match provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                Response::default()
            }
            Err(e) => {
                error!(error = %e, "Stop failed");
                Response::from_error(e)
            }
        },
        Request::ValidateResourceConfig {
            resource_type,
            config,
        } => {
            debug!(resource_type = %resource_type, "ValidateResourceConfig called");
            diagnostics_response(
                "ValidateResourceConfig",
                provider.validate_resource_config(&resource_type, config).await,
            )
        }
        Request::Plan {
            resource_type,
            prior_state,
            proposed_state,
            config,
        } => {
            debug!(
                resource_type = %resource_type,
                is_create = prior_state.is_none(),
                "Plan called"
            );
            match provider
                .plan(&resource_type, prior_state, proposed_state, config)
                .await
            {
                Ok(mut result) => {
                    info!(
                        resource_type = %resource_type,
                        changes = result.changes.len(),
                        requires_replace = result.requires_replace,
                        "Plan completed"
                    );
                    let diagnostics = std::mem::take(&mut result.diagnostics);
                    let mut response = Response::ok(&result);
                    response.diagnostics.extend(diagnostics);
                    response
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Plan failed");
                    Response::from_error(e)
                }
            }
        }
        Request::Create {
            resource_type,
            planned_state,
        } => {
            info!(resource_type = %resource_type, "Create called");
            let result = provider.create(&resource_type, planned_state).await;
            state_response("Create", &resource_type, result)
        }
        Request::Read {
            resource_type,
            current_state,
        } => {
            debug!(resource_type = %resource_type, "Read called");
            let result = provider.read(&resource_type, current_state).await;
            state_response("Read", &resource_type, result)
        }
        Request::Update {
            resource_type,
            prior_state,
            planned_state,
        } => {
            info!(resource_type = %resource_type, "Update called");
            state_response(
                "Update",
                &resource_type,
                provider.update(&resource_type, prior_state, planned_state).await,
            )
        }
        Request::Delete {
            resource_type,
            current_state,
        } => {
            info!(resource_type = %resource_type, "Delete called");
            match provider.delete(&resource_type, current_state).await {
                Ok(()) => {
                    info!(resource_type = %resource_type, "Delete completed successfully");
                    Response::default()
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Delete failed");
                    Response::from_error(e)
                }
            }
        }
    }
}

fn diagnostics_response(
    operation: &str,
    result: Result<Vec<Diagnostic>, ProviderError>,
) -> Response {
    match result {
        Ok(diagnostics) => {
            if has_errors(&diagnostics) {
                warn!(diagnostics = diagnostics.len(), "{} completed with errors", operation);
            } else {
                info!("{} completed successfully", operation);
            }
            Response::diagnostics(diagnostics)
        }
        Err(e) => {
            error!(error = %e, "{} failed", operation);
            Response::from_error(e)
        }
    }
}

fn state_response(
    operation: &str,
    resource_type: &str,
    result: Result<Value, ProviderError>,
) -> Response {
    match result {
        Ok(state) => {
            debug!(resource_type = %resource_type, "{} completed successfully", operation);
            Response::ok(&state)
        }
        Err(e) => {
            error!(resource_type = %resource_type, error = %e, "{} failed", operation);
            Response::from_error(e)
        }
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long to wait for open connections after a shutdown signal.
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

/// Wait for a shutdown signal (SIGTERM or SIGINT; CTRL+C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("Received CTRL+C, initiating graceful shutdown");
    }
}

/// Serve a provider on an available local port.
///
/// Prints the handshake `MINECRAFT_PROVIDER|<version>|<address>` to stdout,
/// then serves until SIGTERM/SIGINT.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
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
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);

    run(Arc::new(provider), listener, options, wait_for_shutdown_signal()).await?;
    Ok(())
}

/// Accept connections until `shutdown` resolves, then stop the provider.
async fn run<P, F>(
    provider: Arc<P>,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> std::io::Result<()>
where
    P: ProviderService,
    F: Future<Output = ()>,
{
    info!(address = %listener.local_addr()?, "Provider server starting");

    let mut incoming = TcpListenerStream::new(listener);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            conn = incoming.next() => match conn {
                Some(Ok(stream)) => {
                    let provider = Arc::clone(&provider);
                    connections.spawn(async move {
                        let peer = stream.peer_addr().ok();
                        debug!(peer = ?peer, "Connection opened");
                        if let Err(e) = handle_connection(provider, stream).await {
                            warn!(peer = ?peer, error = %e, "Connection closed with error");
                        } else {
                            debug!(peer = ?peer, "Connection closed");
                        }
                    });
                }
                Some(Err(e)) => warn!(error = %e, "Failed to accept connection"),
                None => break,
            },
        }
    }

    let drained = tokio::time::timeout(options.shutdown_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            timeout = ?options.shutdown_timeout,
            "Shutdown timeout exceeded, closing open connections"
        );
        connections.shutdown().await;
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

async fn handle_connection<P: ProviderService>(
    provider: Arc<P>,
    stream: TcpStream,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(provider.as_ref(), request).await,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                Response::diagnostics(vec![
                    Diagnostic::error("Malformed request").with_detail(e.to_string())
                ])
            }
        };

        let mut encoded = serde_json::to_vec(&response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, DiagnosticSeverity, Schema};
    use crate::types::AttributeChange;
    use serde_json::json;
    use tokio::sync::oneshot;

    struct EchoProvider;

    #[async_trait::async_trait]
    impl ProviderService for EchoProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new().with_resource(
                "echo",
                Schema::v0().with_attribute("name", Attribute::required_string()),
            )
        }

        async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            if config.get("fail").is_some() {
                return Err(ProviderError::Configuration("told to fail".to_string()));
            }
            Ok(vec![Diagnostic::warning("configured")])
        }

        async fn plan(
            &self,
            _resource_type: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            Ok(PlanResult::with_changes(
                proposed_state.clone(),
                vec![AttributeChange::new("name", prior_state, Some(proposed_state))],
                true,
            )
            .with_diagnostic(Diagnostic::warning("replacing")))
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
            Err(ProviderError::NotFound(resource_type.to_string()))
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

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_value(json!({
            "method": "plan",
            "resource_type": "minecraft_schema",
            "prior_state": null,
            "proposed_state": {"x": 1}
        }))
        .unwrap();

        assert_eq!(request.method(), "plan");
        match request {
            Request::Plan {
                prior_state,
                config,
                ..
            } => {
                assert!(prior_state.is_none());
                assert!(config.is_null());
            }
            other => panic!("unexpected request {other:?}"),
        }

        let stop: Request = serde_json::from_str(r#"{"method":"stop"}"#).unwrap();
        assert_eq!(stop, Request::Stop);
    }

    #[tokio::test]
    async fn test_handle_metadata() {
        let response = handle_request(&EchoProvider, Request::GetMetadata).await;
        assert_eq!(response.result.unwrap()["resources"], json!(["echo"]));
    }

    #[tokio::test]
    async fn test_handle_configure_error_becomes_diagnostic() {
        let request = Request::Configure {
            config: json!({"fail": true}),
        };
        let response = handle_request(&EchoProvider, request).await;
        assert!(response.has_errors());
        assert!(response.result.is_none());
        assert_eq!(response.diagnostics[0].summary, "Configuration error: told to fail");

        let request = Request::Configure { config: json!({}) };
        let response = handle_request(&EchoProvider, request).await;
        assert!(!response.has_errors());
        assert_eq!(response.diagnostics[0].severity, DiagnosticSeverity::Warning);
    }

    #[tokio::test]
    async fn test_handle_plan_lifts_diagnostics() {
        let response = handle_request(
            &EchoProvider,
            Request::Plan {
                resource_type: "echo".to_string(),
                prior_state: None,
                proposed_state: json!({"name": "a"}),
                config: json!({"name": "a"}),
            },
        )
        .await;

        assert_eq!(response.diagnostics.len(), 1);
        let plan: PlanResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert!(plan.requires_replace);
        assert!(plan.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_handle_read_error() {
        let response = handle_request(
            &EchoProvider,
            Request::Read {
                resource_type: "echo".to_string(),
                current_state: json!({}),
            },
        )
        .await;
        assert!(response.has_errors());
    }

    #[tokio::test]
    async fn test_run_serves_json_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(run(
            Arc::new(EchoProvider),
            listener,
            ServeOptions::new().with_shutdown_timeout(Duration::from_millis(200)),
            async move {
                let _ = shutdown_rx.await;
            },
        ));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"{\"method\":\"get_schema\"}\nnot json\n")
            .await
            .unwrap();

        let line = lines.next_line().await.unwrap().unwrap();
        let schema: Response = serde_json::from_str(&line).unwrap();
        assert!(schema.result.unwrap()["resources"]["echo"].is_object());

        let malformed: Response =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(malformed.has_errors());
        assert_eq!(malformed.diagnostics[0].summary, "Malformed request");

        drop(writer);
        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
