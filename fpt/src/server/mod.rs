//! Local HTTP API built on Axum.
//!
//! Binds to loopback by default. Reads are open; `PATCH /doc` and
//! `DELETE /doc` go through the write gate. Every response carries an
//! `x-request-id` header and is traced inside a span with that id.

/// API error type mapped to HTTP status codes.
pub mod errors;
/// HTTP request handlers and application state.
pub mod handlers;
/// Query-string parameters and their lowering into core requests.
pub mod params;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{Router, middleware};
use fpt_core::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS};
use fpt_core::export::DEFAULT_EXPORT_PAGE_SIZE;
use fpt_core::store::StoreOptions;
use fpt_core::{FptConfig, FptError, Result, WriteCredential};
use handlers::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub use errors::ApiError;

/// Largest accepted JSON request body.
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Everything the server needs, resolved from file, environment and flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// How to reach the store
    pub store: StoreOptions,
    /// Write gate credential
    pub write: WriteCredential,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Rows per store round trip during export
    pub export_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            store: StoreOptions::default(),
            write: WriteCredential::disabled(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            export_page_size: DEFAULT_EXPORT_PAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Lifts a merged config file into a server config.
    pub fn from_config(config: &FptConfig) -> Self {
        Self {
            host: config.server_host.clone(),
            port: config.port,
            store: StoreOptions {
                url: config.store_url.clone(),
                project_id: config.project_id.clone().unwrap_or_default(),
                seed: None,
            },
            write: WriteCredential::new(config.write_enabled, config.write_token.clone()),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            export_page_size: config.export_page_size,
        }
    }

    /// Parses `host:port`.
    ///
    /// # Errors
    /// Fails when the host is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self.host.parse().map_err(|_| {
            FptError::configuration(format!("serverHost must be an IP address, got '{}'", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

async fn request_id_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    async move {
        let mut response = next.run(req).await;
        if let Ok(value) = axum::http::HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(axum::http::HeaderName::from_static("x-request-id"), value);
        }
        response
    }
    .instrument(span)
    .await
}

/// Builds the router with all routes and middleware layers.
///
/// Middleware stack (outermost to innermost): timeout → body limit → CORS →
/// trace → request id.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/collections", get(handlers::list_collections))
        .route("/schema/infer", get(handlers::infer))
        .route("/query", get(handlers::query))
        .route("/docs", get(handlers::list_documents))
        .route(
            "/doc",
            get(handlers::get_document)
                .patch(handlers::patch_document)
                .delete(handlers::delete_document),
        )
        .route("/export", get(handlers::export))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Opens the store and builds the application state.
///
/// # Errors
/// Fails when the store cannot be opened.
pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    let store = fpt_core::open_store(&config.store).await?;
    if let Err(e) = store.test_connection().await {
        // The server still starts; requests report the store as unavailable
        tracing::warn!("Store connectivity check failed: {}", e);
    }
    tracing::info!(backend = %store.backend(), "Store ready");

    Ok(AppState {
        store,
        write: Arc::new(config.write.clone()),
        export_page_size: config.export_page_size,
    })
}

/// Binds the listener for `config`.
///
/// # Errors
/// Fails when the address is invalid or already in use.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let addr = config.socket_addr()?;
    TcpListener::bind(addr).await.map_err(|source| FptError::Io {
        context: format!("Failed to bind {}", addr),
        source,
    })
}

/// Serves `router` on `listener` until `shutdown` resolves.
///
/// # Errors
/// Fails when the server loop hits an I/O error.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("fpt server listening on http://{}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| FptError::Io {
            context: "HTTP server failed".to_string(),
            source,
        })
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}
