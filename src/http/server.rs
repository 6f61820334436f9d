//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Serve HTTP/1.1 and HTTP/2 connections from the bounded listener
//! - Drop requests that have no origin-form target, without answering
//! - Buffer every request body (bounded) before anything else looks at it
//! - Route the control namespace to the control channel
//! - Hand every other request to the record/replay core
//! - Write the resulting response verbatim

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, Response},
    response::IntoResponse,
    Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::loader::join_errors;
use crate::config::{validate_config, ProxyConfig, ValidationError};
use crate::control::setup_control_router;
use crate::http::request::{origin_form_path, IncomingRequest, RequestId, RequestIdExt};
use crate::http::response::write_recorded;
use crate::net::{Listener, ListenerError};
use crate::proxy::{ProxyCore, ProxyError, SetupError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ProxyCore>,
}

/// Error type for server startup and the accept loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("Failed to load default tape: {0}")]
    Initialize(#[source] ProxyError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// HTTP server for the record/replay proxy.
pub struct HttpServer {
    core: Arc<ProxyCore>,
    service: ProxyService,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ServerError::Config)?;

        let core = Arc::new(ProxyCore::new(&config)?);
        let state = AppState { core: core.clone() };
        let router = Self::build_router(&config, state);

        Ok(Self {
            core,
            service: ProxyService {
                router,
                max_body_size: config.limits.max_body_size,
            },
        })
    }

    /// Build the Axum router: control namespace first, everything else proxied.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let prefix = config.control.prefix.trim_end_matches('/');

        Router::new()
            .nest(prefix, setup_control_router())
            .fallback(proxy_handler)
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .request_id()
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                tracing::info_span!(
                    "request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .with_state(state)
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        self.core.initialize().await.map_err(ServerError::Initialize)?;

        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            mode = %self.core.mode(),
            tape = %self.core.default_tape(),
            tape_root = ?self.core.store().root(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(connection) => connection,
                        Err(ListenerError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let service = self.service.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let connection_service = hyper::service::service_fn(move |request| {
                            let service = service.clone();
                            async move { service.call(request).await }
                        });

                        let builder = auto::Builder::new(TokioExecutor::new());
                        if let Err(e) = builder
                            .serve_connection(TokioIo::new(stream), connection_service)
                            .await
                        {
                            tracing::debug!(peer_addr = %peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Per-connection entry point: validate, buffer, then route.
#[derive(Clone)]
struct ProxyService {
    router: Router,
    max_body_size: usize,
}

impl ProxyService {
    /// An `Err` makes hyper close the connection without a response.
    async fn call(&self, request: Request<Incoming>) -> Result<Response<Body>, ProxyError> {
        let request_id = RequestId::new();

        if origin_form_path(request.uri()).is_none() {
            tracing::warn!(
                request_id = %request_id,
                method = %request.method(),
                target = %request.uri(),
                "Dropping request without a path"
            );
            return Err(ProxyError::MalformedTransportRequest(request.uri().to_string()));
        }

        let (mut parts, body) = request.into_parts();
        let body = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!(
                    request_id = %request_id,
                    limit = self.max_body_size,
                    "Request body too large"
                );
                return Ok(ProxyError::BodyTooLarge(self.max_body_size).into_response());
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
                return Err(ProxyError::Body(e));
            }
        };

        parts.extensions.insert(request_id);
        let request = Request::from_parts(parts, Body::from(body));

        match self.router.clone().oneshot(request).await {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}

/// Fallback handler: every non-control request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();
    // Already fully buffered by `ProxyService`; this only unwraps it.
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => return ProxyError::Body(Box::new(e)).into_response(),
    };
    let request = IncomingRequest::from_parts(&parts, body);

    match state.core.handle(&request).await {
        Ok(recorded) => write_recorded(&recorded),
        Err(e) => {
            match &e {
                // Already logged as a warning with the active tape.
                ProxyError::NoMatchingRecord { .. } => {}
                other => tracing::error!(
                    request_id = %parts.request_id().map(|id| id.to_string()).unwrap_or_default(),
                    method = %request.method,
                    path = %request.path,
                    error = %other,
                    "Request failed"
                ),
            }
            e.into_response()
        }
    }
}
