//! Upstream forwarding for record mode.
//!
//! # Responsibilities
//! - Rewrite the request target onto the configured upstream
//! - Send method, path, headers and the full body upstream
//! - Collect the whole response into a closed interaction record
//! - Bound the exchange with a deadline
//!
//! # Design Decisions
//! - Every header is forwarded; only `host` is replaced with the upstream's
//! - The recorded request keeps the client's original headers
//! - No retries: a failed exchange is reported, never recorded

use std::str::FromStr;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderValue, Request, Uri};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::TimeoutConfig;
use crate::http::request::IncomingRequest;
use crate::tape::{headers_from_map, Interaction, RecordedRequest, RecordedResponse, Status, TapeBody};
use crate::upstream::UpstreamError;

/// HTTP client able to reach both `http` and `https` upstreams.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Scheme and authority of the host being recorded.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
}

impl Upstream {
    /// Split `scheme://host[:port]` into its parts.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let invalid = |reason: String| UpstreamError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        };
        let host = url.host_str().ok_or_else(|| invalid("missing host".into()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.to_string()))?;
        let host_header =
            HeaderValue::from_str(authority.as_str()).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            scheme,
            authority,
            host_header,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn uri_for(&self, path_and_query: &str) -> Result<Uri, UpstreamError> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(UpstreamError::InvalidRequest)
    }
}

/// Relays requests to the upstream and captures complete exchanges.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: UpstreamClient,
    upstream: Upstream,
    timeout: Duration,
}

impl Forwarder {
    /// Build the client with the `ring` TLS crypto provider.
    pub fn new(upstream: Upstream, timeouts: &TimeoutConfig) -> Result<Self, UpstreamError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| UpstreamError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            upstream,
            timeout: Duration::from_secs(timeouts.upstream_secs),
        })
    }

    /// Forward a request and return the complete interaction.
    pub async fn forward(&self, request: &IncomingRequest) -> Result<Interaction, UpstreamError> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
    }

    async fn exchange(&self, request: &IncomingRequest) -> Result<Interaction, UpstreamError> {
        let uri = self.upstream.uri_for(&request.path)?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                headers.append(name.clone(), value.clone());
            }
            headers.insert(HOST, self.upstream.host_header.clone());
        }
        let outgoing = builder
            .body(Body::from(request.body.clone()))
            .map_err(UpstreamError::InvalidRequest)?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            upstream = %self.upstream.authority,
            "Forwarding request upstream"
        );

        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(UpstreamError::Unreachable)?;

        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(UpstreamError::Body)?.to_bytes();

        Ok(Interaction {
            request: RecordedRequest {
                method: request.method.as_str().to_string(),
                path: request.path.clone(),
                body: TapeBody::from(request.body.clone()),
                headers: headers_from_map(&request.headers),
            },
            response: RecordedResponse {
                status: Status::from(parts.status.as_u16()),
                headers: headers_from_map(&parts.headers),
                body: TapeBody::from(body),
            },
        })
    }
}
