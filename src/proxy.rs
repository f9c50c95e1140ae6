//! Hyper-based reverse proxy server
//!
//! Every request is replayed against the Teslamate API. Car endpoint
//! responses get the selected profile overlaid; everything else is passed
//! through untouched.

use crate::config::ProxySettings;
use crate::envelope::Envelope;
use crate::error::{ProxyError, ProxyResult};
use crate::gate::is_eligible;
use crate::injection::InjectionEngine;
use crate::upstream::{UpstreamClient, UpstreamResponse};

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Methods the proxy accepts; anything else gets a 405
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// Upstream response headers dropped on pass-through; hyper recomputes framing
pub const EXCLUDED_RESPONSE_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

const APPLICATION_JSON: &str = "application/json";

/// Result of trying to read an upstream body as JSON
#[derive(Debug)]
pub enum DecodedBody {
    Decoded(Value),
    NotJson,
}

impl DecodedBody {
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => DecodedBody::Decoded(value),
            Err(e) => {
                debug!("Upstream body is not JSON: {}", e);
                DecodedBody::NotJson
            }
        }
    }
}

/// What the proxy did with an upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Body rewritten; carries the envelope shape that was detected
    Injected(Envelope),
    /// Eligible JSON body with no car record in it; decoded and re-encoded
    /// without changes
    Reencoded,
    PassThrough,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Injected(envelope) => write!(f, "injected:{}", envelope.name()),
            Outcome::Reencoded => write!(f, "re-encoded"),
            Outcome::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// Proxy server state; read-only once constructed
pub struct ProxyServer {
    settings: ProxySettings,
    upstream: UpstreamClient,
    injector: InjectionEngine,
    /// Request counter, only used to tag log lines
    req_counter: AtomicU64,
}

impl ProxyServer {
    pub fn new(settings: ProxySettings) -> ProxyResult<Self> {
        let upstream =
            UpstreamClient::new(settings.upstream_url.clone(), settings.upstream_timeout)?;
        let injector = InjectionEngine::new(settings.profile.clone());

        Ok(Self {
            settings,
            upstream,
            injector,
            req_counter: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn injector(&self) -> &InjectionEngine {
        &self.injector
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> ProxyResult<TcpListener> {
        let addr = self.settings.listen_addr();
        TcpListener::bind(&addr).await.map_err(|e| ProxyError::BindFailed {
            addr,
            reason: e.to_string(),
        })
    }

    /// Bind and serve until the task is dropped
    pub async fn start(self: Arc<Self>) -> ProxyResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> ProxyResult<()> {
        info!("🚗 Car profile proxy listening on http://{}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer_addr).await {
                            if e.is_recoverable() {
                                debug!("Connection closed: {}", e);
                            } else {
                                error!("Connection error: {}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Serve HTTP/1.1 on a single connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> ProxyResult<()> {
        debug!("New connection from {}", peer_addr);

        let io = TokioIo::new(stream);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&self);
            async move { server.handle_request(req).await }
        });

        http1::Builder::new()
            .serve_connection(io, service)
            .await
            .map_err(|e| ProxyError::Http(e.to_string()))
    }

    /// Handle one inbound request; never fails, errors become responses
    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return Ok(text_response(StatusCode::BAD_REQUEST, "Failed to read request body"));
            }
        };

        Ok(self
            .handle(parts.method, parts.uri.path(), parts.uri.query(), &parts.headers, body)
            .await)
    }

    /// Forward to upstream and shape the response
    pub async fn handle(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        let request_id = self.req_counter.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        if !ALLOWED_METHODS.contains(&method) {
            debug!("[{}] {} {} not allowed", request_id, method, path);
            return method_not_allowed();
        }

        debug!("[{}] {} {}", request_id, method, path);

        let forwarded = self
            .upstream
            .forward(method.clone(), path, query, headers, body)
            .await;

        let upstream = match forwarded {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(
                    "[{}] {} {} upstream error ({}ms): {}",
                    request_id,
                    method,
                    path,
                    start.elapsed().as_millis(),
                    e
                );
                return error_response(&e);
            }
        };

        let (response, outcome) = build_response(path, upstream, &self.injector);

        info!(
            "[{}] {} {} ← {} {} ({}ms)",
            request_id,
            method,
            path,
            response.status().as_u16(),
            outcome,
            start.elapsed().as_millis()
        );

        response
    }
}

/// Turn an upstream response into the client response: inject when the gate
/// allows it and the body decodes, pass through otherwise.
pub fn build_response(
    path: &str,
    upstream: UpstreamResponse,
    injector: &InjectionEngine,
) -> (Response<Full<Bytes>>, Outcome) {
    if is_eligible(path, upstream.content_type(), injector.has_overrides()) {
        if let DecodedBody::Decoded(document) = DecodedBody::decode(&upstream.body) {
            let (document, envelope) = injector.apply(document);
            let outcome = match envelope {
                Envelope::Unrecognized => Outcome::Reencoded,
                envelope => Outcome::Injected(envelope),
            };
            match serde_json::to_vec(&document) {
                Ok(encoded) => return (json_response(upstream.status, encoded), outcome),
                Err(e) => warn!("Failed to re-encode injected body: {}", e),
            }
        }
    }

    (pass_through(upstream), Outcome::PassThrough)
}

/// Original status and bytes, minus framing headers
fn pass_through(upstream: UpstreamResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;

    let headers = response.headers_mut();
    for (name, value) in upstream.headers.iter() {
        if !EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    response
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

/// 502 with `{"error": "Upstream request failed: ..."}`
pub fn error_response(error: &ProxyError) -> Response<Full<Bytes>> {
    let body = json!({ "error": error.to_string() }).to_string();
    json_response(StatusCode::BAD_GATEWAY, body.into_bytes())
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH"));
    response
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
