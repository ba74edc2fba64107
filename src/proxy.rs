//! Relay server implementation
//! Accepts inbound HTTP requests, decodes the target and hands it to the relay

use crate::codec::{decode_target, query_param};
use crate::config::{RelayConfig, TARGET_PARAM};
use crate::error::RelayError;
use crate::relay::{Relay, RelayResponse};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{
    HeaderValue, ACCEPT, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE, ORIGIN, VARY,
};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Body returned when no target is given
pub const READY_MESSAGE: &str = "Proxy ready — provide ?u=<base64(url)>";

const ALLOWED_METHODS: &str = "GET,OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

type RelayBody = BoxBody<Bytes, hyper::Error>;

/// Relay server
pub struct ProxyServer {
    config: Arc<RelayConfig>,
    relay: Relay,
}

impl ProxyServer {
    /// Create a new relay server
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let config = Arc::new(config);
        let relay = Relay::new(config.clone())?;

        Ok(Self { config, relay })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start the relay server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.http_port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}{}", addr, self.config.base_path);

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    let span = info_span!(
                        "request",
                        id = %Uuid::new_v4(),
                        method = %req.method(),
                        path = %req.uri().path(),
                        remote = %remote_addr,
                    );
                    async move { Ok::<_, Infallible>(server.handle(req).await) }.instrument(span)
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle one inbound request. Always produces a response.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<RelayBody> {
        // Only GET and OPTIONS are relayed, the inbound body is never read
        let (parts, _) = req.into_parts();

        let origin = parts
            .headers
            .get(ORIGIN)
            .and_then(|o| o.to_str().ok())
            .map(str::to_string);

        let mut response = match self.process_request(&parts).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_client_error() {
                    warn!("Rejected request: {}", e);
                } else {
                    error!("Relay error: {}", e);
                }
                Self::text_response(e.status(), &e.to_string())
            }
        };

        self.apply_cors(&mut response, origin.as_deref());
        response
    }

    /// Process request
    async fn process_request(&self, req: &Parts) -> Result<Response<RelayBody>, RelayError> {
        let path = req.uri.path();

        // CORS preflight is acknowledged on any path
        if req.method == Method::OPTIONS {
            return Ok(Self::empty_response(StatusCode::OK));
        }

        if path == "/health" {
            return Ok(Self::text_response(StatusCode::OK, "OK"));
        }

        if path != self.config.base_path {
            return Ok(Self::text_response(StatusCode::NOT_FOUND, "Not Found"));
        }

        if req.method != Method::GET {
            let mut response = Self::text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
            return Ok(response);
        }

        let Some(token) = query_param(req.uri.query(), TARGET_PARAM) else {
            return Ok(Self::text_response(StatusCode::OK, READY_MESSAGE));
        };

        let target = decode_target(&token)?;
        info!("Relaying {}", target);

        let relayed = self.relay.fetch(&target, req.headers.get(ACCEPT)).await?;

        Ok(Self::relayed_response(relayed))
    }

    /// Add CORS headers to every response
    fn apply_cors(&self, response: &mut Response<RelayBody>, origin: Option<&str>) {
        let headers = response.headers_mut();

        if let Some(allow_origin) = self.config.cors_origin(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        }
        if self.config.varies_by_origin() {
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    }

    fn relayed_response(relayed: RelayResponse) -> Response<RelayBody> {
        let mut response = Response::new(Self::full_body(relayed.body));
        *response.status_mut() = relayed.status;
        response.headers_mut().extend(relayed.headers);
        response
    }

    /// Create text response
    fn text_response(status: StatusCode, body: &str) -> Response<RelayBody> {
        let mut response = Response::new(Self::full_body(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
        response
    }

    /// Create empty response
    fn empty_response(status: StatusCode) -> Response<RelayBody> {
        let mut response = Response::new(Self::empty_body());
        *response.status_mut() = status;
        response
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> RelayBody {
        Full::new(bytes).map_err(|never| match never {}).boxed()
    }

    /// Create empty body
    fn empty_body() -> RelayBody {
        Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_target;

    fn server() -> ProxyServer {
        ProxyServer::new(RelayConfig::default()).unwrap()
    }

    fn get(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    async fn body_text(response: Response<RelayBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ready_without_target() {
        let response = server().handle(get("/api/proxy")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, READY_MESSAGE);
    }

    #[tokio::test]
    async fn test_empty_target_is_ready() {
        let response = server().handle(get("/api/proxy?u=")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, READY_MESSAGE);
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/proxy")
            .body(())
            .unwrap();
        let response = server().handle(req).await;

        assert_eq!(response.status(), StatusCode::OK);
        for name in [
            ACCESS_CONTROL_ALLOW_ORIGIN,
            ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_HEADERS,
        ] {
            assert!(response.headers().contains_key(&name), "missing {}", name);
        }
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_targets_are_400() {
        for target in ["not-a-url", "ftp://example.com"] {
            let uri = format!("/api/proxy?u={}", encode_target(target));
            let response = server().handle(get(&uri)).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "for {}", target);
            assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert!(body_text(response).await.starts_with("Invalid target"));
        }
    }

    #[tokio::test]
    async fn test_undecodable_target_is_400() {
        let response = server().handle(get("/api/proxy?u=%25%25%25")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_other_methods_rejected() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/proxy")
            .body(())
            .unwrap();
        let response = server().handle(req).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], ALLOWED_METHODS);
    }

    #[tokio::test]
    async fn test_health_and_unknown_paths() {
        let response = server().handle(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");

        let response = server().handle(get("/elsewhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_allow_list_cors() {
        let server = ProxyServer::new(RelayConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..Default::default()
        })
        .unwrap();

        let req = Request::builder()
            .uri("/api/proxy")
            .header(ORIGIN, "https://app.example")
            .body(())
            .unwrap();
        let response = server.handle(req).await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(response.headers()[VARY], "Origin");

        let req = Request::builder()
            .uri("/api/proxy")
            .header(ORIGIN, "https://other.example")
            .body(())
            .unwrap();
        let response = server.handle(req).await;
        assert!(!response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
    }
}
