//! Upstream fetch and response dispatch
//!
//! One GET per relayed request. HTML responses go through the rewrite pass;
//! everything else is buffered and handed back byte for byte.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::rewrite::rewrite_html;
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::StatusCode;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Content type forced on rewritten documents
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Response produced by the relay, ready to be sent to the caller
#[derive(Debug)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Whether a content type selects the HTML rewrite branch
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

/// Upstream fetcher
pub struct Relay {
    client: Client,
    config: Arc<RelayConfig>,
}

impl Relay {
    /// Create a relay with a client configured from `config`
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(Policy::limited(config.max_redirects))
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Fetch `target` and produce the relayed response
    pub async fn fetch(
        &self,
        target: &Url,
        accept: Option<&HeaderValue>,
    ) -> Result<RelayResponse, RelayError> {
        let accept = accept
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*/*"));

        debug!("Fetching upstream: {}", target);

        let upstream = self
            .client
            .get(target.clone())
            .header(ACCEPT, accept)
            .send()
            .await?;

        let status = upstream.status();
        let final_url = upstream.url().clone();
        if &final_url != target {
            debug!("Followed redirects to: {}", final_url);
        }

        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let cache_control = upstream.headers().get(CACHE_CONTROL).cloned();

        let mut headers = HeaderMap::new();
        if let Some(cache) = cache_control {
            headers.insert(CACHE_CONTROL, cache);
        }

        let html = content_type
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_html);

        if html {
            let text = upstream.text().await?;
            let body = rewrite_html(&text, &final_url, target, &self.config)?;

            headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));

            info!("Relayed HTML {} ({}) from {}", status.as_u16(), body.len(), final_url);

            return Ok(RelayResponse {
                status,
                headers,
                body: Bytes::from(body),
            });
        }

        let content_length = upstream.headers().get(CONTENT_LENGTH).cloned();
        let body = upstream.bytes().await?;

        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, ct);
        }
        if let Some(len) = content_length {
            headers.insert(CONTENT_LENGTH, len);
        }

        info!("Relayed {} ({} bytes) from {}", status.as_u16(), body.len(), final_url);

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }
}
