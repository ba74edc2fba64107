//! Relay configuration
//! Built once at startup and shared read-only by every request

use hyper::header::HeaderValue;
use std::time::Duration;

/// Query parameter carrying the encoded target URL
pub const TARGET_PARAM: &str = "u";

/// Default relay entry point
pub const DEFAULT_BASE_PATH: &str = "/api/proxy";

/// Default User-Agent presented to upstream servers
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; UltravioletProxy/0.1)";

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub http_port: u16,
    /// Path the relay is served on; also used for every rewritten link
    pub base_path: String,
    pub user_agent: String,
    /// CORS allow-list. Empty means any origin (`*`)
    pub allowed_origins: Vec<String>,
    pub upstream_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            base_path: DEFAULT_BASE_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_origins: Vec::new(),
            upstream_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

impl RelayConfig {
    /// Build the relay-relative address for an already encoded target
    pub fn proxied_link(&self, encoded: &str) -> String {
        format!("{}?{}={}", self.base_path, TARGET_PARAM, encoded)
    }

    /// Value for `Access-Control-Allow-Origin`, if the request may see one
    pub fn cors_origin(&self, request_origin: Option<&str>) -> Option<HeaderValue> {
        if self.allowed_origins.is_empty() {
            return Some(HeaderValue::from_static("*"));
        }

        let origin = request_origin?;
        if self.allowed_origins.iter().any(|o| o.eq_ignore_ascii_case(origin)) {
            HeaderValue::from_str(origin).ok()
        } else {
            None
        }
    }

    /// Whether CORS responses vary by the request origin
    pub fn varies_by_origin(&self) -> bool {
        !self.allowed_origins.is_empty()
    }
}

/// Split a comma separated origin list, dropping blanks and trailing slashes
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxied_link_uses_base_path() {
        let config = RelayConfig {
            base_path: "/relay".to_string(),
            ..Default::default()
        };

        assert_eq!(config.proxied_link("aHR0cA=="), "/relay?u=aHR0cA==");
    }

    #[test]
    fn test_cors_wildcard_without_allow_list() {
        let config = RelayConfig::default();

        assert_eq!(config.cors_origin(None).unwrap(), "*");
        assert_eq!(config.cors_origin(Some("https://a.example")).unwrap(), "*");
        assert!(!config.varies_by_origin());
    }

    #[test]
    fn test_cors_allow_list_echoes_listed_origin() {
        let config = RelayConfig {
            allowed_origins: vec!["https://app.example".to_string()],
            ..Default::default()
        };

        assert_eq!(
            config.cors_origin(Some("https://app.example")).unwrap(),
            "https://app.example"
        );
        assert!(config.cors_origin(Some("https://evil.example")).is_none());
        assert!(config.cors_origin(None).is_none());
    }

    #[test]
    fn test_parse_origin_list() {
        assert_eq!(
            parse_origin_list(" https://a.example/, ,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_origin_list("").is_empty());
    }
}
