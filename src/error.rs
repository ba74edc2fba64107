//! Relay error type
//! Every variant maps to a status code and a plain-text body

use hyper::StatusCode;
use std::error::Error as StdError;
use thiserror::Error;

/// Errors surfaced to the caller of the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// The `u` parameter is not valid base64 of a UTF-8 string
    #[error("Invalid target encoding. Use ?u=<base64 of full https:// URL>")]
    InvalidEncoding,

    /// The decoded target is not an absolute http(s) URL
    #[error("Invalid target. Use ?u=<base64 of full https:// URL>")]
    InvalidTarget,

    #[error("Upstream fetch error: {}", describe(.0))]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to rewrite document: {0}")]
    Rewrite(String),
}

impl RelayError {
    /// Status code reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidEncoding | Self::InvalidTarget => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

/// Flatten an error and its sources into one line.
/// reqwest hides DNS/connect/TLS detail in the source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }

    message
}
