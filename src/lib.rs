//! Ultraviolet Relay - an HTTP(S) forwarding relay
//!
//! Fetches a caller-specified resource and relays it back:
//! - Targets are addressed as `?u=<base64(url)>`
//! - HTML documents have their links rewritten to flow through the relay
//! - A navigation overlay is injected into every relayed page
//! - Everything else is passed through unmodified

pub mod codec;
pub mod config;
pub mod error;
pub mod overlay;
pub mod proxy;
pub mod relay;
pub mod rewrite;

pub use codec::{decode_target, encode_target};
pub use config::RelayConfig;
pub use error::RelayError;
pub use proxy::ProxyServer;
pub use relay::{Relay, RelayResponse};
