//! HTML rewrite pass
//!
//! Link-bearing attributes are resolved against the page URL and pointed
//! back at the relay, then the navigation overlay is prepended to `<body>`.
//! Parsing is lenient and streaming, so malformed real-world markup is
//! passed through rather than rejected.

use crate::codec::encode_target;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::overlay::render_overlay;
use html_escape::decode_html_entities;
use lol_html::html_content::{ContentType, Element};
use lol_html::{rewrite_str, ElementContentHandlers, HandlerResult, RewriteStrSettings, Selector};
use std::borrow::Cow;
use std::cell::Cell;
use tracing::debug;
use url::Url;

/// (element matcher, attribute) pairs rewritten to go through the relay
pub const REWRITE_RULES: &[(&str, &str)] = &[
    ("a", "href"),
    ("img", "src"),
    ("script", "src"),
    (r#"link[rel="stylesheet"]"#, "href"),
    ("iframe", "src"),
];

/// Prefixes left untouched by the rewrite pass
const SKIPPED_PREFIXES: &[&str] = &["data:", "javascript:", "#"];

/// Rewrite a single attribute value into a relay address.
/// Returns `None` when the value must be left as it is.
pub fn proxify(raw: &str, base: &Url, config: &RelayConfig) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || is_skipped(value) {
        return None;
    }

    // Attribute text is not entity-decoded by the parser
    let value = decode_html_entities(value);

    let resolved = base.join(&value).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    Some(config.proxied_link(&encode_target(resolved.as_str())))
}

fn is_skipped(value: &str) -> bool {
    SKIPPED_PREFIXES.iter().any(|prefix| {
        value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Rewrite a whole HTML document.
/// Links resolve against `base`, where the document was served from;
/// the overlay shows `requested`, the target the caller asked for.
pub fn rewrite_html(
    html: &str,
    base: &Url,
    requested: &Url,
    config: &RelayConfig,
) -> Result<String, RelayError> {
    let overlay = render_overlay(requested.as_str(), config);
    let overlay_done = Cell::new(false);
    let rewritten = Cell::new(0usize);

    let mut handlers = Vec::with_capacity(REWRITE_RULES.len() + 1);

    for &(selector, attr) in REWRITE_RULES {
        let rewritten = &rewritten;
        handlers.push(handler(selector, move |el: &mut Element| {
            let Some(raw) = el.get_attribute(attr) else {
                return Ok(());
            };
            if let Some(link) = proxify(&raw, base, config) {
                el.set_attribute(attr, &link)?;
                rewritten.set(rewritten.get() + 1);
            }
            Ok(())
        })?);
    }

    handlers.push(handler("body", |el: &mut Element| {
        if !overlay_done.replace(true) {
            el.prepend(&overlay, ContentType::Html);
        }
        Ok(())
    })?);

    let mut output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            strict: false,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RelayError::Rewrite(e.to_string()))?;

    // Documents without a <body> tag get one implied by the browser,
    // and trailing content lands inside it
    if !overlay_done.get() {
        output.push_str(&overlay);
    }

    debug!("Rewrote {} links for {}", rewritten.get(), base);

    Ok(output)
}

fn handler<'h>(
    selector: &str,
    f: impl FnMut(&mut Element) -> HandlerResult + 'h,
) -> Result<(Cow<'static, Selector>, ElementContentHandlers<'h>), RelayError> {
    let selector: Selector = selector
        .parse()
        .map_err(|e| RelayError::Rewrite(format!("invalid selector {}: {}", selector, e)))?;

    Ok((Cow::Owned(selector), ElementContentHandlers::default().element(f)))
}
