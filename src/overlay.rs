//! Navigation overlay injected at the top of every relayed HTML page
//!
//! The overlay is self-contained (inline style, markup and script) so it
//! never triggers extra fetches through the relay. Its script builds relay
//! addresses from the same base path and encoding as the server-side
//! rewriter.

use crate::config::RelayConfig;
use html_escape::encode_double_quoted_attribute;

const STYLE: &str = r#"<style id="uv-toolbar-styles">
#uv-toolbar{position:fixed;left:8px;right:8px;top:8px;z-index:2147483647;
  display:flex;gap:8px;align-items:center;backdrop-filter:blur(6px);
  border-radius:12px;padding:8px 12px;border:1px solid rgba(255,255,255,0.06);
  background:linear-gradient(90deg,rgba(86,0,255,0.12),rgba(255,0,200,0.06));
  box-shadow:0 6px 24px rgba(48,16,96,0.45);font-family:Inter,Segoe UI,Roboto,Arial,sans-serif;}
#uv-toolbar input[type="text"]{flex:1;padding:8px 10px;border-radius:8px;border:0;background:rgba(0,0,0,0.35);color:#fff;}
#uv-toolbar button{padding:8px 10px;border-radius:8px;border:0;background:transparent;color:#fff;cursor:pointer}
#uv-toolbar .uv-brand{font-weight:700;margin-right:6px;color:#fff;letter-spacing:0.6px}
@media (max-width:640px){#uv-toolbar{flex-direction:column;gap:6px;align-items:stretch}}
</style>"#;

// `__RELAY_PREFIX__` is replaced with a JS string literal such as "/api/proxy?u="
const SCRIPT: &str = r#"<script>
(function(){
  var prefix = __RELAY_PREFIX__;
  var toolbar = document.getElementById('uv-toolbar');
  var form = document.getElementById('uv-nav');
  var input = document.getElementById('uv-url');
  form.addEventListener('submit', function(e){
    e.preventDefault();
    try {
      var url = new URL(input.value).toString();
      window.location.href = prefix + btoa(unescape(encodeURIComponent(url)));
    } catch (err) { alert('Please enter a full URL (including https://)'); }
  });
  document.getElementById('uv-close').addEventListener('click', function(){
    toolbar.style.display = 'none';
  });
  document.getElementById('uv-theme').addEventListener('click', function(){
    var root = document.documentElement;
    root.style.filter = root.style.filter ? '' : 'invert(1) hue-rotate(180deg)';
  });
  toolbar.addEventListener('click', function(e){ e.stopPropagation(); });
})();
</script>"#;

/// Marker id, present exactly once per rewritten document
pub const OVERLAY_ID: &str = "uv-toolbar";

/// Render the overlay for a page relayed from `target`
pub fn render_overlay(target: &str, config: &RelayConfig) -> String {
    let markup = format!(
        r#"<div id="{id}" aria-hidden="false">
<div class="uv-brand">ULTRAVIOLET</div>
<form id="uv-nav" style="display:flex;gap:8px;flex:1">
<input id="uv-url" type="text" value="{target}" />
<button id="uv-go" type="submit">Go</button>
</form>
<button id="uv-theme" type="button">Theme</button>
<button id="uv-close" type="button">Hide</button>
</div>
<div style="height:64px"></div>"#,
        id = OVERLAY_ID,
        target = encode_double_quoted_attribute(target),
    );

    let script = SCRIPT.replace("__RELAY_PREFIX__", &js_string(&config.proxied_link("")));

    format!("{STYLE}\n{markup}\n{script}\n")
}

/// Quote a value as a JS string literal that is safe inside a `<script>` element
fn js_string(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_shows_target() {
        let html = render_overlay("https://example.com/page.html", &RelayConfig::default());

        assert!(html.contains(r#"value="https://example.com/page.html""#));
        assert_eq!(html.matches(r#"id="uv-toolbar""#).count(), 1);
    }

    #[test]
    fn test_overlay_escapes_target() {
        let html = render_overlay("https://example.com/?a=1&b=\"x\"", &RelayConfig::default());

        assert!(html.contains(r#"value="https://example.com/?a=1&amp;b=&quot;x&quot;""#));
    }

    #[test]
    fn test_overlay_script_uses_configured_base_path() {
        let config = RelayConfig {
            base_path: "/relay".to_string(),
            ..Default::default()
        };
        let html = render_overlay("https://example.com/", &config);

        assert!(html.contains(r#"var prefix = "/relay?u=";"#));
        assert!(!html.contains("__RELAY_PREFIX__"));
    }

    #[test]
    fn test_overlay_has_controls() {
        let html = render_overlay("https://example.com/", &RelayConfig::default());

        assert!(html.contains(r#"id="uv-nav""#));
        assert!(html.contains(r#"id="uv-theme""#));
        assert!(html.contains(r#"id="uv-close""#));
        assert!(html.contains("invert(1)"));
        assert!(html.contains("stopPropagation"));
    }

    #[test]
    fn test_js_string_cannot_close_script() {
        assert_eq!(js_string("/a</script>"), r#""/a<\/script>""#);
    }
}
