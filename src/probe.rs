//! In-page scripts and their JSON reply contracts.
//!
//! The page is treated as a remote peer: every script runs in the page's
//! global context and answers with a `JSON.stringify`-ed value (or `null`),
//! which is decoded here with `serde_json`.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// CSS pixels per inch, used to express page sizes for printing.
pub const CSS_PX_PER_INCH: f64 = 96.0;

/// XML declaration prepended to serialized SVG documents
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;

/// Tight bounding box of the rendered diagram, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Page size in inches for a print capture of exactly this box
    pub fn paper_inches(&self) -> (f64, f64) {
        (
            self.width as f64 / CSS_PX_PER_INCH,
            self.height as f64 / CSS_PX_PER_INCH,
        )
    }
}

/// Reply of the SVG serialization script
#[derive(Debug, Clone, Deserialize)]
pub struct SvgReply {
    pub svg: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

fn js_string(s: &str) -> String {
    // A JSON string literal is a valid JS string literal
    serde_json::Value::String(s.to_string()).to_string()
}

/// Strip margins and padding, clear the body background and measure the
/// diagram root. Answers `null` when the root is missing.
pub fn dimensions_script(selector: &str) -> String {
    format!(
        r#"(function() {{
    const svg = document.querySelector({sel});
    if (!svg) return null;
    svg.style.display = 'block';
    svg.style.margin = '0';
    svg.style.padding = '0';
    document.body.style.margin = '0';
    document.body.style.padding = '0';
    document.body.style.background = 'transparent';
    const rect = svg.getBoundingClientRect();
    return JSON.stringify({{
        width: Math.ceil(rect.width),
        height: Math.ceil(rect.height)
    }});
}})()"#,
        sel = js_string(selector)
    )
}

/// Namespace the diagram root, inline every readable CSS rule as its first
/// child and serialize it with an XML declaration.
pub fn svg_script(selector: &str) -> String {
    format!(
        r#"(function() {{
    const svg = document.querySelector({sel});
    if (!svg) return JSON.stringify({{ svg: '', warnings: [] }});
    const NS = 'http://www.w3.org/2000/svg';
    svg.setAttribute('xmlns', NS);
    const warnings = [];
    const rules = Array.from(document.styleSheets).flatMap(function(sheet) {{
        try {{
            return Array.from(sheet.cssRules);
        }} catch (e) {{
            warnings.push('Unable to access cssRules for stylesheet ' + (sheet.href || '(inline)'));
            return [];
        }}
    }});
    const style = document.createElementNS(NS, 'style');
    style.textContent = rules.map(function(rule) {{ return rule.cssText; }}).join('\n');
    svg.insertBefore(style, svg.firstChild);
    return JSON.stringify({{
        svg: {decl} + '\n' + svg.outerHTML,
        warnings: warnings
    }});
}})()"#,
        sel = js_string(selector),
        decl = js_string(XML_DECLARATION)
    )
}

/// Force an opaque white background behind the diagram for raster capture.
pub fn opaque_background_script(selector: &str) -> String {
    format!(
        r#"(function() {{
    const svg = document.querySelector({sel});
    if (svg) {{
        svg.style.background = 'white';
        if (svg.parentElement) svg.parentElement.style.background = 'white';
    }}
    document.body.style.background = 'white';
    return null;
}})()"#,
        sel = js_string(selector)
    )
}

/// Whether the document and its subresources have finished loading. The
/// reply carries the resource-timing entry count so callers can detect a
/// quiet network.
pub const LOAD_STATE_SCRIPT: &str = r#"JSON.stringify({
    ready: document.readyState === 'complete',
    resources: performance.getEntriesByType('resource').length
})"#;

/// Full scrollable size of the document, for full-page screenshots.
pub const PAGE_SIZE_SCRIPT: &str = r#"JSON.stringify({
    width: Math.ceil(document.documentElement.scrollWidth),
    height: Math.ceil(document.documentElement.scrollHeight)
})"#;

/// Reply of [`LOAD_STATE_SCRIPT`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LoadState {
    pub ready: bool,
    pub resources: u64,
}

/// Decode a page reply. `null`/absent values decode to `None`.
pub fn parse_reply<T: DeserializeOwned>(value: Option<serde_json::Value>) -> Result<Option<T>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(serde_json::from_str(&s)?)),
        Some(other) => Err(Error::ScriptError(format!(
            "Expected a JSON string from the page, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paper_size_matches_measured_box() {
        let dims = Dimensions { width: 960, height: 480 };
        let (w, h) = dims.paper_inches();
        assert_eq!(w, 10.0);
        assert_eq!(h, 5.0);
        assert_eq!((w * CSS_PX_PER_INCH).round() as u32, dims.width);
        assert_eq!((h * CSS_PX_PER_INCH).round() as u32, dims.height);
    }

    #[test]
    fn dimensions_reply_decodes() {
        let reply = Some(json!("{\"width\":301,\"height\":120}"));
        let dims: Option<Dimensions> = parse_reply(reply).unwrap();
        assert_eq!(dims, Some(Dimensions { width: 301, height: 120 }));
    }

    #[test]
    fn null_reply_means_missing_root() {
        let dims: Option<Dimensions> = parse_reply(Some(serde_json::Value::Null)).unwrap();
        assert!(dims.is_none());
        let dims: Option<Dimensions> = parse_reply(None).unwrap();
        assert!(dims.is_none());
    }

    #[test]
    fn non_string_reply_is_an_error() {
        let res: Result<Option<Dimensions>> = parse_reply(Some(json!(42)));
        assert!(matches!(res, Err(Error::ScriptError(_))));
    }

    #[test]
    fn svg_reply_warnings_default_to_empty() {
        let reply: SvgReply = parse_reply(Some(json!("{\"svg\":\"<svg/>\"}")))
            .unwrap()
            .unwrap();
        assert_eq!(reply.svg, "<svg/>");
        assert!(reply.warnings.is_empty());
    }

    #[test]
    fn selector_is_quoted_safely() {
        let script = dimensions_script("svg[data-x='a\"b']");
        assert!(script.contains(r#"document.querySelector("svg[data-x='a\"b']")"#));
    }

    #[test]
    fn png_script_only_touches_backgrounds() {
        let script = opaque_background_script("svg");
        assert!(script.contains("background = 'white'"));
        assert!(!script.contains("margin"));
    }

    #[test]
    fn svg_script_embeds_xml_declaration() {
        let script = svg_script("svg");
        assert!(script.contains(r#"standalone=\"no\"?>"#));
        assert!(script.contains("insertBefore(style, svg.firstChild)"));
    }
}
