//! Collaborator seams around the export core, plus the default
//! implementations the binary ships with.
//!
//! The core never looks inside a document: a [`Transformer`] turns source
//! text into a tree, an [`AssetInference`] names the assets that tree needs,
//! and a [`Templater`] assembles the final page. The defaults hand the raw
//! source to the page and let the delivered JS build and draw the map.

use crate::assets::{AssetBundle, AssetReference, ScriptItem, StyleItem, TRANSFORMER_JS_PATH};
use crate::provider::UrlBuilder;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Output of a transform: the tree root plus what it needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    pub root: Value,
    pub features: BTreeSet<String>,
    pub frontmatter: Option<Value>,
}

/// Turns document source into a renderable tree
pub trait Transformer: Send + Sync {
    fn transform(&self, content: &str) -> Result<Transformed>;
}

/// Maps a feature set to the scripts and styles that implement it
pub trait AssetInference: Send + Sync {
    fn used_assets(&self, features: &BTreeSet<String>, urls: &UrlBuilder) -> AssetBundle;
}

/// Options forwarded to the page template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateOptions {
    /// Page title
    pub title: Option<String>,
    /// Render options taken from the document's frontmatter
    pub json_options: Option<Value>,
}

/// Renders a tree and its assets into a complete HTML document
pub trait Templater: Send + Sync {
    fn fill(&self, root: &Value, assets: &AssetBundle, options: &TemplateOptions) -> Result<String>;
}

/// Forwards the raw source as the tree root; the page transforms it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

impl Transformer for PassthroughTransformer {
    fn transform(&self, content: &str) -> Result<Transformed> {
        Ok(Transformed {
            root: json!({ "content": content }),
            features: BTreeSet::new(),
            frontmatter: None,
        })
    }
}

/// Always asks for the in-page transformer and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssets;

impl AssetInference for DefaultAssets {
    fn used_assets(&self, _features: &BTreeSet<String>, urls: &UrlBuilder) -> AssetBundle {
        AssetBundle {
            scripts: vec![ScriptItem::external(urls.full_url(TRANSFORMER_JS_PATH))],
            styles: vec![],
        }
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<meta http-equiv="X-UA-Compatible" content="ie=edge">
<title>{{TITLE}}</title>
<style>
* {
  margin: 0;
  padding: 0;
}
html {
  font-family: ui-sans-serif, system-ui, sans-serif, 'Apple Color Emoji',
    'Segoe UI Emoji', 'Segoe UI Symbol', 'Noto Color Emoji';
}
#mindmap {
  display: block;
  width: 100vw;
  height: 100vh;
}
</style>
"#;

/// Builds the tree in the page when the root still carries raw source,
/// then mounts the map on `svg#mindmap` and exposes it as `window.mm`.
const PAGE_INIT: &str = r#"(function(root, jsonOptions) {
  const { Markmap, Transformer, deriveOptions } = window.markmap;
  let data = root;
  if (typeof root.content === 'string' && !root.children && Transformer) {
    const result = new Transformer().transform(root.content);
    data = result.root;
    if (!jsonOptions && result.frontmatter) jsonOptions = result.frontmatter.markmap;
  }
  const options = deriveOptions ? deriveOptions(jsonOptions || {}) : jsonOptions;
  window.mm = Markmap.create('svg#mindmap', options, data);
})"#;

/// The page the binary renders by default
#[derive(Debug, Clone, Copy, Default)]
pub struct PageTemplate;

impl Templater for PageTemplate {
    fn fill(&self, root: &Value, assets: &AssetBundle, options: &TemplateOptions) -> Result<String> {
        let title = options.title.as_deref().unwrap_or("Markmap");
        let mut html = PAGE_HEAD.replace("{{TITLE}}", &escape_html(title));

        for style in &assets.styles {
            html.push_str(&render_style(style));
            html.push('\n');
        }
        html.push_str("</head>\n<body>\n<svg id=\"mindmap\"></svg>\n");

        for script in &assets.scripts {
            html.push_str(&render_script(script));
            html.push('\n');
        }

        let json_options = options.json_options.clone().unwrap_or(Value::Null);
        html.push_str("<script>");
        html.push_str(PAGE_INIT);
        html.push('(');
        html.push_str(&script_json(root)?);
        html.push_str(", ");
        html.push_str(&script_json(&json_options)?);
        html.push_str(")</script>\n</body>\n</html>\n");
        Ok(html)
    }
}

/// Serialize a value for embedding inside a `<script>` element.
fn script_json(value: &Value) -> Result<String> {
    let json = serde_json::to_string(value)
        .map_err(|e| Error::RenderError(format!("Failed to serialize page data: {}", e)))?;
    Ok(json.replace("</", "<\\/"))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Break every `</tag` in `content`, in any letter case, so inlined text
/// cannot end its element early. `tag` must be lowercase.
fn escape_closing_tag(content: &str, tag: &str) -> String {
    let needle = format!("</{}", tag);
    // ASCII lowering keeps byte offsets aligned with `content`
    let lowered = content.to_ascii_lowercase();
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for (at, _) in lowered.match_indices(&needle) {
        out.push_str(&content[last..at]);
        out.push_str("<\\/");
        last = at + 2;
    }
    out.push_str(&content[last..]);
    out
}

/// HTML tag for one script entry
pub fn render_script(item: &ScriptItem) -> String {
    match &item.source {
        AssetReference::External { url } => format!("<script src=\"{}\"></script>", escape_html(url)),
        AssetReference::Inline { content } => {
            format!("<script>{}</script>", escape_closing_tag(content, "script"))
        }
    }
}

/// HTML tag for one style entry
pub fn render_style(item: &StyleItem) -> String {
    match &item.source {
        AssetReference::External { url } => {
            format!("<link rel=\"stylesheet\" href=\"{}\">", escape_html(url))
        }
        AssetReference::Inline { content } => {
            format!("<style>{}</style>", escape_closing_tag(content, "style"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_keeps_source_verbatim() {
        let t = PassthroughTransformer.transform("# Root\n\n- a\n- b").unwrap();
        assert_eq!(t.root["content"], "# Root\n\n- a\n- b");
        assert!(t.features.is_empty());
    }

    #[test]
    fn page_keeps_asset_order() {
        let assets = AssetBundle {
            scripts: vec![
                ScriptItem::external("https://cdn.test/one.js"),
                ScriptItem::inline("window.two = 2;"),
                ScriptItem::external("https://cdn.test/three.js"),
            ],
            styles: vec![StyleItem::external("https://cdn.test/a.css"), StyleItem::inline("b{}")],
        };
        let html = PageTemplate
            .fill(&json!({"content": "# x"}), &assets, &TemplateOptions::default())
            .unwrap();

        let one = html.find("one.js").unwrap();
        let two = html.find("window.two").unwrap();
        let three = html.find("three.js").unwrap();
        assert!(one < two && two < three);
        assert!(html.find("a.css").unwrap() < html.find("<style>b{}</style>").unwrap());
        assert!(html.contains("<svg id=\"mindmap\"></svg>"));
    }

    #[test]
    fn embedded_content_cannot_close_the_script() {
        let html = PageTemplate
            .fill(
                &json!({"content": "</script><script>alert(1)</script>"}),
                &AssetBundle::default(),
                &TemplateOptions::default(),
            )
            .unwrap();
        assert!(!html.contains("</script><script>alert(1)"));
    }

    #[test]
    fn inlined_assets_cannot_close_their_tag_in_any_case() {
        let script = render_script(&ScriptItem::inline("a('</SCRIPT>'); b('</Script >');"));
        assert_eq!(script, "<script>a('<\\/SCRIPT>'); b('<\\/Script >');</script>");
        assert_eq!(script.to_ascii_lowercase().matches("</script").count(), 1);

        let style = render_style(&StyleItem::inline("p{} </STYLE><b>"));
        assert_eq!(style, "<style>p{} <\\/STYLE><b></style>");
    }

    #[test]
    fn urls_are_attribute_escaped() {
        let tag = render_script(&ScriptItem::external("https://x.test/a.js?a=1&b=\"2\""));
        assert_eq!(tag, "<script src=\"https://x.test/a.js?a=1&amp;b=&quot;2&quot;\"></script>");
    }
}
