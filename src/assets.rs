//! Script and stylesheet references needed to render a document.
//!
//! An [`AssetBundle`] keeps scripts and styles in two ordered lists. Order is
//! significant: later scripts may depend on globals defined by earlier ones,
//! and later stylesheets override earlier rules.

use crate::provider::UrlBuilder;
use serde::{Deserialize, Serialize};

/// npm paths of the scripts every rendered page needs, in load order.
pub const BASE_JS_PATHS: &[&str] = &[
    "d3@7.9.0/dist/d3.min.js",
    "markmap-view@0.18.12/dist/browser/index.js",
];

/// Browser build of the transformer, used by the page to build the tree.
pub const TRANSFORMER_JS_PATH: &str = "markmap-lib@0.18.12/dist/browser/index.iife.js";

pub const TOOLBAR_JS_PATH: &str = "markmap-toolbar@0.18.12/dist/index.js";
pub const TOOLBAR_CSS_PATH: &str = "markmap-toolbar@0.18.12/dist/style.css";

/// Mounts the toolbar once the page has created its `window.mm` instance.
const TOOLBAR_INIT: &str = r#"(r => {
  setTimeout(r);
})(() => {
  const { markmap, mm } = window;
  const { el } = markmap.Toolbar.create(mm);
  el.setAttribute('style', 'position:absolute;bottom:20px;right:20px');
  document.body.append(el);
});"#;

/// Every npm path the crate may reference; used to warm the local cache.
pub fn known_asset_paths() -> Vec<&'static str> {
    let mut paths = BASE_JS_PATHS.to_vec();
    paths.extend([TRANSFORMER_JS_PATH, TOOLBAR_JS_PATH, TOOLBAR_CSS_PATH]);
    paths
}

/// Where an asset's content comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssetReference {
    /// Loaded by URL at page load time
    External { url: String },
    /// Embedded directly in the page
    Inline { content: String },
}

impl AssetReference {
    pub fn is_external(&self) -> bool {
        matches!(self, AssetReference::External { .. })
    }

    /// URL of an external reference, `None` once inlined
    pub fn url(&self) -> Option<&str> {
        match self {
            AssetReference::External { url } => Some(url),
            AssetReference::Inline { .. } => None,
        }
    }
}

/// An executable script entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptItem {
    pub source: AssetReference,
}

impl ScriptItem {
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            source: AssetReference::External { url: url.into() },
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            source: AssetReference::Inline {
                content: content.into(),
            },
        }
    }
}

/// A stylesheet entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleItem {
    pub source: AssetReference,
}

impl StyleItem {
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            source: AssetReference::External { url: url.into() },
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            source: AssetReference::Inline {
                content: content.into(),
            },
        }
    }
}

/// Ordered scripts and styles required by a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBundle {
    pub scripts: Vec<ScriptItem>,
    pub styles: Vec<StyleItem>,
}

impl AssetBundle {
    /// True when no entry still refers to a URL
    pub fn is_fully_inline(&self) -> bool {
        self.scripts.iter().all(|s| !s.source.is_external())
            && self.styles.iter().all(|s| !s.source.is_external())
    }

    /// URLs of all external entries, scripts first
    pub fn external_urls(&self) -> Vec<&str> {
        self.scripts
            .iter()
            .filter_map(|s| s.source.url())
            .chain(self.styles.iter().filter_map(|s| s.source.url()))
            .collect()
    }

    /// Put the framework base scripts in front of the existing ones.
    pub fn with_base_scripts(mut self, urls: &UrlBuilder) -> Self {
        let mut scripts: Vec<ScriptItem> = BASE_JS_PATHS
            .iter()
            .map(|path| ScriptItem::external(urls.full_url(path)))
            .collect();
        scripts.append(&mut self.scripts);
        self.scripts = scripts;
        self
    }

    /// Append the toolbar script, its stylesheet and the mount snippet.
    pub fn with_toolbar(mut self, urls: &UrlBuilder) -> Self {
        self.styles.push(StyleItem::external(urls.full_url(TOOLBAR_CSS_PATH)));
        self.scripts.push(ScriptItem::external(urls.full_url(TOOLBAR_JS_PATH)));
        self.scripts.push(ScriptItem::inline(TOOLBAR_INIT));
        self
    }
}
