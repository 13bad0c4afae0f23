//! Mapshot
//!
//! Turns a mind-map document into a finished artifact: an interactive HTML
//! page, a standalone SVG, a PNG, or a single-page PDF.
//!
//! # Features
//!
//! - **CDP Backend** (default): SVG, PNG and PDF are captured from headless
//!   Chrome through the DevTools protocol
//! - **Offline pages**: every script and stylesheet can be inlined so the
//!   result works without network access
//! - **Pluggable collaborators**: transform, asset inference and templating
//!   sit behind traits in [`template`]
//!
//! # Example
//!
//! ```no_run
//! use mapshot::{ExportConfig, RenderOptions};
//!
//! # async fn run() -> mapshot::Result<()> {
//! let options = RenderOptions {
//!     content: "# Project\n\n- Goals\n- Risks".to_string(),
//!     output: Some("project.svg".into()),
//!     ..Default::default()
//! };
//!
//! let written = mapshot::export(&options, &ExportConfig::default()).await?;
//! println!("Wrote {}", written.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod assets;
pub mod export;
pub mod fetch;
pub mod format;
pub mod inline;
pub mod probe;
pub mod provider;
pub mod template;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use assets::{AssetBundle, AssetReference, ScriptItem, StyleItem};
pub use export::{build_html, export, export_with, Collaborators};
pub use fetch::fetch_assets;
pub use format::ExportFormat;
pub use inline::inline_assets;
pub use probe::Dimensions;
pub use provider::{ProviderStrategy, UrlBuilder};

/// What to export and where
///
/// `RenderOptions` is read-only for the whole export; the pipeline only
/// ever borrows it.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Document source
    pub content: String,
    /// Destination file; its extension selects the format
    pub output: Option<PathBuf>,
    /// Open the produced file with the default application
    pub open: bool,
    /// Add the zoom/fit toolbar to the page
    pub toolbar: bool,
    /// Inline every asset and resolve framework paths locally
    pub offline: bool,
}

/// Configuration for the export pipeline
///
/// The defaults follow the browser wait budgets the pipeline was tuned
/// with: 60 s for page load and PDF printing, 30 s for the diagram to
/// appear, and a one second settle delay before capture.
///
/// # Examples
///
/// ```
/// let cfg = mapshot::ExportConfig::default();
/// assert_eq!(cfg.diagram_selector, "svg");
/// assert_eq!(cfg.device_scale_factor, 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory holding locally cached assets (`/assets/...` references)
    pub assets_dir: PathBuf,
    /// Force a named provider instead of probing for the fastest one
    pub provider: Option<String>,
    /// Extra `(name, base URL)` providers registered next to the built-in CDNs
    pub extra_providers: Vec<(String, String)>,
    /// How long to wait for a provider probe before falling back
    pub provider_probe_timeout_ms: u64,
    /// Page load and network idle budget
    pub load_timeout_ms: u64,
    /// Budget for the diagram root to appear
    pub selector_timeout_ms: u64,
    /// Budget for PDF printing
    pub pdf_timeout_ms: u64,
    /// Pause between sizing the viewport and capturing
    pub settle_delay_ms: u64,
    /// Pixel density of raster captures
    pub device_scale_factor: f64,
    /// CSS selector of the rendered diagram root
    pub diagram_selector: String,
    /// Chrome/Chromium executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let assets_dir = dirs::cache_dir()
            .map(|dir| dir.join("mapshot").join("assets"))
            .unwrap_or_else(|| PathBuf::from(".mapshot/assets"));
        Self {
            assets_dir,
            provider: None,
            extra_providers: Vec::new(),
            provider_probe_timeout_ms: 5000,
            load_timeout_ms: 60000,
            selector_timeout_ms: 30000,
            pdf_timeout_ms: 60000,
            settle_delay_ms: 1000,
            device_scale_factor: 2.0,
            diagram_selector: "svg".to_string(),
            chrome_path: None,
        }
    }
}

impl ExportConfig {
    /// Provider table for one export: the built-in CDNs plus `extra_providers`.
    pub fn url_builder(&self) -> Result<UrlBuilder> {
        let mut urls = UrlBuilder::new();
        for (name, base) in &self.extra_providers {
            urls.set_provider(name, base)?;
        }
        Ok(urls)
    }

    /// Provider selection for an export; offline exports always resolve locally.
    pub fn provider_strategy(&self, offline: bool) -> ProviderStrategy {
        if offline {
            ProviderStrategy::Local
        } else if let Some(name) = &self.provider {
            ProviderStrategy::Fixed(name.clone())
        } else {
            ProviderStrategy::Fastest {
                timeout: Duration::from_millis(self.provider_probe_timeout_ms),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.load_timeout_ms, 60000);
        assert_eq!(config.selector_timeout_ms, 30000);
        assert_eq!(config.pdf_timeout_ms, 60000);
        assert_eq!(config.settle_delay_ms, 1000);
        assert!(config.assets_dir.ends_with("assets"));
    }

    #[test]
    fn test_provider_strategy() {
        let mut config = ExportConfig::default();
        assert_eq!(config.provider_strategy(true), ProviderStrategy::Local);
        assert!(matches!(
            config.provider_strategy(false),
            ProviderStrategy::Fastest { .. }
        ));

        config.provider = Some("unpkg".into());
        assert_eq!(config.provider_strategy(false), ProviderStrategy::Fixed("unpkg".into()));
        assert_eq!(config.provider_strategy(true), ProviderStrategy::Local);
    }

    #[test]
    fn test_extra_providers_are_registered() {
        let config = ExportConfig {
            extra_providers: vec![("mirror".into(), "https://mirror.test/npm/".into())],
            ..Default::default()
        };
        let urls = config.url_builder().unwrap();
        let names: Vec<_> = urls.provider_names().collect();
        assert_eq!(names, ["jsdelivr", "mirror", "unpkg"]);

        let bad = ExportConfig {
            extra_providers: vec![("bad".into(), "not a url".into())],
            ..Default::default()
        };
        assert!(matches!(bad.url_builder(), Err(Error::ConfigError(_))));
    }
}
