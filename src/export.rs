//! The export pipeline: assemble the page, then write it or capture it.

use crate::assets::AssetBundle;
use crate::format::ExportFormat;
use crate::inline::inline_assets;
use crate::provider::UrlBuilder;
use crate::template::{
    AssetInference, DefaultAssets, PageTemplate, PassthroughTransformer, TemplateOptions, Templater,
    Transformer,
};
use crate::{Error, ExportConfig, RenderOptions, Result};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

/// The external collaborators the pipeline delegates to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub transformer: &'a dyn Transformer,
    pub assets: &'a dyn AssetInference,
    pub templater: &'a dyn Templater,
}

impl Default for Collaborators<'static> {
    fn default() -> Self {
        Self {
            transformer: &PassthroughTransformer,
            assets: &DefaultAssets,
            templater: &PageTemplate,
        }
    }
}

/// Export `options.content` to `options.output` with the default collaborators.
pub async fn export(options: &RenderOptions, config: &ExportConfig) -> Result<PathBuf> {
    export_with(options, config, Collaborators::default()).await
}

/// Export with caller-supplied collaborators. Returns the written path.
///
/// Fails before touching the network, the filesystem or a browser when no
/// output path is set.
pub async fn export_with(
    options: &RenderOptions,
    config: &ExportConfig,
    collab: Collaborators<'_>,
) -> Result<PathBuf> {
    let output = options
        .output
        .as_deref()
        .ok_or_else(|| Error::ConfigError("Output file path is not specified".into()))?;
    let format = ExportFormat::from_path(output);
    debug!("Exporting {} as {}", output.display(), format);

    let html = build_html(options, config, collab).await?;

    if format.needs_browser() {
        let bytes = render_in_browser(html, format, config.clone())
            .await
            .inspect_err(|e| error!("An error occurred during file generation: {}", e))?;
        tokio::fs::write(output, bytes).await?;
    } else {
        tokio::fs::write(output, html).await?;
    }
    info!("{} file written to: {}", format.extension().to_uppercase(), output.display());

    if options.open {
        open_output(output);
    }
    Ok(output.to_path_buf())
}

/// Resolve assets and render the page markup.
pub async fn build_html(
    options: &RenderOptions,
    config: &ExportConfig,
    collab: Collaborators<'_>,
) -> Result<String> {
    let mut urls = config.url_builder()?;
    urls.resolve(&config.provider_strategy(options.offline)).await;

    let transformed = collab.transformer.transform(&options.content)?;
    let assets = collect_assets(collab.assets, &transformed.features, &urls, options.toolbar);

    let assets = if options.offline {
        let inlined = inline_assets(&assets, &config.assets_dir).await?;
        debug_assert!(inlined.is_fully_inline());
        inlined
    } else {
        assets
    };

    let template_options = TemplateOptions {
        title: None,
        json_options: transformed
            .frontmatter
            .as_ref()
            .and_then(|fm| fm.get("markmap"))
            .cloned(),
    };
    collab
        .templater
        .fill(&transformed.root, &assets, &template_options)
}

fn collect_assets(
    inference: &dyn AssetInference,
    features: &std::collections::BTreeSet<String>,
    urls: &UrlBuilder,
    toolbar: bool,
) -> AssetBundle {
    let assets = inference.used_assets(features, urls).with_base_scripts(urls);
    if toolbar {
        assets.with_toolbar(urls)
    } else {
        assets
    }
}

#[cfg(feature = "cdp")]
async fn render_in_browser(html: String, format: ExportFormat, config: ExportConfig) -> Result<Vec<u8>> {
    // headless_chrome blocks; keep it off the async executor
    tokio::task::spawn_blocking(move || crate::cdp::capture(&html, format, &config))
        .await
        .map_err(|e| Error::Other(format!("Browser task failed: {}", e)))?
}

#[cfg(not(feature = "cdp"))]
async fn render_in_browser(_html: String, format: ExportFormat, _config: ExportConfig) -> Result<Vec<u8>> {
    Err(Error::Unsupported(format!(
        "{} export needs the `cdp` feature",
        format
    )))
}

fn open_output(path: &Path) {
    if let Err(e) = open::that(path) {
        warn!("Failed to open {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ScriptItem;
    use crate::template::Transformed;

    struct FailingTransformer;

    impl Transformer for FailingTransformer {
        fn transform(&self, _content: &str) -> Result<Transformed> {
            Err(Error::Other("bad document".into()))
        }
    }

    fn fixed_config() -> ExportConfig {
        ExportConfig {
            provider: Some("unpkg".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_output_fails_fast() {
        let options = RenderOptions {
            content: "# a".into(),
            output: None,
            ..Default::default()
        };
        let err = export(&options, &fixed_config()).await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn transform_errors_propagate() {
        let collab = Collaborators {
            transformer: &FailingTransformer,
            ..Collaborators::default()
        };
        let options = RenderOptions {
            content: "# a".into(),
            output: Some("unused.html".into()),
            ..Default::default()
        };
        let err = build_html(&options, &fixed_config(), collab).await.unwrap_err();
        assert!(err.to_string().contains("bad document"));
    }

    #[test]
    fn toolbar_is_optional() {
        let urls = UrlBuilder::new();
        let features = Default::default();
        let plain = collect_assets(&DefaultAssets, &features, &urls, false);
        let with_toolbar = collect_assets(&DefaultAssets, &features, &urls, true);
        assert_eq!(plain.styles.len(), 0);
        assert_eq!(with_toolbar.styles.len(), 1);
        assert_eq!(with_toolbar.scripts.len(), plain.scripts.len() + 2);
        let transformer = ScriptItem::external(urls.full_url(crate::assets::TRANSFORMER_JS_PATH));
        assert_eq!(plain.scripts.last(), Some(&transformer));
    }
}
