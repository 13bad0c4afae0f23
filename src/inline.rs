//! Offline inlining: replace every external asset reference with its content.

use crate::assets::{AssetBundle, AssetReference, ScriptItem, StyleItem};
use crate::provider::LOCAL_ASSETS_PREFIX;
use crate::{Error, Result};
use futures::future::try_join_all;
use log::debug;
use std::path::{Component, Path, PathBuf};

/// Map a `/assets/...` reference to a file under `assets_dir`, refusing any
/// path that would escape the directory.
pub(crate) fn local_asset_path(assets_dir: &Path, url: &str) -> Result<PathBuf> {
    let rel = url.strip_prefix(LOCAL_ASSETS_PREFIX).unwrap_or(url);
    let rel = Path::new(rel);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(Error::asset(url, "path escapes the local asset directory"));
    }
    Ok(assets_dir.join(rel))
}

/// Load the text behind one reference: local files for `/assets/` URLs,
/// HTTP for everything else.
async fn load_file(client: &reqwest::Client, assets_dir: &Path, url: &str) -> Result<String> {
    if url.starts_with(LOCAL_ASSETS_PREFIX) {
        let path = local_asset_path(assets_dir, url)?;
        debug!("Inlining {} from {}", url, path.display());
        return tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::asset(url, format!("{}: {}", path.display(), e)));
    }

    debug!("Inlining {} over HTTP", url);
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::asset(url, e))?;
    if !res.status().is_success() {
        return Err(Error::asset(url, format!("HTTP {}", res.status())));
    }
    res.text().await.map_err(|e| Error::asset(url, e))
}

async fn inline_script(
    client: &reqwest::Client,
    assets_dir: &Path,
    item: &ScriptItem,
) -> Result<ScriptItem> {
    match &item.source {
        AssetReference::External { url } => {
            Ok(ScriptItem::inline(load_file(client, assets_dir, url).await?))
        }
        AssetReference::Inline { .. } => Ok(item.clone()),
    }
}

async fn inline_style(
    client: &reqwest::Client,
    assets_dir: &Path,
    item: &StyleItem,
) -> Result<StyleItem> {
    match &item.source {
        AssetReference::External { url } => {
            Ok(StyleItem::inline(load_file(client, assets_dir, url).await?))
        }
        AssetReference::Inline { .. } => Ok(item.clone()),
    }
}

/// Return a copy of `bundle` in which every external script and stylesheet
/// has been fetched and embedded.
///
/// Scripts and styles are fetched concurrently; the output keeps the input
/// order. A single failed fetch fails the whole call, so a partially inlined
/// bundle is never returned.
pub async fn inline_assets(bundle: &AssetBundle, assets_dir: &Path) -> Result<AssetBundle> {
    let client = reqwest::Client::new();
    inline_assets_with(&client, bundle, assets_dir).await
}

/// [`inline_assets`] with a caller-supplied HTTP client.
pub async fn inline_assets_with(
    client: &reqwest::Client,
    bundle: &AssetBundle,
    assets_dir: &Path,
) -> Result<AssetBundle> {
    let scripts = try_join_all(
        bundle
            .scripts
            .iter()
            .map(|item| inline_script(client, assets_dir, item)),
    );
    let styles = try_join_all(
        bundle
            .styles
            .iter()
            .map(|item| inline_style(client, assets_dir, item)),
    );

    let (scripts, styles) = tokio::try_join!(scripts, styles)?;
    Ok(AssetBundle { scripts, styles })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_resolve_inside_dir() {
        let dir = Path::new("/tmp/assets");
        let p = local_asset_path(dir, "/assets/d3@7/dist/d3.js").unwrap();
        assert_eq!(p, PathBuf::from("/tmp/assets/d3@7/dist/d3.js"));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = Path::new("/tmp/assets");
        assert!(local_asset_path(dir, "/assets/../secret").is_err());
    }

    #[tokio::test]
    async fn inline_entries_pass_through_without_io() {
        let bundle = AssetBundle {
            scripts: vec![ScriptItem::inline("window.a = 1;")],
            styles: vec![StyleItem::inline("svg{}")],
        };
        let out = inline_assets(&bundle, Path::new("/nonexistent")).await.unwrap();
        assert_eq!(out, bundle);
    }

    #[tokio::test]
    async fn local_assets_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg/dist")).unwrap();
        std::fs::write(dir.path().join("pkg/dist/a.js"), "var a;").unwrap();
        std::fs::write(dir.path().join("pkg/dist/a.css"), "a{}").unwrap();

        let bundle = AssetBundle {
            scripts: vec![ScriptItem::external("/assets/pkg/dist/a.js")],
            styles: vec![StyleItem::external("/assets/pkg/dist/a.css")],
        };
        let out = inline_assets(&bundle, dir.path()).await.unwrap();
        assert_eq!(out.scripts, vec![ScriptItem::inline("var a;")]);
        assert_eq!(out.styles, vec![StyleItem::inline("a{}")]);
    }

    #[tokio::test]
    async fn missing_local_asset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = AssetBundle {
            scripts: vec![ScriptItem::external("/assets/missing.js")],
            styles: vec![],
        };
        let err = inline_assets(&bundle, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::AssetError { .. }));
    }
}
