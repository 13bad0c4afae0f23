//! Warm the local asset directory so offline exports can inline from disk.

use crate::assets::known_asset_paths;
use crate::inline::local_asset_path;
use crate::provider::{UrlBuilder, LOCAL_ASSETS_PREFIX};
use crate::{Error, Result};
use futures::future::try_join_all;
use log::{debug, info};
use std::path::Path;

/// Download one npm path unless it is already cached. Returns whether a
/// download happened.
async fn fetch_one(
    client: &reqwest::Client,
    urls: &UrlBuilder,
    assets_dir: &Path,
    path: &str,
) -> Result<bool> {
    let dest = local_asset_path(assets_dir, &format!("{}{}", LOCAL_ASSETS_PREFIX, path))?;
    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        debug!("Asset already cached: {}", dest.display());
        return Ok(false);
    }

    let url = urls.full_url(path);
    let res = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::asset(&url, e))?;
    if !res.status().is_success() {
        return Err(Error::asset(&url, format!("HTTP {}", res.status())));
    }
    let body = res.bytes().await.map_err(|e| Error::asset(&url, e))?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, &body).await?;
    debug!("Cached {} -> {}", url, dest.display());
    Ok(true)
}

/// Download every known framework asset through `urls` into `assets_dir`,
/// skipping files that are already present. Returns how many were fetched.
///
/// `urls` should point at a remote provider; the local provider would
/// resolve back to the directory being filled.
pub async fn fetch_assets(urls: &UrlBuilder, assets_dir: &Path) -> Result<usize> {
    let client = reqwest::Client::new();
    let jobs = known_asset_paths()
        .into_iter()
        .map(|path| fetch_one(&client, urls, assets_dir, path));

    let fetched = try_join_all(jobs).await?.into_iter().filter(|f| *f).count();
    info!("Fetched {} asset(s) into {}", fetched, assets_dir.display());
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_assets_are_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        for path in known_asset_paths() {
            let dest = dir.path().join(path);
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(&dest, "cached").unwrap();
        }

        // An unreachable provider proves nothing goes over the network
        let mut urls = UrlBuilder::new();
        urls.set_provider("dead", "http://127.0.0.1:9/").unwrap();
        urls.activate("dead").unwrap();

        let fetched = fetch_assets(&urls, dir.path()).await.unwrap();
        assert_eq!(fetched, 0);
    }
}
