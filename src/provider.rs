//! Asset provider selection and URL construction.
//!
//! A [`UrlBuilder`] maps framework-relative npm paths (for example
//! `d3@7.9.0/dist/d3.min.js`) to loadable URLs through the active provider.
//! It is an explicit value owned by the caller; two exports with different
//! provider choices simply use two builders.

use crate::{Error, Result};
use futures::future::{self, FutureExt};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Prefix marking a reference as served from the local asset directory
pub const LOCAL_ASSETS_PREFIX: &str = "/assets/";

pub const DEFAULT_PROVIDER: &str = "jsdelivr";
const DEFAULT_PROVIDER_BASE: &str = "https://cdn.jsdelivr.net/npm/";
pub const LOCAL_PROVIDER: &str = "local";

/// Small file every CDN mirrors; fetched to measure provider latency.
const PROBE_PATH: &str = "npm2url/dist/index.cjs";

/// How the active provider is chosen before a transform
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStrategy {
    /// Serve everything from the local asset directory
    Local,
    /// Use a named provider without probing
    Fixed(String),
    /// Race all remote providers and keep the first to answer
    Fastest { timeout: Duration },
}

/// Provider table plus the currently active provider
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    providers: BTreeMap<String, String>,
    active: String,
}

impl Default for UrlBuilder {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(DEFAULT_PROVIDER.to_string(), DEFAULT_PROVIDER_BASE.to_string());
        providers.insert("unpkg".to_string(), "https://unpkg.com/".to_string());
        Self {
            providers,
            active: DEFAULT_PROVIDER.to_string(),
        }
    }
}

impl UrlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder holding exactly `providers`, in place of the built-in CDNs.
    /// The first entry becomes active.
    pub fn with_providers<'a, I>(providers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut urls = Self {
            providers: BTreeMap::new(),
            active: String::new(),
        };
        for (name, base) in providers {
            urls.set_provider(name, base)?;
            if urls.active.is_empty() {
                urls.active = name.to_string();
            }
        }
        if urls.active.is_empty() {
            return Err(Error::ConfigError("At least one provider is required".into()));
        }
        Ok(urls)
    }

    /// Name of the provider `full_url` currently resolves through
    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Register a provider under `name`. `base` is either an absolute URL or a
    /// path prefix starting with `/`.
    pub fn set_provider(&mut self, name: &str, base: &str) -> Result<()> {
        if !base.starts_with('/') {
            Url::parse(base).map_err(|e| {
                Error::ConfigError(format!("Invalid base URL for provider '{}': {}", name, e))
            })?;
        }
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.providers.insert(name.to_string(), base);
        Ok(())
    }

    /// Make `name` the active provider; it must already be registered.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        if !self.providers.contains_key(name) {
            return Err(Error::ProviderError(format!("Unknown provider '{}'", name)));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// Register and activate the local provider.
    pub fn use_local(&mut self) {
        self.providers
            .insert(LOCAL_PROVIDER.to_string(), LOCAL_ASSETS_PREFIX.to_string());
        self.active = LOCAL_PROVIDER.to_string();
    }

    /// Build a URL for `path` through the active provider. Absolute URLs and
    /// protocol-relative references are returned unchanged.
    pub fn full_url(&self, path: &str) -> String {
        if path.starts_with("//") || Url::parse(path).is_ok() {
            return path.to_string();
        }
        self.url_with(&self.active, path)
            .unwrap_or_else(|| path.to_string())
    }

    fn url_with(&self, provider: &str, path: &str) -> Option<String> {
        self.providers
            .get(provider)
            .map(|base| format!("{}{}", base, path.trim_start_matches('/')))
    }

    /// Probe every remote provider concurrently and return the name of the
    /// first one that serves the probe file successfully within `timeout`.
    pub async fn find_fastest_provider(&self, timeout: Duration) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ProviderError(format!("Failed to build HTTP client: {}", e)))?;

        let probes: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, base)| !base.starts_with('/'))
            .filter_map(|(name, _)| {
                let url = self.url_with(name, PROBE_PATH)?;
                let client = client.clone();
                let name = name.clone();
                Some(
                    async move {
                        let res = client
                            .get(&url)
                            .send()
                            .await
                            .map_err(|e| format!("{}: {}", name, e))?;
                        if !res.status().is_success() {
                            return Err(format!("{}: HTTP {}", name, res.status()));
                        }
                        debug!("Provider {} answered probe", name);
                        Ok::<_, String>(name)
                    }
                    .boxed(),
                )
            })
            .collect();

        if probes.is_empty() {
            return Err(Error::ProviderError("No remote providers registered".into()));
        }

        match tokio::time::timeout(timeout, future::select_ok(probes)).await {
            Ok(Ok((name, _rest))) => Ok(name),
            Ok(Err(e)) => Err(Error::ProviderError(format!("All providers failed, last error: {}", e))),
            Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Select the active provider according to `strategy`.
    ///
    /// Failures never escape: an unreachable or unknown provider leaves the
    /// default provider active and logs a warning.
    pub async fn resolve(&mut self, strategy: &ProviderStrategy) {
        match strategy {
            ProviderStrategy::Local => self.use_local(),
            ProviderStrategy::Fixed(name) => {
                if let Err(e) = self.activate(name) {
                    warn!("{}, using default provider '{}'", e, DEFAULT_PROVIDER);
                    self.use_default();
                }
            }
            ProviderStrategy::Fastest { timeout } => match self.find_fastest_provider(*timeout).await {
                Ok(name) => self.active = name,
                Err(e) => {
                    warn!("Failed to find fastest provider ({}), using default '{}'", e, DEFAULT_PROVIDER);
                    self.use_default();
                }
            },
        }
        debug!("Active asset provider: {}", self.active);
    }

    fn use_default(&mut self) {
        self.providers
            .entry(DEFAULT_PROVIDER.to_string())
            .or_insert_with(|| DEFAULT_PROVIDER_BASE.to_string());
        self.active = DEFAULT_PROVIDER.to_string();
    }
}
