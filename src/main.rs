use anyhow::Context;
use clap::Parser;
use mapshot::{ExportConfig, RenderOptions};
use std::path::PathBuf;

/// Create a mind map from a Markdown input file
#[derive(Parser, Debug)]
#[command(name = "mapshot", version, about)]
struct Cli {
    /// Markdown file to convert
    input: PathBuf,

    /// Output file; .html, .svg, .png or .pdf (defaults to <input>.html)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not open the output file after generation
    #[arg(long)]
    no_open: bool,

    /// Do not show the toolbar
    #[arg(long)]
    no_toolbar: bool,

    /// Inline all assets so the generated file works offline
    #[arg(long)]
    offline: bool,

    /// Download framework assets into the local asset directory first
    /// (always done for --offline)
    #[arg(long)]
    fetch_assets: bool,

    /// Local asset directory used by --offline
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Use this CDN provider instead of probing for the fastest
    #[arg(long)]
    provider: Option<String>,

    /// Path to the Chrome/Chromium executable
    #[arg(long)]
    chrome: Option<PathBuf>,
}

impl Cli {
    /// Offline pages read every asset from the local cache, so it is filled
    /// first; already cached files are skipped.
    fn needs_asset_fetch(&self) -> bool {
        self.offline || self.fetch_assets
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ExportConfig {
        provider: cli.provider.clone(),
        chrome_path: cli.chrome.clone(),
        ..Default::default()
    };
    if let Some(dir) = cli.assets_dir.clone() {
        config.assets_dir = dir;
    }

    if cli.needs_asset_fetch() {
        let mut urls = config.url_builder()?;
        urls.resolve(&config.provider_strategy(false)).await;
        mapshot::fetch_assets(&urls, &config.assets_dir)
            .await
            .context("Failed to fetch assets")?;
    }

    let content = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let output = cli.output.unwrap_or_else(|| cli.input.with_extension("html"));

    let options = RenderOptions {
        content,
        output: Some(output),
        open: !cli.no_open,
        toolbar: !cli.no_toolbar,
        offline: cli.offline,
    };

    mapshot::export(&options, &config).await?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("An error occurred: {:#}", e);
        std::process::exit(1);
    }
}
