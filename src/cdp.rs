//! Chrome DevTools Protocol capture backend
//!
//! A [`BrowserSession`] owns one headless Chrome process and one tab for the
//! duration of a single export. Dropping the session terminates the browser,
//! so every exit path out of [`capture`] releases it.

use crate::format::ExportFormat;
use crate::probe::{self, Dimensions, LoadState, SvgReply};
use crate::{Error, ExportConfig, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::{Bounds, PrintToPdfOptions};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// How long the resource count must stay unchanged to call the network idle
const NETWORK_IDLE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chrome flags for running in containers and other constrained hosts
pub fn launch_flags() -> Vec<&'static str> {
    let mut flags = vec![
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-accelerated-2d-canvas",
        "--disable-gpu",
        "--no-first-run",
        "--no-zygote",
    ];
    // Chrome on Windows refuses to start in single-process mode
    if !cfg!(windows) {
        flags.push("--single-process");
    }
    flags
}

/// Print settings for a single page exactly the size of `dims`
pub fn pdf_options(dims: Dimensions) -> PrintToPdfOptions {
    let (width, height) = dims.paper_inches();
    PrintToPdfOptions {
        landscape: Some(false),
        print_background: Some(true),
        scale: Some(1.0),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(0.0),
        margin_bottom: Some(0.0),
        margin_left: Some(0.0),
        margin_right: Some(0.0),
        prefer_css_page_size: Some(false),
        ..Default::default()
    }
}

/// Run `job` on its own thread and give up after `timeout`.
///
/// Single CDP calls are only bounded by the transport, so budgets shorter
/// than that are enforced here. An abandoned job keeps running until the
/// browser it talks to is closed.
pub fn run_with_deadline<T, F>(timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(job());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout.as_millis() as u64)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::Other("Browser call ended without a result".into()))
        }
    }
}

/// One launched browser plus the tab the export drives
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Launch headless Chrome and open a tab.
    pub fn launch(config: &ExportConfig) -> Result<Self> {
        let flags: Vec<&OsStr> = launch_flags().into_iter().map(OsStr::new).collect();

        // The browser is reaped after this much silence; keep it above every wait budget
        let idle = Duration::from_millis(
            config
                .load_timeout_ms
                .max(config.pdf_timeout_ms)
                .max(config.selector_timeout_ms),
        ) + Duration::from_secs(30);

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(config.chrome_path.clone())
            .args(flags)
            .idle_browser_timeout(idle)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        debug!("Browser session started");
        Ok(Self { browser, tab })
    }

    /// Run `script` in the page and decode its JSON reply.
    fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<Option<T>> {
        let remote = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;
        probe::parse_reply(remote.value)
    }

    /// Replace the tab's document with `html` and wait for the load event
    /// and a quiet network.
    pub fn load_html(&self, html: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);

        self.tab
            .navigate_to("about:blank")
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        let tree = self
            .tab
            .call_method(Page::GetFrameTree(None))
            .map_err(|e| Error::LoadError(format!("Failed to get frame tree: {}", e)))?;

        self.tab
            .call_method(Page::SetDocumentContent {
                frame_id: tree.frame_tree.frame.id,
                html: html.to_string(),
            })
            .map_err(|e| Error::LoadError(format!("Failed to set document content: {}", e)))?;

        self.wait_for_network_idle(timeout)
    }

    fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            if let Some(state) = self.eval_json::<LoadState>(probe::LOAD_STATE_SCRIPT)? {
                if last_count != Some(state.resources) {
                    last_count = Some(state.resources);
                    quiet_since = Instant::now();
                }
                if state.ready && quiet_since.elapsed() >= NETWORK_IDLE {
                    debug!("Page loaded with {} subresource(s)", state.resources);
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(timeout.as_millis() as u64));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Block until `selector` matches an element.
    pub fn wait_for_diagram(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| Error::RenderError(format!("Diagram failed to render: {}", e)))?;
        Ok(())
    }

    /// Normalize page styling and measure the diagram root.
    pub fn probe_dimensions(&self, selector: &str) -> Result<Dimensions> {
        self.eval_json::<Dimensions>(&probe::dimensions_script(selector))?
            .ok_or_else(|| Error::RenderError("Failed to get diagram dimensions".into()))
    }

    /// Resize the window so the viewport matches `dims`.
    pub fn set_viewport(&self, dims: Dimensions) -> Result<()> {
        self.tab
            .set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(dims.width as f64),
                height: Some(dims.height as f64),
            })
            .map_err(|e| Error::RenderError(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    /// Serialize the diagram root as a standalone SVG document.
    pub fn capture_svg(&self, selector: &str) -> Result<String> {
        let reply = self
            .eval_json::<SvgReply>(&probe::svg_script(selector))?
            .ok_or_else(|| Error::RenderError("Failed to generate vector content".into()))?;

        for w in &reply.warnings {
            warn!("{}", w);
        }
        if reply.svg.trim().is_empty() {
            return Err(Error::RenderError("Failed to generate vector content".into()));
        }
        Ok(reply.svg)
    }

    /// Paint an opaque white background and take a full-page screenshot.
    pub fn capture_png(&self, selector: &str, scale: f64) -> Result<Vec<u8>> {
        self.eval_json::<serde_json::Value>(&probe::opaque_background_script(selector))?;

        let page = self
            .eval_json::<Dimensions>(probe::PAGE_SIZE_SCRIPT)?
            .ok_or_else(|| Error::RenderError("Failed to measure page".into()))?;

        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: page.width as f64,
            height: page.height as f64,
            scale,
        };

        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
    }

    /// Print a single page sized to `dims`, failing with [`Error::Timeout`]
    /// once `timeout` passes.
    pub fn capture_pdf(&self, dims: Dimensions, timeout: Duration) -> Result<Vec<u8>> {
        let tab = Arc::clone(&self.tab);
        let options = pdf_options(dims);
        run_with_deadline(timeout, move || {
            tab.print_to_pdf(Some(options))
                .map_err(|e| Error::RenderError(format!("PDF generation failed: {}", e)))
        })
    }

    /// Close the browser. Dropping the session has the same effect.
    pub fn close(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // The Browser's own Drop kills the Chrome process
        debug!("Browser session released (pid {:?})", self.browser.get_process_id());
    }
}

/// Load `html` in a fresh browser and capture it as `format`.
///
/// Runs the whole sequence synchronously; the session is torn down before
/// this returns, whether capture succeeded or not.
pub fn capture(html: &str, format: ExportFormat, config: &ExportConfig) -> Result<Vec<u8>> {
    let selector = config.diagram_selector.as_str();
    let session = BrowserSession::launch(config)?;

    session.load_html(html, Duration::from_millis(config.load_timeout_ms))?;
    session.wait_for_diagram(selector, Duration::from_millis(config.selector_timeout_ms))?;

    let dims = session.probe_dimensions(selector)?;
    debug!("Diagram measured at {}x{}", dims.width, dims.height);
    session.set_viewport(dims)?;

    // Rendering inside the page finishes asynchronously after the root exists
    std::thread::sleep(Duration::from_millis(config.settle_delay_ms));

    let bytes = match format {
        ExportFormat::Svg => session.capture_svg(selector)?.into_bytes(),
        ExportFormat::Png => session.capture_png(selector, config.device_scale_factor)?,
        ExportFormat::Pdf => {
            session.capture_pdf(dims, Duration::from_millis(config.pdf_timeout_ms))?
        }
        ExportFormat::Html => {
            return Err(Error::Other("HTML output does not need a browser".into()));
        }
    };

    session.close()?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flags_disable_sandboxing() {
        let flags = launch_flags();
        assert!(flags.contains(&"--no-sandbox"));
        assert!(flags.contains(&"--disable-setuid-sandbox"));
        assert!(flags.contains(&"--disable-gpu"));
    }

    #[test]
    fn pdf_page_matches_dimensions() {
        let dims = Dimensions { width: 1234, height: 567 };
        let opts = pdf_options(dims);
        let w = opts.paper_width.unwrap() * probe::CSS_PX_PER_INCH;
        let h = opts.paper_height.unwrap() * probe::CSS_PX_PER_INCH;
        assert!((w - 1234.0).abs() < 1e-9);
        assert!((h - 567.0).abs() < 1e-9);
        assert_eq!(opts.print_background, Some(true));
        assert_eq!(opts.scale, Some(1.0));
        assert_eq!(opts.margin_top, Some(0.0));
        assert_eq!(opts.margin_left, Some(0.0));
    }

    #[test]
    fn stalled_call_times_out() {
        let started = Instant::now();
        let err = run_with_deadline(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn prompt_call_returns_its_result() {
        let bytes = run_with_deadline(Duration::from_secs(5), || Ok(vec![1u8, 2, 3])).unwrap();
        assert_eq!(bytes, [1, 2, 3]);

        let err = run_with_deadline::<(), _>(Duration::from_secs(5), || {
            Err(Error::RenderError("PDF generation failed: boom".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::RenderError(_)));
    }

    #[test]
    fn test_browser_session_launch() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        match BrowserSession::launch(&ExportConfig::default()) {
            Ok(session) => session.close().unwrap(),
            Err(e) => eprintln!(
                "Skipping browser session test because Chrome is not available or failed to launch: {}",
                e
            ),
        }
    }
}
