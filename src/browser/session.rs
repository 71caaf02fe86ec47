use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::env_nonempty;
use crate::error::{InvoiceError, Result};

/// One automated browser context spanning login through download.
///
/// Single-use: launched once per run and released exactly once via
/// [`BrowserSession::close`], on success and failure paths alike. The
/// `Drop` impl only aborts the CDP event drain as a backstop.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    /// Launch the browser with one page, accepting downloads into
    /// `download_dir`. Failure here is an environment problem and is
    /// fatal; no diagnostics are possible yet.
    pub async fn launch(headless: bool, download_dir: &Path) -> Result<Self> {
        debug!(target = "invoice", headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .window_size(1280, 720)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if let Some(chrome) = env_nonempty("CHROME") {
            builder = builder.chrome_executable(chrome);
        }
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(InvoiceError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| InvoiceError::BrowserLaunch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser.new_page("about:blank").await?;
        browser
            .execute(
                SetDownloadBehaviorParams::builder()
                    .behavior(SetDownloadBehaviorBehavior::Allow)
                    .download_path(download_dir.display().to_string())
                    .build()
                    .map_err(InvoiceError::BrowserLaunch)?,
            )
            .await?;

        Ok(Self { browser, handler_task, page })
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!(target = "invoice", %url, "navigating");
        self.page.goto(url).await.map_err(|source| InvoiceError::Navigation {
            url: url.to_string(),
            source,
        })?;
        // The portal is a dynamic application; the load event may fire
        // before it is usable. Callers add their own settling pauses.
        self.page.wait_for_navigation().await.ok();
        Ok(())
    }

    /// Current page location, or an empty string when unknown.
    pub async fn url(&self) -> String {
        self.page.url().await.ok().flatten().unwrap_or_default()
    }

    pub async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await?;
        Ok(())
    }

    /// Best-effort screenshot for failure diagnostics. A failed capture
    /// must not mask the error that triggered it, so this only warns.
    pub async fn try_screenshot(&self, path: &Path) {
        match self.screenshot(path).await {
            Ok(()) => warn!(target = "invoice", path = %path.display(), "error screenshot saved"),
            Err(err) => warn!(
                target = "invoice",
                error = %err,
                path = %path.display(),
                "failed to capture error screenshot"
            ),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(target = "invoice", error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        debug!(target = "invoice", "browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
