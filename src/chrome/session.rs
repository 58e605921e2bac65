use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DownloaderError;
use crate::traits::{BrowserSession, LaunchOptions, RawLink, SessionLauncher};
use crate::types::SourceRef;

const CLOSE_WAIT_SECS: u64 = 10;

/// Launches local Chrome/Chromium through chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DownloaderError> {
        let session = ChromeSession::launch(options).await?;
        Ok(Box::new(session))
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    user_data_dir: PathBuf,
}

impl ChromeSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, DownloaderError> {
        info!("Starting browser (headless={})...", options.headless);

        // unique profile per session so parallel test runs never share state
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("brimr-chrome-{}", unique_id));

        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(width, height);

        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        if !options.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        let config = builder
            .build()
            .map_err(|e| DownloaderError::SessionUnavailable(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DownloaderError::SessionUnavailable(e.to_string()))?;

        // the handler must be polled for the CDP connection to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {:?}", e);
                }
            }
        });

        let mut session = Self {
            browser: Some(browser),
            page: None,
            handler: Some(handler),
            user_data_dir,
        };

        if let Err(e) = session.open_page(&options.staging_dir).await {
            let _ = session.shutdown().await;
            return Err(DownloaderError::SessionUnavailable(e.to_string()));
        }

        info!("Browser ready");
        Ok(session)
    }

    async fn open_page(&mut self, staging_dir: &Path) -> Result<(), DownloaderError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| DownloaderError::SessionUnavailable("browser not running".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DownloaderError::SessionUnavailable(e.to_string()))?;
        self.page = Some(page);

        self.set_download_dir(staging_dir).await
    }

    fn get_page(&self) -> Result<&Page, DownloaderError> {
        self.page
            .as_ref()
            .ok_or_else(|| DownloaderError::SessionUnavailable("browser not initialized".into()))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool, DownloaderError> {
        self.get_page()?
            .evaluate(script)
            .await
            .map_err(|e| DownloaderError::JavaScript(e.to_string()))?
            .into_value::<bool>()
            .map_err(|e| DownloaderError::JavaScript(e.to_string()))
    }
}

/// JSON string literal, safe to splice into a script.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn scan_script(link_selector: &str, button_selector: &str) -> String {
    format!(
        r#"
        (function(linkSel, buttonSel) {{
            var query = buttonSel ? linkSel + ', ' + buttonSel : linkSel;
            var buttons = buttonSel ? document.querySelectorAll(buttonSel) : [];
            var out = [];
            document.querySelectorAll(query).forEach(function(el) {{
                var text = (el.textContent || '').trim();
                if (el.matches(linkSel)) {{
                    out.push({{ text: text, href: el.href }});
                }} else {{
                    out.push({{ text: text, button_index: Array.prototype.indexOf.call(buttons, el) }});
                }}
            }});
            return out;
        }})({}, {})
        "#,
        js_str(link_selector),
        js_str(button_selector)
    )
}

fn trigger_script(source: &SourceRef) -> String {
    match source {
        // a synthetic anchor keeps the request inside the page's own cookies and origin
        SourceRef::Url(url) => format!(
            r#"
            (function(url) {{
                var a = document.createElement('a');
                a.href = url;
                a.setAttribute('download', '');
                a.style.display = 'none';
                document.body.appendChild(a);
                a.click();
                a.remove();
                return true;
            }})({})
            "#,
            js_str(url)
        ),
        SourceRef::Element { selector, index } => format!(
            r#"
            (function(sel, i) {{
                var els = document.querySelectorAll(sel);
                if (i >= els.length) {{
                    return false;
                }}
                els[i].click();
                return true;
            }})({}, {})
            "#,
            js_str(selector),
            index
        ),
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError> {
        debug!("Navigating to {}", url);
        self.get_page()?
            .goto(url)
            .await
            .map_err(|e| DownloaderError::PageLoad(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn scan_links(
        &self,
        link_selector: &str,
        button_selector: &str,
    ) -> Result<Vec<RawLink>, DownloaderError> {
        let script = scan_script(link_selector, button_selector);
        self.get_page()?
            .evaluate(script.as_str())
            .await
            .map_err(|e| DownloaderError::JavaScript(e.to_string()))?
            .into_value::<Vec<RawLink>>()
            .map_err(|e| DownloaderError::JavaScript(e.to_string()))
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), DownloaderError> {
        std::fs::create_dir_all(dir)?;
        let download_path = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_path.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| DownloaderError::SessionUnavailable(format!("download behavior: {}", e)))?;

        self.get_page()?
            .execute(params)
            .await
            .map_err(|e| DownloaderError::SessionUnavailable(format!("download behavior: {}", e)))?;

        debug!("Download directory set to {:?}", download_path);
        Ok(())
    }

    async fn trigger_download(&self, source: &SourceRef) -> Result<(), DownloaderError> {
        let started = self
            .eval_bool(&trigger_script(source))
            .await
            .map_err(|e| DownloaderError::Trigger(e.to_string()))?;

        if !started {
            return Err(DownloaderError::Trigger(format!("element not found: {:?}", source)));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DownloaderError> {
        info!("Closing browser...");

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            let exited = match browser.close().await {
                Ok(_) => matches!(
                    tokio::time::timeout(Duration::from_secs(CLOSE_WAIT_SECS), browser.wait()).await,
                    Ok(Ok(_))
                ),
                Err(e) => {
                    warn!("Browser close failed: {}", e);
                    false
                }
            };

            if !exited {
                warn!("Browser did not exit cleanly, killing process");
                if let Some(Err(e)) = browser.kill().await {
                    warn!("Failed to kill browser: {}", e);
                }
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Failed to remove profile {:?}: {}", self.user_data_dir, e);
        }

        info!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // chromiumoxide launches Chrome with kill_on_drop, so dropping the
        // Browser ends the process; only the CDP handler task is ours to stop.
        if self.browser.is_some() {
            warn!("Browser session dropped without shutdown, killing process");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
