use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DownloaderError;
use crate::types::SourceRef;

/// Download marker found on a page, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    /// Visible text of the element
    #[serde(default)]
    pub text: String,
    /// Absolute URL for spreadsheet links
    #[serde(default)]
    pub href: Option<String>,
    /// Position among elements matching the button selector (only set when `href` is absent)
    #[serde(default)]
    pub button_index: Option<usize>,
}

impl RawLink {
    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
            button_index: None,
        }
    }

    pub fn button(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            href: None,
            button_index: Some(index),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Where the browser drops downloads until a year redirects it
    pub staging_dir: PathBuf,
    pub chrome_executable: Option<PathBuf>,
    pub window_size: (u32, u32),
}

/// One running browser with a single page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and wait for the navigation to finish
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError>;

    /// Collect download markers currently present on the page
    async fn scan_links(
        &self,
        link_selector: &str,
        button_selector: &str,
    ) -> Result<Vec<RawLink>, DownloaderError>;

    /// Redirect future downloads into `dir` without prompting
    async fn set_download_dir(&self, dir: &Path) -> Result<(), DownloaderError>;

    /// Start one download; does not wait for it to finish
    async fn trigger_download(&self, source: &SourceRef) -> Result<(), DownloaderError>;

    /// Terminate the browser process
    async fn shutdown(&mut self) -> Result<(), DownloaderError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start exactly one browser. Failures map to `SessionUnavailable`.
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DownloaderError>;
}
