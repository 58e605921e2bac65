use std::path::PathBuf;
use std::time::Duration;

use crate::classify::Classifier;

pub const BASE_URL_TEMPLATE: &str = "https://brimr.org/brimr-rankings-of-nih-funding-in-{year}/";

/// Elements that start a download without exposing a spreadsheet URL.
pub const DEFAULT_BUTTON_SELECTOR: &str = "[data-download], button[download]";

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Year page URL; `{year}` is substituted.
    pub url_template: String,
    pub page_timeout: Duration,
    pub page_poll_interval: Duration,
    pub download_timeout: Duration,
    pub download_poll_interval: Duration,
    /// Consecutive identical observations before a page or file counts as settled.
    pub stable_polls: u32,
    /// Staging folder created under the destination root.
    pub staging_dir_name: String,
    pub chrome_executable: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub button_selector: String,
    pub classifier: Classifier,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            url_template: BASE_URL_TEMPLATE.to_string(),
            page_timeout: Duration::from_secs(15),
            page_poll_interval: Duration::from_millis(500),
            download_timeout: Duration::from_secs(90),
            download_poll_interval: Duration::from_millis(300),
            stable_polls: 2,
            staging_dir_name: "_temp_downloads".to_string(),
            chrome_executable: std::env::var_os("CHROME_PATH")
                .or_else(|| std::env::var_os("CHROMIUM_PATH"))
                .map(PathBuf::from),
            window_size: (1200, 800),
            button_selector: DEFAULT_BUTTON_SELECTOR.to_string(),
            classifier: Classifier::default(),
        }
    }
}

impl DownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_poll_intervals(mut self, page: Duration, download: Duration) -> Self {
        self.page_poll_interval = page;
        self.download_poll_interval = download;
        self
    }

    pub fn with_chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn with_button_selector(mut self, selector: impl Into<String>) -> Self {
        self.button_selector = selector.into();
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn page_url(&self, year: i32) -> String {
        self.url_template.replace("{year}", &year.to_string())
    }
}
