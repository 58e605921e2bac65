//! Scripted browser for integration tests.
//!
//! `MockLauncher` hands out sessions that serve a fixed set of year pages and
//! "download" by writing files into whatever directory the orchestrator last
//! pointed them at.

#![allow(dead_code)]

pub mod year_server;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brimr_downloader::{
    BrowserSession, CancelToken, DownloaderConfig, DownloaderError, LaunchOptions, RawLink,
    SessionLauncher, SourceRef,
};

pub const MOCK_TEMPLATE: &str = "http://mock.test/{year}/";

/// Short waits so failing paths finish quickly.
pub fn test_config() -> DownloaderConfig {
    DownloaderConfig::default()
        .with_url_template(MOCK_TEMPLATE)
        .with_page_timeout(Duration::from_millis(300))
        .with_download_timeout(Duration::from_millis(300))
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBehavior {
    Completes,
    /// Leaves a `.crdownload` behind forever
    NeverFinishes,
    TriggerFails,
}

#[derive(Debug, Clone)]
pub struct MockFile {
    /// File name as it appears in the link URL
    pub name: String,
    /// Set for click-only elements; the name the browser saves under
    pub button_text: Option<String>,
    pub body: Vec<u8>,
    pub behavior: FileBehavior,
}

impl MockFile {
    pub fn link(name: &str) -> Self {
        Self {
            name: name.to_string(),
            button_text: None,
            body: format!("xlsx:{}", name).into_bytes(),
            behavior: FileBehavior::Completes,
        }
    }

    pub fn button(text: &str, saved_as: &str) -> Self {
        Self {
            button_text: Some(text.to_string()),
            ..Self::link(saved_as)
        }
    }

    pub fn with_behavior(mut self, behavior: FileBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[derive(Debug, Clone)]
pub enum MockPage {
    Files(Vec<MockFile>),
    Unreachable,
    /// Navigation never completes
    Stalled,
}

#[derive(Debug, Default)]
pub struct MockSite {
    pages: HashMap<i32, MockPage>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, year: i32, files: Vec<MockFile>) -> Self {
        self.pages.insert(year, MockPage::Files(files));
        self
    }

    pub fn unreachable(mut self, year: i32) -> Self {
        self.pages.insert(year, MockPage::Unreachable);
        self
    }

    pub fn stalled(mut self, year: i32) -> Self {
        self.pages.insert(year, MockPage::Stalled);
        self
    }

    fn files(&self, year: i32) -> Vec<MockFile> {
        match self.pages.get(&year) {
            Some(MockPage::Files(files)) => files.clone(),
            _ => Vec::new(),
        }
    }
}

pub fn file_url(year: i32, name: &str) -> String {
    format!("http://mock.test/{}/files/{}", year, name.replace(' ', "%20"))
}

fn year_of(url: &str) -> Option<i32> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

#[derive(Debug, Default)]
pub struct Stats {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    /// Sessions dropped, with or without a shutdown
    pub drops: AtomicUsize,
    pub triggers: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

impl Stats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct MockLauncher {
    site: Arc<MockSite>,
    pub stats: Arc<Stats>,
    fail_launch: bool,
    cancel_on_trigger: Option<(usize, CancelToken)>,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            stats: Arc::new(Stats::default()),
            fail_launch: false,
            cancel_on_trigger: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(MockSite::new())
        }
    }

    /// Cancel `token` while the `n`th download (1-based) is in flight.
    pub fn cancel_on_trigger(mut self, n: usize, token: CancelToken) -> Self {
        self.cancel_on_trigger = Some((n, token));
        self
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserSession>, DownloaderError> {
        if self.fail_launch {
            return Err(DownloaderError::SessionUnavailable(
                "chrome executable not found".into(),
            ));
        }
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            site: Arc::clone(&self.site),
            stats: Arc::clone(&self.stats),
            cancel_on_trigger: self.cancel_on_trigger.clone(),
            year: Mutex::new(None),
            download_dir: Mutex::new(options.staging_dir.clone()),
        }))
    }
}

pub struct MockSession {
    site: Arc<MockSite>,
    stats: Arc<Stats>,
    cancel_on_trigger: Option<(usize, CancelToken)>,
    year: Mutex<Option<i32>>,
    download_dir: Mutex<PathBuf>,
}

impl MockSession {
    fn current_files(&self) -> Vec<MockFile> {
        match *self.year.lock().unwrap() {
            Some(year) => self.site.files(year),
            None => Vec::new(),
        }
    }

    fn find(&self, source: &SourceRef) -> Option<MockFile> {
        let year = (*self.year.lock().unwrap())?;
        let files = self.current_files();
        match source {
            SourceRef::Url(url) => files
                .into_iter()
                .find(|f| f.button_text.is_none() && file_url(year, &f.name) == *url),
            SourceRef::Element { index, .. } => files
                .into_iter()
                .filter(|f| f.button_text.is_some())
                .nth(*index),
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.stats.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> Result<(), DownloaderError> {
        self.stats.navigations.lock().unwrap().push(url.to_string());
        let year = year_of(url).ok_or_else(|| DownloaderError::PageLoad(url.to_string()))?;
        match self.site.pages.get(&year) {
            Some(MockPage::Unreachable) => {
                *self.year.lock().unwrap() = None;
                return Err(DownloaderError::PageLoad(format!("{}: connection refused", url)));
            }
            Some(MockPage::Stalled) => {
                *self.year.lock().unwrap() = None;
                std::future::pending::<()>().await;
            }
            _ => {}
        }
        *self.year.lock().unwrap() = Some(year);
        Ok(())
    }

    async fn scan_links(
        &self,
        _link_selector: &str,
        _button_selector: &str,
    ) -> Result<Vec<RawLink>, DownloaderError> {
        let year = match *self.year.lock().unwrap() {
            Some(year) => year,
            None => return Ok(Vec::new()),
        };
        let mut buttons = 0;
        Ok(self
            .current_files()
            .into_iter()
            .map(|f| match &f.button_text {
                Some(text) => {
                    buttons += 1;
                    RawLink::button(text.clone(), buttons - 1)
                }
                None => RawLink::link(f.name.clone(), file_url(year, &f.name)),
            })
            .collect())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), DownloaderError> {
        std::fs::create_dir_all(dir)?;
        *self.download_dir.lock().unwrap() = dir.to_path_buf();
        Ok(())
    }

    async fn trigger_download(&self, source: &SourceRef) -> Result<(), DownloaderError> {
        let count = self.stats.triggers.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_on_trigger {
            if count == *n {
                token.cancel();
            }
        }

        let file = self
            .find(source)
            .ok_or_else(|| DownloaderError::Trigger(format!("no such file: {:?}", source)))?;
        let dir = self.download_dir.lock().unwrap().clone();

        match file.behavior {
            FileBehavior::Completes => std::fs::write(dir.join(&file.name), &file.body)?,
            FileBehavior::NeverFinishes => {
                std::fs::write(dir.join(format!("{}.crdownload", file.name)), b"partial")?
            }
            FileBehavior::TriggerFails => {
                return Err(DownloaderError::Trigger("click intercepted".into()))
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DownloaderError> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every file under `root`, relative, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    let mut out = Vec::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out.sort();
    out
}
