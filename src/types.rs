//! Batch data model

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::Category;
use crate::error::DownloaderError;

/// One year's listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearTarget {
    pub year: i32,
    pub page_url: String,
}

impl YearTarget {
    pub fn new(year: i32, page_url: impl Into<String>) -> Self {
        Self {
            year,
            page_url: page_url.into(),
        }
    }
}

/// How a file's download is started in the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    /// Resolvable link, fetched through the session's own network context.
    Url(String),
    /// Clickable element: `document.querySelectorAll(selector)[index]`.
    Element { selector: String, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Normalized file name (or element text when there is no URL).
    pub label: String,
    pub source: SourceRef,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub descriptor: FileDescriptor,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Downloaded,
    SkippedExisting,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeStatus::Downloaded => "downloaded",
            OutcomeStatus::SkippedExisting => "exists",
            OutcomeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub descriptor: FileDescriptor,
    pub category: Category,
    pub status: OutcomeStatus,
    pub destination: Option<PathBuf>,
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub fn downloaded(file: &ClassifiedFile, destination: PathBuf) -> Self {
        Self {
            descriptor: file.descriptor.clone(),
            category: file.category,
            status: OutcomeStatus::Downloaded,
            destination: Some(destination),
            error: None,
        }
    }

    pub fn skipped(file: &ClassifiedFile, destination: PathBuf) -> Self {
        Self {
            descriptor: file.descriptor.clone(),
            category: file.category,
            status: OutcomeStatus::SkippedExisting,
            destination: Some(destination),
            error: None,
        }
    }

    pub fn failed(file: &ClassifiedFile, error: &DownloaderError) -> Self {
        Self {
            descriptor: file.descriptor.clone(),
            category: file.category,
            status: OutcomeStatus::Failed,
            destination: None,
            error: Some(error.to_string()),
        }
    }

    /// Destination path or error text, whichever applies.
    pub fn detail(&self) -> String {
        match (&self.destination, &self.error) {
            (_, Some(err)) => err.clone(),
            (Some(path), None) => path.display().to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearTally {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl YearTally {
    pub fn record(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Downloaded => self.downloaded += 1,
            OutcomeStatus::SkippedExisting => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }

    fn add(&mut self, other: &YearTally) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub per_year: BTreeMap<i32, YearTally>,
    pub years_without_data: BTreeSet<i32>,
}

impl BatchReport {
    pub fn record(&mut self, year: i32, status: OutcomeStatus) {
        self.per_year.entry(year).or_default().record(status);
    }

    pub fn mark_without_data(&mut self, year: i32) {
        self.years_without_data.insert(year);
    }

    pub fn totals(&self) -> YearTally {
        let mut totals = YearTally::default();
        for tally in self.per_year.values() {
            totals.add(tally);
        }
        totals
    }

    /// Years that had files but lost at least one of them.
    pub fn years_with_failures(&self) -> BTreeSet<i32> {
        self.per_year
            .iter()
            .filter(|(_, t)| t.failed > 0)
            .map(|(year, _)| *year)
            .collect()
    }

    pub fn summary(&self) -> String {
        let totals = self.totals();
        format!(
            "Downloaded: {} | Existed: {} | Failed: {} | Years without data: {}",
            totals.downloaded,
            totals.skipped,
            totals.failed,
            self.years_without_data.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub years: Vec<i32>,
    pub destination_root: PathBuf,
    pub headless: bool,
}

impl BatchRequest {
    pub fn new<I>(years: I, destination_root: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let mut ordered = Vec::new();
        for year in years {
            if !ordered.contains(&year) {
                ordered.push(year);
            }
        }
        Self {
            years: ordered,
            destination_root: destination_root.into(),
            headless: true,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn validate(&self) -> Result<(), DownloaderError> {
        if self.years.is_empty() {
            return Err(DownloaderError::InvalidRequest("no years selected".into()));
        }
        if self.destination_root.as_os_str().is_empty() {
            return Err(DownloaderError::InvalidRequest("destination root is empty".into()));
        }
        Ok(())
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Fatal,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Fatal)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Running, RunState::Running) => false,
            (_, RunState::Running) => true,
            (RunState::Running, n) => n.is_terminal(),
            (s, RunState::Idle) => s.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// `Completed` or `Cancelled`; fatal runs surface as errors instead.
    pub state: RunState,
    pub report: BatchReport,
}
