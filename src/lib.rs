//! BRIMR spreadsheet downloader
//!
//! - Detects which ranking years have a page on brimr.org
//! - Drives one Chrome session across the selected year pages
//! - Sorts every spreadsheet into `<root>/<year>/<NN>_<Category>/`
//!
//! # Usage
//!
//! ```rust,ignore
//! use brimr_downloader::{BatchRequest, DownloaderConfig, DownloaderService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = DownloaderService::new(DownloaderConfig::default());
//!
//!     let request = BatchRequest::new([2024, 2023], "./BRIMR_Data")
//!         .with_headless(true);
//!
//!     let outcome = service.call(request).await.unwrap();
//!     println!("{}", outcome.report.summary());
//! }
//! ```
//!
//! # Progress and cancellation
//!
//! ```rust,ignore
//! use brimr_downloader::{BatchRequest, DownloaderConfig, DownloaderService, ProgressEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = DownloaderService::new(DownloaderConfig::default());
//!     let mut batch = service.start(BatchRequest::new([2022], "./BRIMR_Data"));
//!
//!     while let Some(event) = batch.events.recv().await {
//!         if let ProgressEvent::FileFinished { label, status, .. } = event {
//!             println!("{label}: {status}");
//!         }
//!     }
//!     let outcome = batch.wait().await.unwrap();
//!     println!("{:?}", outcome.state);
//! }
//! ```

pub mod chrome;
pub mod classify;
pub mod config;
pub mod control;
pub mod discover;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod session;
pub mod traits;
pub mod types;
pub mod wait;
pub mod years;

// main types
pub use chrome::{ChromeLauncher, ChromeSession};
pub use classify::{classify, Category, Classifier, MatchForm, Rule};
pub use config::DownloaderConfig;
pub use control::{CancelToken, ProgressEvent};
pub use error::DownloaderError;
pub use orchestrator::Orchestrator;
pub use service::{BatchHandle, DownloaderService};
pub use traits::{BrowserSession, LaunchOptions, RawLink, SessionLauncher};
pub use types::{
    BatchOutcome, BatchReport, BatchRequest, DownloadOutcome, FileDescriptor, OutcomeStatus,
    RunState, SourceRef, YearTally, YearTarget,
};
pub use years::YearIndex;
