//! Orchestrator: years -> pages -> files, one browser session for the whole batch.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::classify::Classifier;
use crate::config::DownloaderConfig;
use crate::control::{CancelToken, ProgressEvent};
use crate::discover::PageDiscoverer;
use crate::error::DownloaderError;
use crate::executor::DownloadExecutor;
use crate::registry;
use crate::session::{SessionHandle, SessionManager};
use crate::traits::SessionLauncher;
use crate::types::{
    BatchOutcome, BatchReport, BatchRequest, ClassifiedFile, DownloadOutcome, OutcomeStatus,
    RunState, YearTarget,
};

/// Log target for the one-line-per-file attempt log.
pub const ATTEMPT_TARGET: &str = "brimr_downloader::attempt";

const WRITE_PROBE: &str = ".brimr_write_test";

fn log_attempt(outcome: &DownloadOutcome) {
    let year = outcome.descriptor.year;
    let label = outcome.descriptor.label.as_str();
    let detail = outcome.detail();
    match outcome.status {
        OutcomeStatus::Failed => warn!(
            target: ATTEMPT_TARGET,
            year,
            category = %outcome.category,
            label,
            outcome = %outcome.status,
            detail = %detail,
            "attempt"
        ),
        _ => info!(
            target: ATTEMPT_TARGET,
            year,
            category = %outcome.category,
            label,
            outcome = %outcome.status,
            detail = %detail,
            "attempt"
        ),
    }
}

/// Create the destination root and prove it accepts files.
fn prepare_root(root: &Path) -> Result<(), DownloaderError> {
    std::fs::create_dir_all(root).map_err(|e| DownloaderError::destination(root, e))?;
    let probe = root.join(WRITE_PROBE);
    std::fs::write(&probe, b"").map_err(|e| DownloaderError::destination(root, e))?;
    std::fs::remove_file(&probe).map_err(|e| DownloaderError::destination(root, e))?;
    Ok(())
}

struct Progress(Option<mpsc::Sender<ProgressEvent>>);

impl Progress {
    async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.0 {
            // a caller that stopped listening does not stop the batch
            let _ = tx.send(event).await;
        }
    }
}

/// Marks the orchestrator busy for the lifetime of one run.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    previous: RunState,
    finished: RunState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = self.finished;
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Orchestrator<L> {
    config: DownloaderConfig,
    sessions: SessionManager<L>,
    discoverer: PageDiscoverer,
    executor: DownloadExecutor,
    classifier: Classifier,
    state: Mutex<RunState>,
}

impl<L: SessionLauncher> Orchestrator<L> {
    pub fn new(launcher: L, config: DownloaderConfig) -> Self {
        Self {
            sessions: SessionManager::new(launcher, &config),
            discoverer: PageDiscoverer::new(&config),
            executor: DownloadExecutor::new(&config),
            classifier: config.classifier.clone(),
            config,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    fn begin(&self) -> Result<RunGuard<'_>, DownloaderError> {
        let mut state = lock(&self.state);
        if !state.can_transition_to(RunState::Running) {
            return Err(DownloaderError::Busy);
        }
        let previous = *state;
        *state = RunState::Running;
        Ok(RunGuard {
            state: &self.state,
            previous,
            // dropping the run future mid-way leaves the batch cancelled
            finished: RunState::Cancelled,
        })
    }

    /// Run one batch to a terminal state.
    ///
    /// Returns the report for `Completed` and `Cancelled` runs. Fatal problems
    /// (no browser, unusable destination) and invalid requests are returned as
    /// errors. The browser session is released on every path.
    pub async fn run(
        &self,
        request: BatchRequest,
        cancel: &CancelToken,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Result<BatchOutcome, DownloaderError> {
        let mut guard = self.begin()?;
        let progress = Progress(progress);

        if let Err(e) = request.validate() {
            guard.finished = guard.previous;
            return Err(e);
        }

        info!(
            "Batch started: years={:?} dest={:?} headless={}",
            request.years, request.destination_root, request.headless
        );

        match self.run_batch(&request, cancel, &progress).await {
            Ok(outcome) => {
                guard.finished = outcome.state;
                let totals = outcome.report.totals();
                info!("Batch {:?}: {}", outcome.state, outcome.report.summary());
                progress
                    .emit(ProgressEvent::Finished {
                        state: outcome.state,
                        totals,
                    })
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                guard.finished = RunState::Fatal;
                error!("Batch aborted: {}", e);
                progress
                    .emit(ProgressEvent::Finished {
                        state: RunState::Fatal,
                        totals: Default::default(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run_batch(
        &self,
        request: &BatchRequest,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> Result<BatchOutcome, DownloaderError> {
        let root = request.destination_root();
        prepare_root(root)?;

        progress.emit(ProgressEvent::SessionStarting).await;
        let mut handle = self.sessions.acquire(request.headless, root).await?;

        let result = self.process_years(&mut handle, request, cancel, progress).await;
        self.sessions.release(handle).await;
        result
    }

    async fn process_years(
        &self,
        handle: &mut SessionHandle,
        request: &BatchRequest,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> Result<BatchOutcome, DownloaderError> {
        let root = request.destination_root();
        let mut report = BatchReport::default();

        for &year in &request.years {
            if cancel.is_cancelled() {
                info!("Cancelled before {}", year);
                return Ok(BatchOutcome {
                    state: RunState::Cancelled,
                    report,
                });
            }

            let target = YearTarget::new(year, self.config.page_url(year));
            info!("Processing {}", year);

            let listing = match handle.prepare_year(year).await {
                Ok(()) => self.discoverer.discover(handle.session(), &target).await,
                Err(e) => Err(e),
            };

            let listing = match listing {
                Ok(listing) if listing.len() > 0 => listing,
                Ok(_) => {
                    report.mark_without_data(year);
                    progress
                        .emit(ProgressEvent::YearWithoutData {
                            year,
                            reason: "no files found".to_string(),
                        })
                        .await;
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}: {}", year, e);
                    report.mark_without_data(year);
                    progress
                        .emit(ProgressEvent::YearWithoutData {
                            year,
                            reason: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            let total = listing.len();
            progress
                .emit(ProgressEvent::YearStarted { year, files: total })
                .await;

            for (index, descriptor) in listing.enumerate() {
                if cancel.is_cancelled() {
                    info!("Cancelled during {}", year);
                    return Ok(BatchOutcome {
                        state: RunState::Cancelled,
                        report,
                    });
                }

                let category = self.classifier.classify(&descriptor.label);
                let file = ClassifiedFile {
                    descriptor,
                    category,
                };

                let outcome = if registry::already_present(root, year, category, &file.descriptor.label)
                {
                    let dest =
                        registry::destination_path(root, year, category, &file.descriptor.label);
                    info!("Exists: {}", file.descriptor.label);
                    DownloadOutcome::skipped(&file, dest)
                } else {
                    self.executor.execute(handle, &file, root).await
                };

                log_attempt(&outcome);
                report.record(year, outcome.status);

                progress
                    .emit(ProgressEvent::FileFinished {
                        year,
                        label: file.descriptor.label.clone(),
                        category,
                        status: outcome.status,
                        position: index + 1,
                        total,
                        totals: report.totals(),
                    })
                    .await;
            }
        }

        Ok(BatchOutcome {
            state: RunState::Completed,
            report,
        })
    }
}
