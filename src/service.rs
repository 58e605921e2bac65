use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::Service;
use tracing::info;

use crate::chrome::ChromeLauncher;
use crate::config::DownloaderConfig;
use crate::control::{CancelToken, ProgressEvent};
use crate::error::DownloaderError;
use crate::orchestrator::Orchestrator;
use crate::traits::SessionLauncher;
use crate::types::{BatchOutcome, BatchRequest, RunState};

/// Progress channel capacity for batches started with [`DownloaderService::start`].
pub const EVENT_BUFFER: usize = 256;

/// A batch running on its own task.
pub struct BatchHandle {
    pub cancel: CancelToken,
    pub events: mpsc::Receiver<ProgressEvent>,
    join: JoinHandle<Result<BatchOutcome, DownloaderError>>,
}

impl BatchHandle {
    /// Ask the batch to stop after the file in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the batch now without waiting for the file in flight.
    ///
    /// The run is dropped, which drops its browser session and leaves the
    /// service `Cancelled`. Returns once the batch task is gone.
    pub async fn abort(self) {
        self.join.abort();
        let _ = self.join.await;
    }

    pub async fn wait(self) -> Result<BatchOutcome, DownloaderError> {
        self.join
            .await
            .map_err(|e| DownloaderError::Worker(e.to_string()))?
    }
}

/// tower::Service running download batches through one orchestrator.
///
/// Requests made through `call` share the service's progress sender and use
/// the token from [`cancel_token`](Self::cancel_token). A cancelled token is
/// replaced once its run ends, so the next `call` starts clean. `start` gives
/// each batch its own token and channel.
pub struct DownloaderService<L> {
    orchestrator: Arc<Orchestrator<L>>,
    cancel: Arc<Mutex<CancelToken>>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl<L> Clone for DownloaderService<L> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            cancel: Arc::clone(&self.cancel),
            progress: self.progress.clone(),
        }
    }
}

impl DownloaderService<ChromeLauncher> {
    /// Service backed by a local Chrome/Chromium.
    pub fn new(config: DownloaderConfig) -> Self {
        Self::with_launcher(ChromeLauncher::new(), config)
    }
}

impl<L: SessionLauncher + 'static> DownloaderService<L> {
    pub fn with_launcher(launcher: L, config: DownloaderConfig) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(launcher, config)),
            cancel: Arc::new(Mutex::new(CancelToken::new())),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Token for the current `call`, or the next one when idle.
    pub fn cancel_token(&self) -> CancelToken {
        current_token(&self.cancel).clone()
    }

    pub fn state(&self) -> RunState {
        self.orchestrator.state()
    }

    /// Spawn a batch and return immediately.
    pub fn start(&self, request: BatchRequest) -> BatchHandle {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancelToken::new();
        let orchestrator = Arc::clone(&self.orchestrator);
        let token = cancel.clone();

        info!("Starting batch for {} years", request.years.len());
        let join = tokio::spawn(async move { orchestrator.run(request, &token, Some(tx)).await });

        BatchHandle {
            cancel,
            events: rx,
            join,
        }
    }
}

fn current_token(slot: &Mutex<CancelToken>) -> std::sync::MutexGuard<'_, CancelToken> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<L: SessionLauncher + 'static> Service<BatchRequest> for DownloaderService<L> {
    type Response = BatchOutcome;
    type Error = DownloaderError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // a running batch makes `call` fail with Busy rather than queue
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BatchRequest) -> Self::Future {
        info!(
            "Batch request received: years={:?} dest={:?}",
            req.years, req.destination_root
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let slot = Arc::clone(&self.cancel);
        let cancel = current_token(&slot).clone();
        let progress = self.progress.clone();

        Box::pin(async move {
            let result = orchestrator.run(req, &cancel, progress).await;
            if cancel.is_cancelled() {
                let mut current = current_token(&slot);
                if current.same_as(&cancel) {
                    *current = CancelToken::new();
                }
            }
            let outcome = result?;
            info!("Batch finished: {}", outcome.report.summary());
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_batch_request_builder() {
        let req = BatchRequest::new([2024, 2023], "/tmp/dl").with_headless(false);

        assert_eq!(req.years, vec![2024, 2023]);
        assert_eq!(req.destination_root, PathBuf::from("/tmp/dl"));
        assert!(!req.headless);
    }

    #[tokio::test]
    async fn test_service_starts_idle() {
        let service = DownloaderService::new(DownloaderConfig::default());
        assert_eq!(service.state(), RunState::Idle);
        assert!(!service.cancel_token().is_cancelled());
    }
}
