use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("browser session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("destination not writable: {path:?}: {message}")]
    DestinationUnavailable { path: PathBuf, message: String },

    #[error("invalid batch request: {0}")]
    InvalidRequest(String),

    #[error("a batch is already running")]
    Busy,

    #[error("page failed to load: {0}")]
    PageLoad(String),

    #[error("timeout: {0}")]
    PageTimeout(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("download trigger failed: {0}")]
    Trigger(String),

    #[error("download did not complete within {0}s")]
    DownloadTimeout(u64),

    #[error("could not move {from:?} to {to:?}: {source}")]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("classifier rules: {0}")]
    Rules(String),

    #[error("year probe failed: {0}")]
    Probe(String),

    #[error("batch task failed: {0}")]
    Worker(String),

    #[error("file I/O error: {0}")]
    FileIO(#[from] std::io::Error),
}

impl DownloaderError {
    /// Errors that abort the whole batch instead of a single year or file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloaderError::SessionUnavailable(_) | DownloaderError::DestinationUnavailable { .. }
        )
    }

    pub(crate) fn destination(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        DownloaderError::DestinationUnavailable {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_and_destination_errors_are_fatal() {
        assert!(DownloaderError::SessionUnavailable("no chrome".into()).is_fatal());
        assert!(DownloaderError::destination(
            "/ro",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied)
        )
        .is_fatal());

        assert!(!DownloaderError::DownloadTimeout(90).is_fatal());
        assert!(!DownloaderError::PageLoad("dns".into()).is_fatal());
        assert!(!DownloaderError::Busy.is_fatal());
    }
}
