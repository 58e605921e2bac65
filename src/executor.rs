//! Download executor: trigger, wait for the staged file, move it into place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::registry;
use crate::session::SessionHandle;
use crate::types::{ClassifiedFile, DownloadOutcome};
use crate::wait::{poll_until, Stability};

/// Suffixes browsers use while a download is still being written.
const TEMP_SUFFIXES: [&str; 3] = [".crdownload", ".tmp", ".part"];

fn is_temporary(name: &str) -> bool {
    let lower = name.to_lowercase();
    TEMP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Staged {
    Empty,
    InProgress,
    Ready { path: PathBuf, size: u64 },
}

/// Snapshot of the staging directory. Any temporary file means the download
/// is still running; otherwise the first finished file (by name) is reported.
fn scan_staging(dir: &Path) -> std::io::Result<Staged> {
    let mut finished: Vec<(PathBuf, u64)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_temporary(&name) {
            return Ok(Staged::InProgress);
        }
        finished.push((entry.path(), meta.len()));
    }

    finished.sort();
    Ok(match finished.into_iter().next() {
        Some((path, size)) => Staged::Ready { path, size },
        None => Staged::Empty,
    })
}

fn clear_staging(dir: &Path) -> Result<(), DownloaderError> {
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Rename, or copy and remove when the two paths are on different filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), DownloaderError> {
    let wrap = |source: std::io::Error| DownloaderError::FileMove {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }

    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    std::fs::copy(from, to).map_err(wrap)?;
    std::fs::remove_file(from).map_err(wrap)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    timeout: Duration,
    interval: Duration,
    stable_polls: u32,
}

impl DownloadExecutor {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            timeout: config.download_timeout,
            interval: config.download_poll_interval,
            stable_polls: config.stable_polls,
        }
    }

    /// Fetch one file into its category folder under `root`.
    ///
    /// Never returns an error: anything that goes wrong for this file is
    /// reported as a `Failed` outcome so the batch can continue.
    pub async fn execute(
        &self,
        handle: &SessionHandle,
        file: &ClassifiedFile,
        root: &Path,
    ) -> DownloadOutcome {
        match self.try_execute(handle, file, root).await {
            Ok(dest) => {
                info!("Downloaded: {} -> {:?}", file.descriptor.label, dest);
                DownloadOutcome::downloaded(file, dest)
            }
            Err(e) => {
                warn!("Failed: {} ({})", file.descriptor.label, e);
                DownloadOutcome::failed(file, &e)
            }
        }
    }

    async fn try_execute(
        &self,
        handle: &SessionHandle,
        file: &ClassifiedFile,
        root: &Path,
    ) -> Result<PathBuf, DownloaderError> {
        let staging = handle.staging_dir();
        clear_staging(staging)?;

        debug!("Triggering {:?}", file.descriptor.source);
        handle
            .session()
            .trigger_download(&file.descriptor.source)
            .await?;

        let staged = self.wait_for_file(staging).await?;

        let name = registry::stored_file_name(&file.descriptor.label, &staged);
        let dest = registry::destination_path(root, file.descriptor.year, file.category, &name);
        move_file(&staged, &dest)?;
        Ok(dest)
    }

    /// Wait until a finished file sits in `dir` with an unchanged size.
    async fn wait_for_file(&self, dir: &Path) -> Result<PathBuf, DownloaderError> {
        let mut stability: Stability<(PathBuf, u64)> = Stability::new(self.stable_polls);

        let found = poll_until(self.timeout, self.interval, || match scan_staging(dir) {
            Ok(Staged::Ready { path, size }) => {
                if stability.observe((path.clone(), size)) {
                    Some(path)
                } else {
                    None
                }
            }
            Ok(state) => {
                stability.reset();
                debug!("Staging {:?}: {:?}", dir, state);
                None
            }
            Err(e) => {
                stability.reset();
                debug!("Staging scan failed: {}", e);
                None
            }
        })
        .await;

        found.ok_or(DownloaderError::DownloadTimeout(self.timeout.as_secs()))
    }
}
