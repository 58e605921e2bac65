//! Session manager: owns the single browser of a batch run.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::traits::{BrowserSession, LaunchOptions, SessionLauncher};

/// A running browser plus the staging directory it downloads into.
pub struct SessionHandle {
    session: Box<dyn BrowserSession>,
    staging_root: PathBuf,
    staging_dir: PathBuf,
}

impl SessionHandle {
    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Directory the browser currently downloads into.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Point downloads at a fresh `<staging_root>/<year>` directory.
    pub async fn prepare_year(&mut self, year: i32) -> Result<(), DownloaderError> {
        let dir = self.staging_root.join(year.to_string());
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| DownloaderError::destination(&dir, e))?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| DownloaderError::destination(&dir, e))?;

        self.session.set_download_dir(&dir).await.map_err(|e| match e {
            DownloaderError::FileIO(io) => DownloaderError::destination(&dir, io),
            other => other,
        })?;

        debug!("Staging for {} at {:?}", year, dir);
        self.staging_dir = dir;
        Ok(())
    }
}

pub struct SessionManager<L> {
    launcher: L,
    staging_dir_name: String,
    chrome_executable: Option<PathBuf>,
    window_size: (u32, u32),
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn new(launcher: L, config: &DownloaderConfig) -> Self {
        Self {
            launcher,
            staging_dir_name: config.staging_dir_name.clone(),
            chrome_executable: config.chrome_executable.clone(),
            window_size: config.window_size,
        }
    }

    /// Start one browser that downloads into `<destination_root>/<staging>` without prompting.
    pub async fn acquire(
        &self,
        headless: bool,
        destination_root: &Path,
    ) -> Result<SessionHandle, DownloaderError> {
        let staging_root = destination_root.join(&self.staging_dir_name);
        std::fs::create_dir_all(&staging_root)
            .map_err(|e| DownloaderError::destination(&staging_root, e))?;

        let options = LaunchOptions {
            headless,
            staging_dir: staging_root.clone(),
            chrome_executable: self.chrome_executable.clone(),
            window_size: self.window_size,
        };

        let session = match self.launcher.launch(&options).await {
            Ok(session) => session,
            Err(e) => {
                remove_staging(&staging_root);
                return Err(match e {
                    DownloaderError::SessionUnavailable(msg) => {
                        DownloaderError::SessionUnavailable(msg)
                    }
                    other => DownloaderError::SessionUnavailable(other.to_string()),
                });
            }
        };

        info!("Session acquired (headless={})", headless);
        Ok(SessionHandle {
            session,
            staging_dir: staging_root.clone(),
            staging_root,
        })
    }

    /// Terminate the browser and drop the staging tree. Never fails; problems are logged.
    pub async fn release(&self, mut handle: SessionHandle) {
        if let Err(e) = handle.session.shutdown().await {
            warn!("Browser shutdown reported an error: {}", e);
        }
        remove_staging(&handle.staging_root);
        info!("Session released");
    }
}

fn remove_staging(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove staging directory {:?}: {}", dir, e);
        }
    }
}
