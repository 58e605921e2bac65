use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Our DEBUG lines; CDP and HTTP internals stay at info.
const FILE_FILTER: &str = "debug,chromiumoxide=info,tungstenite=info,hyper=info,hyper_util=info,reqwest=info";

/// Log to `<dir>/brimr_downloader_<timestamp>.log` at DEBUG and to stderr
/// filtered by `RUST_LOG` (default `info`). Returns the log file path.
pub fn init_logging(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating log directory {:?}", dir))?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_file_path = dir.join(format!("brimr_downloader_{}.log", stamp));

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)
        .with_context(|| format!("opening log file {:?}", log_file_path))?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_FILTER));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    tracing::info!("Logging to {}", log_file_path.display());
    Ok(log_file_path)
}

/// Stderr only, for commands that do not write a download tree.
pub fn init_stderr_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {}", e))
}
