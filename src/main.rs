use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use brimr_downloader::logging::{init_logging, init_stderr_logging};
use brimr_downloader::{
    BatchRequest, Classifier, DownloaderConfig, DownloaderService, OutcomeStatus, ProgressEvent,
    RunState, YearIndex,
};

#[derive(Parser)]
#[command(name = "brimr-fetch", version, about = "Download BRIMR NIH funding spreadsheets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the ranking years that have a page
    Years,
    /// Download and sort spreadsheets for the selected years
    Download(DownloadArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Year to fetch (repeatable)
    #[arg(long = "year", value_name = "YEAR")]
    years: Vec<i32>,

    /// Every detected year
    #[arg(long, conflicts_with_all = ["years", "recent"])]
    all: bool,

    /// The N most recent detected years
    #[arg(long, value_name = "N", conflicts_with = "years")]
    recent: Option<usize>,

    /// Destination root (default: ~/Downloads/BRIMR_Data)
    #[arg(long, env = "BRIMR_DEST")]
    dest: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, env = "BRIMR_HEADLESS")]
    headless: bool,

    /// TOML file replacing the built-in classification rules
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Seconds to wait for a year page to show its links
    #[arg(long, default_value_t = 15)]
    page_timeout: u64,

    /// Seconds to wait for each download
    #[arg(long, default_value_t = 90)]
    download_timeout: u64,

    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,
}

fn default_destination() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("BRIMR_Data")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

async fn list_years() -> Result<()> {
    init_stderr_logging()?;
    let index = YearIndex::new(&DownloaderConfig::default())?;
    for target in index.detect().await {
        println!("{}\t{}", target.year, target.page_url);
    }
    Ok(())
}

/// Oldest first, without repeats. `recent` keeps the newest `n` years.
fn select_years(mut years: Vec<i32>, recent: Option<usize>) -> Vec<i32> {
    years.sort_unstable();
    years.dedup();
    if let Some(n) = recent {
        let skip = years.len().saturating_sub(n);
        years.drain(..skip);
    }
    years
}

async fn resolve_years(args: &DownloadArgs, config: &DownloaderConfig) -> Result<Vec<i32>> {
    if !args.years.is_empty() {
        return Ok(select_years(args.years.clone(), None));
    }
    if !args.all && args.recent.is_none() {
        bail!("choose years with --year, --all or --recent");
    }

    let detected: Vec<i32> = YearIndex::new(config)?
        .detect()
        .await
        .into_iter()
        .map(|t| t.year)
        .collect();

    Ok(select_years(detected, args.recent))
}

async fn download(args: DownloadArgs) -> Result<()> {
    let dest = args.dest.clone().unwrap_or_else(default_destination);
    let log_path = init_logging(&dest)?;

    let mut config = DownloaderConfig::default()
        .with_page_timeout(Duration::from_secs(args.page_timeout))
        .with_download_timeout(Duration::from_secs(args.download_timeout));
    if let Some(chrome) = &args.chrome {
        config = config.with_chrome_executable(chrome);
    }
    if let Some(rules) = &args.rules {
        let classifier =
            Classifier::load(rules).with_context(|| format!("loading rules from {:?}", rules))?;
        config = config.with_classifier(classifier);
    }

    let years = resolve_years(&args, &config).await?;
    info!("Selected years: {:?}", years);

    let service = DownloaderService::new(config);
    let mut batch = service.start(BatchRequest::new(years, &dest).with_headless(args.headless));

    // first Ctrl-C cancels cooperatively, the second is forwarded to the loop below
    let cancel = batch.cancel.clone();
    let (interrupt_tx, mut interrupts) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested; finishing the current file");
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(()).await;
        }
    });

    let pb = ProgressBar::new(0);
    pb.set_style(bar_style());
    pb.enable_steady_tick(Duration::from_millis(200));

    loop {
        let event = tokio::select! {
            event = batch.events.recv() => event,
            Some(()) = interrupts.recv() => {
                warn!("Interrupted again, closing the browser and exiting");
                pb.finish_and_clear();
                batch.abort().await;
                std::process::exit(130);
            }
        };
        let Some(event) = event else {
            break;
        };
        match event {
            ProgressEvent::SessionStarting => pb.set_message("starting browser"),
            ProgressEvent::YearStarted { year, files } => {
                pb.inc_length(files as u64);
                pb.set_message(format!("{}: {} files", year, files));
            }
            ProgressEvent::YearWithoutData { year, reason } => {
                pb.println(format!("{}: no data ({})", year, reason));
            }
            ProgressEvent::FileFinished {
                year,
                label,
                category,
                status,
                ..
            } => {
                pb.inc(1);
                if status == OutcomeStatus::Failed {
                    pb.println(format!("{}: FAILED {} [{}]", year, label, category));
                }
                pb.set_message(format!("{}: {} {}", year, status, label));
            }
            ProgressEvent::Finished { .. } => {}
        }
    }
    pb.finish_and_clear();

    let outcome = batch.wait().await.context("batch aborted")?;
    match outcome.state {
        RunState::Cancelled => println!("Cancelled. {}", outcome.report.summary()),
        _ => println!("Complete. {}", outcome.report.summary()),
    }

    let failed_years = outcome.report.years_with_failures();
    if !failed_years.is_empty() {
        println!("Years with failed files: {:?}", failed_years);
    }
    if !outcome.report.years_without_data.is_empty() {
        println!("Years without data: {:?}", outcome.report.years_without_data);
    }
    println!("Files: {}", dest.display());
    println!("Log: {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Years => list_years().await,
        Command::Download(args) => download(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_years_runs_oldest_first() {
        assert_eq!(select_years(vec![2024, 2019, 2022, 2019], None), vec![2019, 2022, 2024]);
        assert_eq!(select_years(vec![2024, 2023, 2022, 2021], Some(2)), vec![2023, 2024]);
        assert_eq!(select_years(vec![2024], Some(5)), vec![2024]);
        assert!(select_years(Vec::new(), Some(3)).is_empty());
    }
}
