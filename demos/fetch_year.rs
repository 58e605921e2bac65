//! Fetch one ranking year with a visible browser
//!
//! Usage:
//! ```
//! cargo run --example fetch_year -- 2023 ./BRIMR_Data
//! ```

use brimr_downloader::{BatchRequest, DownloaderConfig, DownloaderService, ProgressEvent};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let year: i32 = args
        .next()
        .and_then(|y| y.parse().ok())
        .expect("usage: fetch_year <YEAR> [DEST]");
    let dest = args.next().unwrap_or_else(|| "./BRIMR_Data".to_string());

    println!("=== BRIMR {} ===", year);

    let service = DownloaderService::new(DownloaderConfig::default());
    let mut batch = service.start(BatchRequest::new([year], &dest).with_headless(false));

    while let Some(event) = batch.events.recv().await {
        if let ProgressEvent::FileFinished {
            label,
            category,
            status,
            position,
            total,
            ..
        } = event
        {
            println!("[{}/{}] {} {} -> {}", position, total, status, label, category);
        }
    }

    match batch.wait().await {
        Ok(outcome) => println!("{:?}: {}", outcome.state, outcome.report.summary()),
        Err(e) => eprintln!("Error: {}", e),
    }
}
