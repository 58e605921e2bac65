//! Year index: which ranking years have a page on the site.

use std::time::Duration;

use chrono::Datelike;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::types::YearTarget;

pub const FIRST_YEAR: i32 = 2006;

/// Used when probing finds nothing (site down, offline).
pub const FALLBACK_NEWEST_YEAR: i32 = 2024;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";

const HEAD_TIMEOUT: Duration = Duration::from_secs(6);
const GET_TIMEOUT: Duration = Duration::from_secs(8);

pub struct YearIndex {
    client: reqwest::Client,
    url_template: String,
    newest: i32,
    oldest: i32,
}

impl YearIndex {
    /// Probe from the current year down to 2006.
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloaderError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloaderError::Probe(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template: config.url_template.clone(),
            newest: chrono::Local::now().year(),
            oldest: FIRST_YEAR,
        })
    }

    pub fn with_range(mut self, newest: i32, oldest: i32) -> Self {
        self.newest = newest;
        self.oldest = oldest;
        self
    }

    fn page_url(&self, year: i32) -> String {
        self.url_template.replace("{year}", &year.to_string())
    }

    /// HEAD first; servers that refuse HEAD (403/405) get a GET.
    pub async fn probe(&self, year: i32) -> Result<bool, DownloaderError> {
        let url = self.page_url(year);

        let response = self
            .client
            .head(&url)
            .timeout(HEAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| DownloaderError::Probe(format!("{}: {}", url, e)))?;

        match response.status() {
            StatusCode::OK => {
                debug!("Year {} exists (HEAD)", year);
                Ok(true)
            }
            StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED => {
                let response = self
                    .client
                    .get(&url)
                    .timeout(GET_TIMEOUT)
                    .send()
                    .await
                    .map_err(|e| DownloaderError::Probe(format!("{}: {}", url, e)))?;
                let found = response.status() == StatusCode::OK;
                if found {
                    debug!("Year {} exists (GET fallback)", year);
                }
                Ok(found)
            }
            status => {
                debug!("Year {} not available: {}", year, status);
                Ok(false)
            }
        }
    }

    /// Available years, newest first. Falls back to 2024..=2006 when nothing answers.
    pub async fn detect(&self) -> Vec<YearTarget> {
        info!(
            "Probing for available years ({} down to {})...",
            self.newest, self.oldest
        );

        let mut found = Vec::new();
        for year in (self.oldest..=self.newest).rev() {
            match self.probe(year).await {
                Ok(true) => found.push(year),
                Ok(false) => {}
                Err(e) => debug!("Year {} probe failed: {}", year, e),
            }
        }

        if found.is_empty() {
            warn!(
                "Could not detect years, using known range {}-{}",
                FIRST_YEAR, FALLBACK_NEWEST_YEAR
            );
            found = (FIRST_YEAR..=FALLBACK_NEWEST_YEAR).rev().collect();
        } else {
            info!(
                "Detected {} years: {}-{}",
                found.len(),
                found[found.len() - 1],
                found[0]
            );
        }

        found
            .into_iter()
            .map(|year| YearTarget::new(year, self.page_url(year)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_uses_template() {
        let config = DownloaderConfig::default().with_url_template("http://127.0.0.1:1/y/{year}/");
        let index = YearIndex::new(&config).unwrap().with_range(2021, 2019);
        assert_eq!(index.page_url(2020), "http://127.0.0.1:1/y/2020/");
    }

    #[tokio::test]
    async fn test_unreachable_site_falls_back_to_known_range() {
        // port 9 (discard) is closed on test machines; every probe errors
        let config = DownloaderConfig::default().with_url_template("http://127.0.0.1:9/{year}/");
        let index = YearIndex::new(&config).unwrap().with_range(2021, 2020);

        let years: Vec<i32> = index.detect().await.into_iter().map(|t| t.year).collect();
        assert_eq!(years.first(), Some(&FALLBACK_NEWEST_YEAR));
        assert_eq!(years.last(), Some(&FIRST_YEAR));
        assert_eq!(years.len(), (FALLBACK_NEWEST_YEAR - FIRST_YEAR + 1) as usize);
    }
}
