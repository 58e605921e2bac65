//! Page discoverer: finds downloadable spreadsheets on a year page.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloaderError;
use crate::traits::{BrowserSession, RawLink};
use crate::types::{FileDescriptor, SourceRef, YearTarget};
use crate::wait::{Deadline, Stability};

/// Spreadsheet links in any case, with or without a query string.
pub const LINK_SELECTOR: &str = "a[href$='.xls' i], a[href$='.xlsx' i], \
     a[href*='.xls?' i], a[href*='.xlsx?' i]";

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Drop any query string, replace characters that are invalid on common
/// filesystems with `_`, trim whitespace and surrounding dots.
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.split('?').next().unwrap_or_default();
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    replaced.trim().trim_matches('.').trim().to_string()
}

/// Percent-decoded, sanitized last path segment of `href`.
pub fn file_name_from_url(href: &str) -> Option<String> {
    let url = url::Url::parse(href).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = sanitize_file_name(&decoded);
    (!name.is_empty()).then_some(name)
}

fn is_spreadsheet_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    lower.contains(".xls")
}

/// Turn raw page markers into descriptors: page order kept, duplicate URLs dropped.
pub fn descriptors_from_links(
    links: Vec<RawLink>,
    year: i32,
    button_selector: &str,
) -> Vec<FileDescriptor> {
    let mut seen: Vec<String> = Vec::new();
    let mut files = Vec::new();

    for link in links {
        match (link.href, link.button_index) {
            (Some(href), _) => {
                let href = href.trim().to_string();
                if !is_spreadsheet_href(&href) || seen.contains(&href) {
                    continue;
                }
                let Some(label) = file_name_from_url(&href) else {
                    debug!("Skipping link without a file name: {}", href);
                    continue;
                };
                seen.push(href.clone());
                files.push(FileDescriptor {
                    label,
                    source: SourceRef::Url(href),
                    year,
                });
            }
            (None, Some(index)) => {
                let label = sanitize_file_name(&link.text);
                if label.is_empty() {
                    debug!("Skipping unlabeled download element #{}", index);
                    continue;
                }
                files.push(FileDescriptor {
                    label,
                    source: SourceRef::Element {
                        selector: button_selector.to_string(),
                        index,
                    },
                    year,
                });
            }
            (None, None) => {}
        }
    }

    files
}

/// Descriptors found on one page. Single pass; discover again to re-scan.
#[derive(Debug)]
pub struct PageListing {
    pub year: i32,
    pub page_url: String,
    files: std::vec::IntoIter<FileDescriptor>,
}

impl PageListing {
    pub fn new(target: &YearTarget, files: Vec<FileDescriptor>) -> Self {
        Self {
            year: target.year,
            page_url: target.page_url.clone(),
            files: files.into_iter(),
        }
    }
}

impl Iterator for PageListing {
    type Item = FileDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.files.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

impl ExactSizeIterator for PageListing {}

#[derive(Debug, Clone)]
pub struct PageDiscoverer {
    link_selector: String,
    button_selector: String,
    timeout: Duration,
    interval: Duration,
    stable_polls: u32,
}

impl PageDiscoverer {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            link_selector: LINK_SELECTOR.to_string(),
            button_selector: config.button_selector.clone(),
            timeout: config.page_timeout,
            interval: config.page_poll_interval,
            stable_polls: config.stable_polls,
        }
    }

    /// Load the year page and wait (bounded) for its download markers to settle.
    ///
    /// A page that loads but never shows a marker yields an empty listing. A
    /// page that cannot be loaded or scanned at all is an error.
    pub async fn discover(
        &self,
        session: &dyn BrowserSession,
        target: &YearTarget,
    ) -> Result<PageListing, DownloaderError> {
        info!("Loading {} page: {}", target.year, target.page_url);
        tokio::time::timeout(self.timeout, session.navigate(&target.page_url))
            .await
            .map_err(|_| {
                DownloaderError::PageTimeout(format!(
                    "{} did not load within {:?}",
                    target.page_url, self.timeout
                ))
            })??;

        let deadline = Deadline::new(self.timeout, self.interval);
        let mut stability = Stability::new(self.stable_polls);
        let mut latest: Vec<RawLink> = Vec::new();
        let mut scanned = false;
        let mut last_error = None;

        loop {
            match session
                .scan_links(&self.link_selector, &self.button_selector)
                .await
            {
                Ok(links) => {
                    scanned = true;
                    let settled = !links.is_empty() && stability.observe(links.len());
                    debug!("{}: {} download markers", target.year, links.len());
                    latest = links;
                    if settled {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{}: scan failed: {}", target.year, e);
                    last_error = Some(e);
                }
            }

            if !deadline.tick().await {
                break;
            }
        }

        if !scanned {
            let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(DownloaderError::PageTimeout(format!(
                "{} not scannable after {:?}: {}",
                target.page_url,
                deadline.elapsed(),
                detail
            )));
        }

        if !latest.is_empty() && stability.last() != Some(&latest.len()) {
            warn!("{}: page still changing at deadline, using last scan", target.year);
        }

        let files = descriptors_from_links(latest, target.year, &self.button_selector);
        if files.is_empty() {
            warn!("No Excel files found for {}", target.year);
        } else {
            info!("Found {} files for {}", files.len(), target.year);
        }

        Ok(PageListing::new(target, files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Surgery Rankings.xlsx"), "Surgery Rankings.xlsx");
        assert_eq!(sanitize_file_name("a:b*c?.xlsx"), "a_b_c");
        assert_eq!(sanitize_file_name("report.xlsx?v=2"), "report.xlsx");
        assert_eq!(sanitize_file_name("  ..odd name..  "), "odd name");
        assert_eq!(sanitize_file_name("\"quoted\"|pipe.xls"), "_quoted__pipe.xls");
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://brimr.org/wp-content/uploads/2024/02/Surgery%20Rankings.xlsx"),
            Some("Surgery Rankings.xlsx".to_string())
        );
        assert_eq!(
            file_name_from_url("https://brimr.org/files/Worldwide.xlsx?ver=3"),
            Some("Worldwide.xlsx".to_string())
        );
        assert_eq!(file_name_from_url("https://brimr.org/"), None);
        assert_eq!(file_name_from_url("not a url"), None);
    }

    #[test]
    fn test_descriptors_keep_order_and_drop_duplicates() {
        let links = vec![
            RawLink::link("Worldwide", "https://x.org/a/Worldwide.xlsx"),
            RawLink::link("Surgery", "https://x.org/a/Surgery.xls"),
            RawLink::link("Worldwide again", "https://x.org/a/Worldwide.xlsx"),
            RawLink::link("Page", "https://x.org/a/about.html"),
            RawLink::button("  Genetics PI.xlsx ", 0),
            RawLink::button("   ", 1),
        ];

        let files = descriptors_from_links(links, 2022, "button[download]");
        let labels: Vec<&str> = files.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Worldwide.xlsx", "Surgery.xls", "Genetics PI.xlsx"]);
        assert!(files.iter().all(|f| f.year == 2022));
        assert_eq!(
            files[2].source,
            SourceRef::Element {
                selector: "button[download]".into(),
                index: 0
            }
        );
    }

    #[test]
    fn test_link_selector_ignores_case() {
        assert!(LINK_SELECTOR.split(", ").all(|part| part.ends_with(" i]")));

        let links = vec![
            RawLink::link("Mixed", "https://x.org/a/Nursing.Xlsx"),
            RawLink::link("Upper", "https://x.org/a/Pharmacy.XLSX?v=1"),
        ];
        let labels: Vec<String> = descriptors_from_links(links, 2021, "")
            .into_iter()
            .map(|f| f.label)
            .collect();
        assert_eq!(labels, vec!["Nursing.Xlsx", "Pharmacy.XLSX"]);
    }

    #[test]
    fn test_page_listing_is_exact_size() {
        let target = YearTarget::new(2020, "https://x.org/2020/");
        let files = descriptors_from_links(
            vec![RawLink::link("", "https://x.org/Genetics.xlsx")],
            2020,
            "",
        );
        let mut listing = PageListing::new(&target, files);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.next().map(|f| f.label), Some("Genetics.xlsx".to_string()));
        assert!(listing.next().is_none());
    }
}
