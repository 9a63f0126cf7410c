//! DOI recovery from paper landing pages.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{FieldValue, PaperRecord};
use crate::error::PetalError;
use crate::identifiers;

// Publisher sites commonly refuse non-browser agents.
const BROWSER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.97 Safari/537.36";

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, PetalError>;
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, PetalError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| PetalError::PageHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, PetalError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PetalError::PageHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PetalError::PageStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        response
            .text()
            .map_err(|err| PetalError::PageHttp(err.to_string()))
    }
}

/// First DOI found on the page: `doi.org` anchors win over page text, and the
/// page URL is the last resort.
pub fn doi_from_page(html: &str, url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let from_anchor = document
        .select(&ANCHORS)
        .filter_map(|anchor| anchor.value().attr("href"))
        .find_map(identifiers::doi_from_link);
    if from_anchor.is_some() {
        return from_anchor;
    }

    let from_text = document
        .root_element()
        .text()
        .map(identifiers::extract_doi)
        .find(|doi| doi.is_present());
    if from_text.is_some() {
        return from_text;
    }

    let from_url = identifiers::extract_doi(identifiers::strip_leading_noise(url));
    from_url.is_present().then_some(from_url)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub total: usize,
    pub attempted: usize,
    pub found: usize,
    pub failed: usize,
}

/// Fills the DOI of every record that has a URL but no DOI. A page that cannot
/// be fetched leaves its record unchanged.
pub fn scrape_dois<F: PageFetcher>(
    records: &mut [PaperRecord],
    fetcher: &F,
    sink: &dyn ProgressSink,
) -> ScrapeReport {
    let mut report = ScrapeReport {
        total: records.len(),
        ..ScrapeReport::default()
    };
    for (index, record) in records.iter_mut().enumerate() {
        sink.event(ProgressEvent::progress("scrape", index + 1, report.total));
        if record.doi.is_present() || !record.url.is_present() {
            continue;
        }
        report.attempted += 1;
        match fetcher.fetch_page(&record.url) {
            Ok(html) => match doi_from_page(&html, &record.url) {
                Some(doi) => {
                    debug!(url = %record.url, doi = %doi, "doi scraped");
                    record.doi = doi;
                    report.found += 1;
                }
                None => debug!(url = %record.url, "no doi on page"),
            },
            Err(err) => {
                warn!(url = %record.url, error = %err, "page fetch failed");
                report.failed += 1;
            }
        }
    }
    info!(
        attempted = report.attempted,
        found = report.found,
        failed = report.failed,
        "doi scraping finished"
    );
    report
}
