use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::OpenAlexSettings;
use crate::domain::Doi;
use crate::error::PetalError;

/// The subset of an OpenAlex work the pipeline consumes. Every section is
/// optional in the payload and decodes to an empty default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAlexWork {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub doi: String,
    #[serde(default, deserialize_with = "null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub mesh: Vec<MeshTerm>,
    #[serde(default)]
    pub host_venue: Option<Venue>,
    #[serde(default, deserialize_with = "null_default")]
    pub alternate_host_venues: Vec<Venue>,
    #[serde(default, deserialize_with = "null_default")]
    pub authorships: Vec<Authorship>,
    #[serde(default, deserialize_with = "null_default")]
    pub referenced_works: Vec<String>,
    #[serde(default)]
    pub abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    #[serde(default)]
    pub open_access: Option<OpenAccess>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshTerm {
    #[serde(default, deserialize_with = "null_default")]
    pub descriptor_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Venue {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorship {
    #[serde(default)]
    pub author: AuthorRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorRef {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAccess {
    #[serde(default, deserialize_with = "null_default")]
    pub is_oa: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub oa_url: String,
}

impl OpenAlexWork {
    pub fn reconstructed_abstract(&self) -> String {
        self.abstract_inverted_index
            .as_ref()
            .map(reconstruct_abstract)
            .unwrap_or_default()
    }
}

/// Rebuilds text from an inverted index (word -> positions). Positions no word
/// covers are placeholders; any run of them collapses, so the result is the
/// real words in position order separated by single spaces. When two words
/// claim one position the later key wins.
pub fn reconstruct_abstract(index: &BTreeMap<String, Vec<usize>>) -> String {
    let mut slots: BTreeMap<usize, &str> = BTreeMap::new();
    for (word, positions) in index {
        for &position in positions {
            slots.insert(position, word.as_str());
        }
    }
    slots.into_values().collect::<Vec<_>>().join(" ")
}

pub trait OpenAlexClient {
    /// `Ok(None)` when the service has no work for the DOI.
    fn work_by_doi(&self, doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError>;
    fn work_by_id(&self, id: &str) -> Result<Option<OpenAlexWork>, PetalError>;
}

impl<C: OpenAlexClient + ?Sized> OpenAlexClient for &C {
    fn work_by_doi(&self, doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError> {
        (**self).work_by_doi(doi)
    }

    fn work_by_id(&self, id: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        (**self).work_by_id(id)
    }
}

#[derive(Clone)]
pub struct OpenAlexHttpClient {
    client: Client,
    base_url: String,
    mailto: Option<String>,
    retries: usize,
}

impl OpenAlexHttpClient {
    pub fn new(settings: &OpenAlexSettings) -> Result<Self, PetalError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("petal-curator/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PetalError::OpenAlexHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| PetalError::OpenAlexHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            mailto: settings.mailto.clone(),
            retries: settings.retries,
        })
    }

    fn work_url(&self, key: &str) -> String {
        format!("{}/works/{}", self.base_url, key)
    }

    fn fetch_work(&self, url: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        let response = self.send_with_retries(|| {
            let request = self.client.get(url);
            match &self.mailto {
                Some(mailto) => request.query(&[("mailto", mailto.as_str())]),
                None => request,
            }
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "OpenAlex request failed".to_string());
            return Err(PetalError::OpenAlexStatus { status, message });
        }
        let work: OpenAlexWork = response
            .json()
            .map_err(|err| PetalError::OpenAlexParse(err.to_string()))?;
        Ok(Some(work))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, PetalError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    if attempt < self.retries && is_retryable_status(resp.status().as_u16()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.retries && (err.is_timeout() || err.is_connect()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(PetalError::OpenAlexHttp(err.to_string()));
                }
            }
        }
    }
}

impl OpenAlexClient for OpenAlexHttpClient {
    fn work_by_doi(&self, doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError> {
        self.fetch_work(&self.work_url(&format!("doi:{doi}")))
    }

    fn work_by_id(&self, id: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        self.fetch_work(&self.work_url(id))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
