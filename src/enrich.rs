//! Joins local paper records to OpenAlex work metadata.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{Doi, FieldValue, PaperRecord};
use crate::error::PetalError;
use crate::identifiers;
use crate::openalex::{OpenAlexClient, OpenAlexWork};

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichReport {
    pub total: usize,
    pub enriched: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub doi: String,
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Enriched,
    NotFound,
    Skipped,
}

pub struct Enricher<C: OpenAlexClient> {
    client: C,
}

impl<C: OpenAlexClient> Enricher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Enriches every record in order. A failure on one record is logged and
    /// recorded; the record keeps its local fields and the batch continues.
    pub fn enrich_batch(&self, records: &mut [PaperRecord], sink: &dyn ProgressSink) -> EnrichReport {
        let mut report = EnrichReport {
            total: records.len(),
            ..EnrichReport::default()
        };
        for (index, record) in records.iter_mut().enumerate() {
            sink.event(ProgressEvent::progress("enrich", index + 1, report.total));
            match self.enrich_record(record) {
                Ok(EnrichOutcome::Enriched) => report.enriched += 1,
                Ok(EnrichOutcome::NotFound) => report.not_found += 1,
                Ok(EnrichOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!(index, doi = %record.doi, url = %record.url, error = %err, "enrichment failed");
                    report.failures.push(RecordFailure {
                        index,
                        doi: record.doi.clone(),
                        url: record.url.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            total = report.total,
            enriched = report.enriched,
            not_found = report.not_found,
            failed = report.failures.len(),
            "enrichment finished"
        );
        report
    }

    pub fn enrich_record(&self, record: &mut PaperRecord) -> Result<EnrichOutcome, PetalError> {
        record.doi = identifiers::extract_doi(&record.doi);
        let work = if record.paper.is_present() {
            self.client.work_by_id(&identifiers::openalex_short_id(&record.paper))?
        } else if let Ok(doi) = record.doi.parse::<Doi>() {
            self.client.work_by_doi(&doi)?
        } else {
            debug!(url = %record.url, "no identifier to look up");
            return Ok(EnrichOutcome::Skipped);
        };

        match work {
            Some(work) => {
                apply_work(record, &work);
                Ok(EnrichOutcome::Enriched)
            }
            None => {
                debug!(doi = %record.doi, "no OpenAlex work");
                Ok(EnrichOutcome::NotFound)
            }
        }
    }
}

/// Overwrites the bibliographic fields of `record` with the work's values.
/// Venue names recorded before enrichment and absent from the work are kept.
pub fn apply_work(record: &mut PaperRecord, work: &OpenAlexWork) {
    let found_doi = identifiers::extract_doi(&work.doi);
    if found_doi.is_present() {
        if record.doi.is_present() && !identifiers::same_doi(&record.doi, &found_doi) {
            debug!(local = %record.doi, openalex = %found_doi, "OpenAlex work carries another DOI");
        }
        record.doi = found_doi;
    }
    record.paper = identifiers::openalex_short_id(&work.id);
    record.mesh_terms = work
        .mesh
        .iter()
        .map(|term| term.descriptor_name.clone())
        .filter(|name| name.is_present())
        .collect();

    let mut venue_ids = Vec::new();
    let mut venue_names = Vec::new();
    if let Some(host) = &work.host_venue {
        for venue in &work.alternate_host_venues {
            if venue.id.is_present() {
                venue_ids.push(identifiers::openalex_short_id(&venue.id));
            }
            if venue.display_name.is_present() {
                venue_names.push(venue.display_name.clone());
            }
        }
        venue_ids.push(identifiers::openalex_short_id(&host.id));
        venue_names.push(host.display_name.clone());
    }
    for previous in &record.venue_names {
        if !venue_names.contains(previous) {
            venue_names.push(previous.clone());
        }
    }
    record.venue_ids = venue_ids;
    record.venue_names = venue_names;

    record.author_ids = work
        .authorships
        .iter()
        .map(|authorship| identifiers::openalex_short_id(&authorship.author.id))
        .collect();
    record.author_names = work
        .authorships
        .iter()
        .map(|authorship| authorship.author.display_name.clone())
        .collect();
    record.reference_ids = work
        .referenced_works
        .iter()
        .map(|reference| identifiers::openalex_short_id(reference))
        .collect();

    record.title = work.title.clone();
    record.abstract_text = work.reconstructed_abstract();

    let open_access = work.open_access.clone().unwrap_or_default();
    record.is_open_access = Some(open_access.is_oa);
    record.full_doc_link = open_access.oa_url;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::openalex::{AuthorRef, Authorship, OpenAccess, Venue};

    fn work() -> OpenAlexWork {
        OpenAlexWork {
            id: "https://openalex.org/W42".to_string(),
            doi: "https://doi.org/10.1242/jeb.02556".to_string(),
            title: "Gecko adhesion".to_string(),
            host_venue: Some(Venue {
                id: "https://openalex.org/V1".to_string(),
                display_name: "Journal of Experimental Biology".to_string(),
            }),
            alternate_host_venues: vec![Venue {
                id: "https://openalex.org/V2".to_string(),
                display_name: "PubMed".to_string(),
            }],
            authorships: vec![Authorship {
                author: AuthorRef {
                    id: "https://openalex.org/A7".to_string(),
                    display_name: "K. Autumn".to_string(),
                },
            }],
            referenced_works: vec!["https://openalex.org/W9".to_string()],
            abstract_inverted_index: Some(BTreeMap::from([
                ("setae".to_string(), vec![1]),
                ("gecko".to_string(), vec![0]),
            ])),
            open_access: Some(OpenAccess {
                is_oa: true,
                oa_url: "https://example.org/pdf".to_string(),
            }),
            ..OpenAlexWork::default()
        }
    }

    #[test]
    fn apply_work_overwrites_bibliographic_fields() {
        let mut record = PaperRecord {
            doi: "10.1242/jeb.02556".to_string(),
            title: "local title".to_string(),
            venue_names: vec!["Old Venue".to_string(), "PubMed".to_string()],
            ..PaperRecord::default()
        };
        apply_work(&mut record, &work());

        assert_eq!(record.doi, "10.1242/JEB.02556");
        assert_eq!(record.paper, "W42");
        assert_eq!(record.title, "Gecko adhesion");
        assert_eq!(record.abstract_text, "gecko setae");
        assert_eq!(record.venue_ids, vec!["V2", "V1"]);
        assert_eq!(
            record.venue_names,
            vec!["PubMed", "Journal of Experimental Biology", "Old Venue"]
        );
        assert_eq!(record.author_ids, vec!["A7"]);
        assert_eq!(record.author_names, vec!["K. Autumn"]);
        assert_eq!(record.reference_ids, vec!["W9"]);
        assert_eq!(record.is_open_access, Some(true));
        assert_eq!(record.full_doc_link, "https://example.org/pdf");
    }

    #[test]
    fn missing_sections_become_empty() {
        let mut record = PaperRecord::default();
        apply_work(
            &mut record,
            &OpenAlexWork {
                id: "https://openalex.org/W1".to_string(),
                ..OpenAlexWork::default()
            },
        );
        assert!(record.venue_names.is_empty());
        assert!(record.author_ids.is_empty());
        assert_eq!(record.abstract_text, "");
        assert_eq!(record.is_open_access, Some(false));
    }
}
