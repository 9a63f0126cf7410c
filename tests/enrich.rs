use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use petal_curator::domain::{Doi, PaperRecord};
use petal_curator::enrich::{EnrichOutcome, Enricher};
use petal_curator::error::PetalError;
use petal_curator::openalex::{OpenAlexClient, OpenAlexWork, Venue};
use petal_curator::output::JsonOutput;

#[derive(Default)]
struct MockOpenAlex {
    works: HashMap<String, OpenAlexWork>,
    failing: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl OpenAlexClient for MockOpenAlex {
    fn work_by_doi(&self, doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError> {
        self.calls.borrow_mut().push(format!("doi:{doi}"));
        if self.failing.iter().any(|item| item == doi.as_str()) {
            return Err(PetalError::OpenAlexStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.works.get(doi.as_str()).cloned())
    }

    fn work_by_id(&self, id: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        self.calls.borrow_mut().push(format!("id:{id}"));
        Ok(self.works.get(id).cloned())
    }
}

fn lotus_work() -> OpenAlexWork {
    OpenAlexWork {
        id: "https://openalex.org/W100".to_string(),
        doi: "https://doi.org/10.1007/s004250050096".to_string(),
        title: "Purity of the sacred lotus".to_string(),
        host_venue: Some(Venue {
            id: "https://openalex.org/V5".to_string(),
            display_name: "Planta".to_string(),
        }),
        abstract_inverted_index: Some(BTreeMap::from([
            ("lotus".to_string(), vec![1]),
            ("the".to_string(), vec![0]),
        ])),
        ..OpenAlexWork::default()
    }
}

fn with_doi(doi: &str) -> PaperRecord {
    PaperRecord {
        doi: doi.to_string(),
        url: format!("https://example.org/{doi}"),
        title: "local title".to_string(),
        ..PaperRecord::default()
    }
}

#[test]
fn one_failing_record_does_not_abort_the_batch() {
    let client = MockOpenAlex {
        works: HashMap::from([("10.1007/S004250050096".to_string(), lotus_work())]),
        failing: vec!["10.1234/BROKEN".to_string()],
        ..MockOpenAlex::default()
    };
    let mut records = vec![
        with_doi("10.1234/broken"),
        with_doi("https://doi.org/10.1007/s004250050096"),
    ];

    let report = Enricher::new(&client).enrich_batch(&mut records, &JsonOutput);

    assert_eq!(report.total, 2);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 0);
    assert_eq!(records[0].title, "local title");
    assert_eq!(records[1].title, "Purity of the sacred lotus");
    assert_eq!(records[1].abstract_text, "the lotus");
    assert_eq!(records[1].paper, "W100");
    assert_eq!(records[1].venue_names, vec!["Planta"]);
}

#[test]
fn miss_keeps_local_fields() {
    let client = MockOpenAlex::default();
    let mut record = PaperRecord {
        abstract_text: "kept".to_string(),
        ..with_doi("10.5555/unknown")
    };

    let outcome = Enricher::new(&client).enrich_record(&mut record).unwrap();

    assert_eq!(outcome, EnrichOutcome::NotFound);
    assert_eq!(record.title, "local title");
    assert_eq!(record.abstract_text, "kept");
    assert_eq!(record.doi, "10.5555/UNKNOWN");
}

#[test]
fn known_work_id_is_preferred_over_doi() {
    let client = MockOpenAlex {
        works: HashMap::from([("W100".to_string(), lotus_work())]),
        ..MockOpenAlex::default()
    };
    let mut record = PaperRecord {
        paper: "https://openalex.org/W100".to_string(),
        ..with_doi("10.1007/s004250050096")
    };

    let outcome = Enricher::new(&client).enrich_record(&mut record).unwrap();

    assert_eq!(outcome, EnrichOutcome::Enriched);
    assert_eq!(*client.calls.borrow(), vec!["id:W100"]);
}

#[test]
fn record_without_identifiers_is_skipped() {
    let client = MockOpenAlex::default();
    let mut record = PaperRecord {
        url: "https://example.org/no-doi".to_string(),
        ..PaperRecord::default()
    };

    let outcome = Enricher::new(&client).enrich_record(&mut record).unwrap();

    assert_eq!(outcome, EnrichOutcome::Skipped);
    assert!(client.calls.borrow().is_empty());
}

#[test]
fn far_flung_abstract_positions_do_not_stop_the_batch() {
    let malformed = OpenAlexWork {
        id: "https://openalex.org/W7".to_string(),
        title: "Shark skin riblets".to_string(),
        abstract_inverted_index: Some(BTreeMap::from([
            ("riblets".to_string(), vec![0]),
            ("drag".to_string(), vec![usize::MAX]),
        ])),
        ..OpenAlexWork::default()
    };
    let client = MockOpenAlex {
        works: HashMap::from([
            ("10.1242/SHARK".to_string(), malformed),
            ("10.1007/S004250050096".to_string(), lotus_work()),
        ]),
        ..MockOpenAlex::default()
    };
    let mut records = vec![with_doi("10.1242/shark"), with_doi("10.1007/s004250050096")];

    let report = Enricher::new(&client).enrich_batch(&mut records, &JsonOutput);

    assert_eq!(report.enriched, 2);
    assert_eq!(records[0].abstract_text, "riblets drag");
    assert_eq!(records[1].title, "Purity of the sacred lotus");
}
