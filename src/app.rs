use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::PaperRecord;
use crate::enrich::{EnrichReport, Enricher};
use crate::error::PetalError;
use crate::golden::{GoldenDataset, MergeReport};
use crate::harvest;
use crate::openalex::OpenAlexClient;
use crate::scrape::{self, PageFetcher, ScrapeReport};
use crate::store::{LabelColumns, Store};
use crate::taxonomy::{self, ConversionReport, FunctionMap};
use crate::validate::{self, ValidationReport};

#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub hits: usize,
    pub records: usize,
    pub output: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub report: ScrapeReport,
    pub output: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResult {
    pub report: ConversionReport,
    pub output: String,
    /// Held-out records needing a human label, when there were any.
    pub manual_review: Option<String>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichResult {
    pub report: EnrichReport,
    pub output: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub report: MergeReport,
    pub golden: String,
    pub golden_size: usize,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub report: ValidationReport,
    pub golden: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub conversion: ConversionReport,
    pub manual_review: Option<String>,
    pub enrichment: EnrichReport,
    pub merge: MergeReport,
    pub validation: ValidationReport,
    pub golden: String,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    /// Records handled so far and the batch size.
    pub position: Option<(usize, usize)>,
}

impl ProgressEvent {
    pub fn phase(phase: &str, detail: impl AsRef<str>) -> Self {
        Self {
            message: format!("phase={phase}; {}", detail.as_ref()),
            elapsed: None,
            position: None,
        }
    }

    pub fn progress(stage: &str, done: usize, total: usize) -> Self {
        Self {
            message: format!("phase={stage}; record {done}/{total}"),
            elapsed: None,
            position: Some((done, total)),
        }
    }

    pub fn finished(phase: &str, started: Instant) -> Self {
        Self {
            message: format!("phase={phase}; done"),
            elapsed: Some(started.elapsed()),
            position: None,
        }
    }

    /// Whole percent of the batch handled, when the event carries a position.
    pub fn percent(&self) -> Option<u8> {
        let (done, total) = self.position?;
        if total == 0 {
            return Some(100);
        }
        Some(((done.min(total) * 100) / total) as u8)
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: OpenAlexClient, P: PageFetcher> {
    store: Store,
    config: ResolvedConfig,
    openalex: C,
    pages: P,
}

impl<C: OpenAlexClient, P: PageFetcher> App<C, P> {
    pub fn new(store: Store, config: ResolvedConfig, openalex: C, pages: P) -> Self {
        Self {
            store,
            config,
            openalex,
            pages,
        }
    }

    pub fn harvest(
        &self,
        hits: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<HarvestResult, PetalError> {
        let started = Instant::now();
        let hits_path = self.store.resolve(hits);
        sink.event(ProgressEvent::phase("Harvest", format!("reading {hits_path}")));
        let hits = harvest::load_hits(&hits_path)?;
        let hit_count = hits.len();
        let records = harvest::records_from_hits(hits, &self.config.label_separator);

        let output = self.store.resolve(output);
        Store::write_records(&output, &records)?;
        sink.event(ProgressEvent::finished("Harvest", started));
        Ok(HarvestResult {
            hits: hit_count,
            records: records.len(),
            output: output.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    pub fn scrape_dois(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ScrapeResult, PetalError> {
        let started = Instant::now();
        let input = self.store.resolve(input);
        sink.event(ProgressEvent::phase("Scrape", format!("reading {input}")));
        let mut records = Store::read_records(&input, LabelColumns::AskNature)?;
        let report = scrape::scrape_dois(&mut records, &self.pages, sink);

        let output = self.store.resolve(output);
        Store::write_records(&output, &records)?;
        sink.event(ProgressEvent::finished("Scrape", started));
        Ok(ScrapeResult {
            report,
            output: output.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    /// Maps AskNature labels to PeTaL labels. Records with any unmapped label
    /// go to the next `papers_to_label_{n}.csv`; the rest go to `output`.
    pub fn convert(
        &self,
        input: &Utf8Path,
        function_map: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertResult, PetalError> {
        let started = Instant::now();
        let (report, batch, manual_review) = self.convert_records(input, function_map, sink)?;
        let (mapped, _) = taxonomy::partition(batch);

        let output = self.store.resolve(output);
        Store::write_records(&output, &mapped)?;
        sink.event(ProgressEvent::finished("Convert", started));
        Ok(ConvertResult {
            report,
            output: output.to_string(),
            manual_review,
            finished_at: iso_timestamp(),
        })
    }

    pub fn enrich(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<EnrichResult, PetalError> {
        let started = Instant::now();
        let input = self.store.resolve(input);
        sink.event(ProgressEvent::phase("Enrich", format!("reading {input}")));
        let mut records = Store::read_records(&input, LabelColumns::Petal)?;
        let report = Enricher::new(&self.openalex).enrich_batch(&mut records, sink);

        let output = self.store.resolve(output);
        Store::write_records(&output, &records)?;
        sink.event(ProgressEvent::finished("Enrich", started));
        Ok(EnrichResult {
            report,
            output: output.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    /// Merges a labeled batch into the golden dataset. Ids given to appended
    /// records are written back to the batch file, so merging it again
    /// updates those records instead of appending duplicates.
    pub fn merge(
        &self,
        golden: &Utf8Path,
        batch: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<MergeResult, PetalError> {
        let started = Instant::now();
        let golden_path = self.store.resolve(golden);
        let batch_path = self.store.resolve(batch);
        sink.event(ProgressEvent::phase("Merge", format!("reading {batch_path}")));
        let mut records = Store::read_records(&batch_path, LabelColumns::Petal)?;

        let mut dataset = load_golden_or_empty(&golden_path)?;
        let report = dataset.merge(&records);
        // Batch before golden: ids the golden file never received are
        // reassigned on the next merge.
        if report.appended > 0 {
            report.apply_assignments(&mut records);
            Store::write_records(&batch_path, &records)?;
        }
        dataset.save(&golden_path)?;
        sink.event(ProgressEvent::finished("Merge", started));
        Ok(MergeResult {
            golden_size: dataset.len(),
            report,
            golden: golden_path.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    pub fn validate(
        &self,
        golden: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, PetalError> {
        let golden_path = self.store.resolve(golden);
        sink.event(ProgressEvent::phase("Validate", format!("reading {golden_path}")));
        let dataset = GoldenDataset::load(&golden_path)?;
        let report = validate::validate(dataset.records(), &self.config.allowed_level1);
        Ok(ValidateResult {
            report,
            golden: golden_path.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    /// convert -> enrich -> merge -> validate on one labeled batch. Ids given
    /// to appended records are written back to `input`, so running the same
    /// batch again updates those records instead of appending duplicates.
    pub fn run(
        &self,
        input: &Utf8Path,
        function_map: &Utf8Path,
        golden: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, PetalError> {
        let started = Instant::now();
        let (conversion, mut batch, manual_review) =
            self.convert_records(input, function_map, sink)?;
        let mapped_indices: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.manual_label)
            .map(|(idx, _)| idx)
            .collect();
        let mut mapped: Vec<PaperRecord> =
            mapped_indices.iter().map(|&idx| batch[idx].clone()).collect();

        sink.event(ProgressEvent::phase("Enrich", format!("{} records", mapped.len())));
        let enrichment = Enricher::new(&self.openalex).enrich_batch(&mut mapped, sink);

        let golden_path = self.store.resolve(golden);
        sink.event(ProgressEvent::phase("Merge", format!("into {golden_path}")));
        let mut dataset = load_golden_or_empty(&golden_path)?;
        let merge = dataset.merge(&mapped);
        if merge.appended > 0 {
            merge.apply_assignments(&mut mapped);
            for (&idx, record) in mapped_indices.iter().zip(&mapped) {
                batch[idx].petal_id = record.petal_id;
            }
            Store::write_records(&self.store.resolve(input), &batch)?;
        }
        dataset.save(&golden_path)?;

        sink.event(ProgressEvent::phase("Validate", format!("{} records", dataset.len())));
        let validation = validate::validate(dataset.records(), &self.config.allowed_level1);
        sink.event(ProgressEvent::finished("Run", started));

        Ok(RunResult {
            conversion,
            manual_review,
            enrichment,
            merge,
            validation,
            golden: golden_path.to_string(),
            finished_at: iso_timestamp(),
        })
    }

    /// Converts the whole batch in place and writes the held-out part to the
    /// next manual-review file.
    fn convert_records(
        &self,
        input: &Utf8Path,
        function_map: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<(ConversionReport, Vec<PaperRecord>, Option<String>), PetalError> {
        let map_path = self.store.resolve(function_map);
        sink.event(ProgressEvent::phase("Convert", format!("loading {map_path}")));
        let map = FunctionMap::load(map_path.as_std_path())?;

        let input = self.store.resolve(input);
        sink.event(ProgressEvent::phase("Convert", format!("reading {input}")));
        let mut records = Store::read_records(&input, LabelColumns::AskNature)?;
        let report = taxonomy::convert_batch(&map, &mut records);
        let held_out: Vec<PaperRecord> = records
            .iter()
            .filter(|record| record.manual_label)
            .cloned()
            .collect();

        let manual_review = if held_out.is_empty() {
            None
        } else {
            let path = self.store.next_papers_to_label_path()?;
            Store::write_records_csv(&path, &held_out)?;
            info!(count = held_out.len(), path = %path, "records held out for manual labeling");
            Some(path.to_string())
        };
        Ok((report, records, manual_review))
    }
}

fn load_golden_or_empty(path: &Utf8Path) -> Result<GoldenDataset, PetalError> {
    if path.as_std_path().exists() {
        GoldenDataset::load(path)
    } else {
        info!(path = %path, "no golden dataset yet, starting empty");
        Ok(GoldenDataset::default())
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
