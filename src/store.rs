use std::collections::HashMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use tracing::warn;

use crate::domain::{BiomimicryStatus, FieldValue, PaperRecord};
use crate::error::PetalError;
use crate::labels;

const PAPERS_TO_LABEL_DIR: &str = "papers_to_label";

const CSV_COLUMNS: &[&str] = &[
    "petalID",
    "doi",
    "url",
    "paper",
    "title",
    "abstract",
    "venue_names",
    "venue_ids",
    "author_names",
    "author_ids",
    "reference_ids",
    "mesh_terms",
    "label_level_1",
    "label_level_2",
    "label_level_3",
    "ask_label_level_1",
    "ask_label_level_2",
    "ask_label_level_3",
    "isBiomimicry",
    "isOpenAccess",
    "fullDocLink",
    "species",
    "absolute_relevancy",
    "relative_relevancy",
    "mag_terms",
];

/// Which taxonomy the `label_level_*` columns of a CSV hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColumns {
    /// Freshly harvested rows: AskNature labels come from `ask_label_level_*`
    /// when filled, otherwise from `label_level_*`.
    AskNature,
    /// Converted or hand-labeled rows: `label_level_*` are PeTaL labels and
    /// `ask_label_level_*`, when present, echo the AskNature labels.
    Petal,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn papers_to_label_dir(&self) -> Utf8PathBuf {
        self.root.join(PAPERS_TO_LABEL_DIR)
    }

    /// `papers_to_label_{n}.csv` where `n` counts the CSV files already there.
    pub fn next_papers_to_label_path(&self) -> Result<Utf8PathBuf, PetalError> {
        let dir = self.papers_to_label_dir();
        let existing = if dir.as_std_path().exists() {
            fs::read_dir(dir.as_std_path())
                .map_err(|err| PetalError::Filesystem(err.to_string()))?
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry
                        .path()
                        .extension()
                        .map(|ext| ext == "csv")
                        .unwrap_or(false)
                })
                .count()
        } else {
            0
        };
        Ok(dir.join(format!("papers_to_label_{existing}.csv")))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PetalError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("petal-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_json<T: serde::Serialize>(path: &Utf8Path, value: &T) -> Result<(), PetalError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Reads records from a `.json` array or a `.csv` file.
    pub fn read_records(path: &Utf8Path, columns: LabelColumns) -> Result<Vec<PaperRecord>, PetalError> {
        match path.extension() {
            Some("json") => {
                let content = fs::read_to_string(path.as_std_path())
                    .map_err(|err| PetalError::input_read(path, err))?;
                serde_json::from_str(&content).map_err(|err| PetalError::dataset_parse(path, err))
            }
            _ => {
                let content = fs::read(path.as_std_path())
                    .map_err(|err| PetalError::input_read(path, err))?;
                records_from_csv(&content, columns).map_err(|err| match err {
                    PetalError::DatasetParse { message, .. } => {
                        PetalError::dataset_parse(path, message)
                    }
                    other => other,
                })
            }
        }
    }

    pub fn write_records_csv(path: &Utf8Path, records: &[PaperRecord]) -> Result<(), PetalError> {
        Self::write_bytes_atomic(path, &records_to_csv(records)?)
    }

    /// Writes a `.json` array or, for any other extension, a CSV.
    pub fn write_records(path: &Utf8Path, records: &[PaperRecord]) -> Result<(), PetalError> {
        match path.extension() {
            Some("json") => Self::write_json(path, &records),
            _ => Self::write_records_csv(path, records),
        }
    }
}

/// Parses CSV rows into records. Rows without a `url` are dropped; the rest
/// are ordered by `petalID`, rows without one last.
pub fn records_from_csv(content: &[u8], columns: LabelColumns) -> Result<Vec<PaperRecord>, PetalError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| PetalError::dataset_parse("csv", err))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| PetalError::dataset_parse("csv", err))?;
        let cells: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();
        let record = record_from_cells(&cells, columns)?;
        if record.url.is_present() {
            records.push(record);
        }
    }
    records.sort_by_key(|record| (record.petal_id.is_none(), record.petal_id));
    Ok(records)
}

fn record_from_cells(cells: &HashMap<&str, &str>, columns: LabelColumns) -> Result<PaperRecord, PetalError> {
    let text = |name: &str| -> String {
        match cells.get(name).map(|value| value.trim()) {
            Some("nan") | None => String::new(),
            Some(value) => value.to_string(),
        }
    };
    let list = |name: &str| labels::parse_label_cell(&text(name));
    let level = |name: &str| labels::normalize_level(Some(list(name).as_slice()));
    let values = |name: &str| -> Vec<Value> {
        let raw = text(name);
        if raw.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(&raw.replace('\'', "\"")) {
            Ok(Value::Array(items)) => items,
            _ => list(name).into_iter().map(Value::from).collect(),
        }
    };

    let petal_id = match text("petalID") {
        raw if raw.is_empty() => None,
        raw => {
            let parsed = raw
                .parse::<f64>()
                .map_err(|_| PetalError::dataset_parse("csv", format!("invalid petalID `{raw}`")))?;
            (parsed >= 0.0 && parsed.fract() == 0.0).then_some(parsed as u64)
        }
    };

    let raw_status = text("isBiomimicry");
    let is_biomimicry = raw_status.parse().unwrap_or_else(|_| {
        warn!(value = %raw_status, "unrecognized isBiomimicry value, treating as undetermined");
        BiomimicryStatus::Undetermined
    });

    let mut record = PaperRecord {
        petal_id,
        doi: text("doi"),
        url: text("url"),
        paper: text("paper"),
        title: text("title"),
        abstract_text: text("abstract"),
        venue_names: list("venue_names"),
        venue_ids: list("venue_ids"),
        author_names: list("author_names"),
        author_ids: list("author_ids"),
        reference_ids: list("reference_ids"),
        mesh_terms: list("mesh_terms"),
        is_biomimicry,
        is_open_access: match text("isOpenAccess").to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        full_doc_link: text("fullDocLink"),
        species: list("species"),
        absolute_relevancy: values("absolute_relevancy"),
        relative_relevancy: values("relative_relevancy"),
        mag_terms: list("mag_terms"),
        ..PaperRecord::default()
    };

    let source_levels = [
        level("label_level_1"),
        level("label_level_2"),
        level("label_level_3"),
    ];
    let ask_levels = [
        level("ask_label_level_1"),
        level("ask_label_level_2"),
        level("ask_label_level_3"),
    ];
    match columns {
        LabelColumns::AskNature if ask_levels.iter().all(Vec::is_empty) => {
            record.set_ask_levels(source_levels)
        }
        LabelColumns::AskNature => record.set_ask_levels(ask_levels),
        LabelColumns::Petal => {
            record.set_petal_levels(source_levels.map(|labels| labels::emitted_level(&labels)));
            record.set_ask_levels(ask_levels);
        }
    }
    Ok(record)
}

pub fn records_to_csv(records: &[PaperRecord]) -> Result<Vec<u8>, PetalError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|err| PetalError::Filesystem(err.to_string()))?;
    for record in records {
        let list = |items: &[String]| serde_json::to_string(items).unwrap_or_default();
        let values = |items: &[Value]| serde_json::to_string(items).unwrap_or_default();
        let row = vec![
            record.petal_id.map(|id| id.to_string()).unwrap_or_default(),
            record.doi.clone(),
            record.url.clone(),
            record.paper.clone(),
            record.title.clone(),
            record.abstract_text.clone(),
            list(&record.venue_names),
            list(&record.venue_ids),
            list(&record.author_names),
            list(&record.author_ids),
            list(&record.reference_ids),
            list(&record.mesh_terms),
            list(&record.level1),
            list(&record.level2),
            list(&record.level3),
            list(&record.ask_level1),
            list(&record.ask_level2),
            list(&record.ask_level3),
            record.is_biomimicry.to_string(),
            record
                .is_open_access
                .map(|flag| flag.to_string())
                .unwrap_or_default(),
            record.full_doc_link.clone(),
            list(&record.species),
            values(&record.absolute_relevancy),
            values(&record.relative_relevancy),
            list(&record.mag_terms),
        ];
        writer
            .write_record(&row)
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| PetalError::Filesystem(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn papers_to_label_numbering() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        let first = store.next_papers_to_label_path().unwrap();
        assert!(first.ends_with("papers_to_label/papers_to_label_0.csv"));

        Store::write_bytes_atomic(&first, b"petalID\n").unwrap();
        let second = store.next_papers_to_label_path().unwrap();
        assert!(second.ends_with("papers_to_label/papers_to_label_1.csv"));
    }

    #[test]
    fn csv_rows_without_url_are_dropped_and_sorted() {
        let csv = "petalID,doi,url,label_level_1\n\
                   5,10.1/a,https://a,\"['Attach']\"\n\
                   ,,,\"['Move']\"\n\
                   ,10.1/c,https://c,\n\
                   2.0,10.1/b,https://b,\"['Move', 'Protect from harm']\"\n";
        let records = records_from_csv(csv.as_bytes(), LabelColumns::AskNature).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.petal_id).collect();
        assert_eq!(ids, vec![Some(2), Some(5), None]);
        assert_eq!(records[0].ask_level1, vec!["move", "protect from harm"]);
        assert!(records[0].level1.is_empty());
    }

    #[test]
    fn unknown_biomimicry_values_read_as_undetermined() {
        let csv = "url,isBiomimicry\n\
                   https://a,Y\n\
                   https://b,maybe\n\
                   https://c,Yes\n";
        let records = records_from_csv(csv.as_bytes(), LabelColumns::Petal).unwrap();
        let statuses: Vec<_> = records.iter().map(|r| r.is_biomimicry).collect();
        assert_eq!(
            statuses,
            vec![
                BiomimicryStatus::Yes,
                BiomimicryStatus::Undetermined,
                BiomimicryStatus::Undetermined,
            ]
        );
    }

    #[test]
    fn petal_columns_use_emitted_form() {
        let csv = "url,label_level_1,ask_label_level_1\n\
                   https://a,\"['Modify Color']\",\"['Change color']\"\n";
        let records = records_from_csv(csv.as_bytes(), LabelColumns::Petal).unwrap();
        assert_eq!(records[0].level1, vec!["modify_color"]);
        assert_eq!(records[0].ask_level1, vec!["change color"]);
    }

    #[test]
    fn csv_writer_emits_json_lists() {
        let record = PaperRecord {
            petal_id: Some(4),
            url: "https://a".to_string(),
            level1: vec!["attach".to_string()],
            ..PaperRecord::default()
        };
        let bytes = records_to_csv(&[record]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let reread = records_from_csv(text.as_bytes(), LabelColumns::Petal).unwrap();
        assert_eq!(reread[0].petal_id, Some(4));
        assert_eq!(reread[0].level1, vec!["attach"]);
        assert!(text.contains("\"[\"\"attach\"\"]\""));
    }
}
