//! The golden dataset and the merge that grows it.

use std::fs;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::PaperRecord;
use crate::error::PetalError;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoldenDataset {
    records: Vec<PaperRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeAction {
    Update,
    Append,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeEntry {
    pub batch_index: usize,
    pub petal_id: u64,
    pub action: MergeAction,
    pub changed_fields: Vec<String>,
}

/// Several golden rows share an id; the first one received the update.
#[derive(Debug, Clone, Serialize)]
pub struct MergeInconsistency {
    pub petal_id: u64,
    pub golden_rows: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub updated: usize,
    pub appended: usize,
    pub unchanged: usize,
    pub entries: Vec<MergeEntry>,
    pub inconsistencies: Vec<MergeInconsistency>,
}

impl MergeReport {
    /// Writes the ids given to appended records back onto the batch they came
    /// from, so a later merge of the same batch updates instead of appending.
    pub fn apply_assignments(&self, batch: &mut [PaperRecord]) {
        for entry in &self.entries {
            if entry.action == MergeAction::Append {
                if let Some(record) = batch.get_mut(entry.batch_index) {
                    record.petal_id = Some(entry.petal_id);
                }
            }
        }
    }
}

impl GoldenDataset {
    pub fn new(records: Vec<PaperRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PaperRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_petal_id(&self) -> u64 {
        self.records
            .iter()
            .filter_map(|record| record.petal_id)
            .max()
            .unwrap_or(0)
    }

    pub fn find(&self, petal_id: u64) -> Option<&PaperRecord> {
        self.records
            .iter()
            .find(|record| record.petal_id == Some(petal_id))
    }

    /// LOOKUP -> UPDATE | APPEND for each incoming record, in batch order.
    pub fn merge(&mut self, batch: &[PaperRecord]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut next_id = self.max_petal_id() + 1;

        for (batch_index, incoming) in batch.iter().enumerate() {
            let matches = incoming
                .petal_id
                .map(|id| self.rows_with_id(id))
                .unwrap_or_default();

            match (incoming.petal_id, matches.first()) {
                (Some(petal_id), Some(&row)) => {
                    if matches.len() > 1 {
                        warn!(petal_id, rows = ?matches, "duplicate petalID in golden dataset");
                        if !report
                            .inconsistencies
                            .iter()
                            .any(|item| item.petal_id == petal_id)
                        {
                            report.inconsistencies.push(MergeInconsistency {
                                petal_id,
                                golden_rows: matches.clone(),
                            });
                        }
                    }
                    let changed_fields = self.records[row].update_from(incoming);
                    if changed_fields.is_empty() {
                        report.unchanged += 1;
                    } else {
                        report.updated += 1;
                    }
                    report.entries.push(MergeEntry {
                        batch_index,
                        petal_id,
                        action: MergeAction::Update,
                        changed_fields,
                    });
                }
                _ => {
                    let mut record = incoming.clone();
                    record.petal_id = Some(next_id);
                    record.manual_label = false;
                    self.records.push(record);
                    report.appended += 1;
                    report.entries.push(MergeEntry {
                        batch_index,
                        petal_id: next_id,
                        action: MergeAction::Append,
                        changed_fields: Vec::new(),
                    });
                    next_id += 1;
                }
            }
        }

        info!(
            updated = report.updated,
            unchanged = report.unchanged,
            appended = report.appended,
            total = self.records.len(),
            "golden merge finished"
        );
        report
    }

    fn rows_with_id(&self, petal_id: u64) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.petal_id == Some(petal_id))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, PetalError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PetalError::input_read(path, err))?;
        Self::from_json(&content).map_err(|err| PetalError::dataset_parse(path, err))
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<PaperRecord> = serde_json::from_str(content)?;
        Ok(Self { records })
    }

    /// JSON array with one record object per line.
    pub fn to_json_lines(&self) -> Result<Vec<u8>, PetalError> {
        let mut out = Vec::new();
        out.extend_from_slice(b"[\n");
        for (idx, record) in self.records.iter().enumerate() {
            out.push(b'\t');
            serde_json::to_writer(&mut out, record)
                .map_err(|err| PetalError::Filesystem(err.to_string()))?;
            if idx + 1 < self.records.len() {
                out.push(b',');
            }
            out.push(b'\n');
        }
        out.write_all(b"]\n")
            .map_err(|err| PetalError::Filesystem(err.to_string()))?;
        Ok(out)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), PetalError> {
        Store::write_bytes_atomic(path, &self.to_json_lines()?)
    }
}
