//! AskNature -> PeTaL function taxonomy conversion.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::domain::{LEVELS, LabelLevels, PaperRecord};
use crate::error::PetalError;
use crate::labels;

const PETAL_COLUMNS: [&str; LEVELS] = ["Level I", "Level II", "Level III"];
const ASKNATURE_COLUMNS: [&str; LEVELS] = ["ALevel I", "ALevel II", "ALevel III"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRow {
    pub petal: String,
    pub asknature: String,
}

/// Per-level pairing of PeTaL and AskNature labels, in table row order.
#[derive(Debug, Clone, Default)]
pub struct FunctionMap {
    levels: [Vec<MapRow>; LEVELS],
}

impl FunctionMap {
    pub fn load(path: &Path) -> Result<Self, PetalError> {
        let file = File::open(path).map_err(|err| PetalError::input_read(path.display(), err))?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, PetalError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|err| PetalError::FunctionMapParse(err.to_string()))?
            .clone();

        let column = |name: &str| -> Result<usize, PetalError> {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| PetalError::FunctionMapColumn(name.to_string()))
        };
        let mut petal_idx = [0usize; LEVELS];
        let mut ask_idx = [0usize; LEVELS];
        for level in 0..LEVELS {
            petal_idx[level] = column(PETAL_COLUMNS[level])?;
            ask_idx[level] = column(ASKNATURE_COLUMNS[level])?;
        }

        let mut map = FunctionMap::default();
        for row in reader.records() {
            let row = row.map_err(|err| PetalError::FunctionMapParse(err.to_string()))?;
            let cell = |idx: usize| labels::normalize_label(row.get(idx).unwrap_or_default());
            for level in 0..LEVELS {
                map.levels[level].push(MapRow {
                    petal: cell(petal_idx[level]),
                    asknature: cell(ask_idx[level]),
                });
            }
        }
        Ok(map)
    }

    pub fn from_rows(levels: [Vec<(&str, &str)>; LEVELS]) -> Self {
        let levels = levels.map(|rows| {
            rows.into_iter()
                .map(|(petal, asknature)| MapRow {
                    petal: labels::normalize_label(petal),
                    asknature: labels::normalize_label(asknature),
                })
                .collect()
        });
        Self { levels }
    }

    pub fn rows(&self, level: usize) -> &[MapRow] {
        &self.levels[level]
    }

    /// PeTaL label paired with `label` at `level`; the first matching row wins.
    pub fn lookup(&self, level: usize, label: &str) -> Option<&str> {
        let needle = labels::normalize_label(label);
        if needle.is_empty() {
            return None;
        }
        self.levels
            .get(level)?
            .iter()
            .find(|row| !row.asknature.is_empty() && row.asknature == needle)
            .map(|row| row.petal.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConversion {
    pub target: LabelLevels,
    pub source: LabelLevels,
    pub needs_manual_review: bool,
}

pub fn convert_labels(function_map: &FunctionMap, source_labels: &LabelLevels) -> LabelConversion {
    let mut target: LabelLevels = Default::default();
    let mut source: LabelLevels = Default::default();
    let mut needs_manual_review = false;

    for level in 0..LEVELS {
        source[level] = labels::normalize_level(Some(source_labels[level].as_slice()));
        for label in &source[level] {
            match function_map.lookup(level, label) {
                Some(mapped) if !mapped.is_empty() => target[level].push(mapped.to_string()),
                _ => {
                    debug!(level = level + 1, label = %label, "no function map entry");
                    needs_manual_review = true;
                }
            }
        }
    }

    LabelConversion {
        target,
        source,
        needs_manual_review,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub total: usize,
    pub mapped: usize,
    pub manual: usize,
}

/// Rewrites each record's labels in place: AskNature levels are echoed, PeTaL
/// levels receive the mapped labels in emitted form.
pub fn convert_batch(function_map: &FunctionMap, records: &mut [PaperRecord]) -> ConversionReport {
    let mut report = ConversionReport {
        total: records.len(),
        ..ConversionReport::default()
    };
    for record in records.iter_mut() {
        let conversion = convert_labels(function_map, &record.ask_levels());
        record.set_petal_levels(conversion.target.map(|level| labels::emitted_level(&level)));
        record.set_ask_levels(conversion.source);
        record.manual_label = conversion.needs_manual_review;
        if record.manual_label {
            report.manual += 1;
        } else {
            report.mapped += 1;
        }
    }
    report
}

/// Splits a converted batch into (mapped, held out for manual labeling).
pub fn partition(records: Vec<PaperRecord>) -> (Vec<PaperRecord>, Vec<PaperRecord>) {
    records.into_iter().partition(|record| !record.manual_label)
}
