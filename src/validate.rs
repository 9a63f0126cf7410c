//! Data-quality rules run over a golden dataset after a merge.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::PaperRecord;

/// PeTaL level-1 functions, in emitted form.
pub const DEFAULT_LEVEL1_LABELS: [&str; 12] = [
    "attach",
    "modify_color/camouflage",
    "modify_size/shape/material_properties",
    "modify/convert_energy",
    "assemble/break_down_structure",
    "move_on/through_solids_liquids_gases",
    "protect_from_living/non-living_threats",
    "manage_mechanical_forces",
    "sustain_ecological_community",
    "chemically_assemble/break_down",
    "sense_send_process_information",
    "manipulate_solids_liquids_gases_energy",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateId {
    pub petal_id: u64,
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LabelViolation {
    pub row: usize,
    pub petal_id: Option<u64>,
    pub unexpected: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub success: bool,
    pub missing_ids: Vec<usize>,
    pub duplicate_ids: Vec<DuplicateId>,
    pub level1_violations: Vec<LabelViolation>,
}

pub fn validate(records: &[PaperRecord], allowed_level1: &[String]) -> ValidationReport {
    let mut missing_ids = Vec::new();
    let mut rows_by_id: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    let mut level1_violations = Vec::new();

    for (row, record) in records.iter().enumerate() {
        match record.petal_id {
            Some(id) => rows_by_id.entry(id).or_default().push(row),
            None => missing_ids.push(row),
        }

        let unexpected: Vec<String> = record
            .level1
            .iter()
            .filter(|label| !allowed_level1.contains(label))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            level1_violations.push(LabelViolation {
                row,
                petal_id: record.petal_id,
                unexpected,
            });
        }
    }

    let duplicate_ids: Vec<DuplicateId> = rows_by_id
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(petal_id, rows)| DuplicateId { petal_id, rows })
        .collect();

    let success =
        missing_ids.is_empty() && duplicate_ids.is_empty() && level1_violations.is_empty();
    if success {
        info!(total = records.len(), "golden dataset passed validation");
    } else {
        warn!(
            missing = missing_ids.len(),
            duplicates = duplicate_ids.len(),
            label_violations = level1_violations.len(),
            "golden dataset failed validation"
        );
    }

    ValidationReport {
        total: records.len(),
        success,
        missing_ids,
        duplicate_ids,
        level1_violations,
    }
}
