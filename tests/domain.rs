use assert_matches::assert_matches;

use petal_curator::domain::{BiomimicryStatus, FieldValue, PaperRecord};
use petal_curator::error::PetalError;
use serde_json::json;

#[test]
fn parse_biomimicry_status() {
    assert_eq!("Y".parse::<BiomimicryStatus>().unwrap(), BiomimicryStatus::Yes);
    assert_eq!("".parse::<BiomimicryStatus>().unwrap(), BiomimicryStatus::Undetermined);
    let err = "maybe".parse::<BiomimicryStatus>().unwrap_err();
    assert_matches!(err, PetalError::InvalidBiomimicryStatus(_));
}

#[test]
fn golden_row_with_stringified_lists() {
    let record: PaperRecord = serde_json::from_value(json!({
        "petalID": "12.0",
        "doi": null,
        "level1": "['attach', 'manage_mechanical_forces']",
        "author_names": ["A. Author", null],
        "isOpenAccess": "True",
        "isBiomimicry": "N"
    }))
    .unwrap();

    assert_eq!(record.petal_id, Some(12));
    assert!(!record.doi.is_present());
    assert_eq!(record.level1, vec!["attach", "manage_mechanical_forces"]);
    assert_eq!(record.author_names, vec!["A. Author"]);
    assert_eq!(record.is_open_access, Some(true));
    assert_eq!(record.is_biomimicry, BiomimicryStatus::No);
}

#[test]
fn manual_flag_is_not_persisted() {
    let record = PaperRecord {
        petal_id: Some(3),
        manual_label: true,
        ..PaperRecord::default()
    };
    let value = serde_json::to_value(&record).unwrap();
    assert!(value.get("manual_label").is_none());
    assert_eq!(value["petalID"], json!(3));
    assert_eq!(value["isBiomimicry"], json!("undetermined"));
}
