//! Saved AskNature search hits -> Paper Records.
//!
//! Each hit describes one biological strategy with parallel lists of reference
//! sources; every source link becomes its own record carrying the strategy's
//! function labels.

use std::fs;

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::domain::{BiomimicryStatus, FieldValue, LEVELS, LabelLevels, PaperRecord};
use crate::error::PetalError;
use crate::identifiers;
use crate::labels;

const HIERARCHY_KEYS: [&str; LEVELS] = ["lvl0", "lvl1", "lvl2"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default, rename = "objectID")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub taxonomies_hierarchical: Option<TaxonomiesHierarchical>,
    #[serde(default, deserialize_with = "lenient")]
    pub reference_sources: Option<Sources>,
    #[serde(default, deserialize_with = "lenient")]
    pub sources: Option<Sources>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomiesHierarchical {
    #[serde(default, deserialize_with = "lenient")]
    pub function: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sources {
    #[serde(default, deserialize_with = "lenient")]
    pub source_link: Option<Vec<Option<String>>>,
    #[serde(default, deserialize_with = "lenient")]
    pub source_doi: Option<Vec<Option<String>>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HitsPayload {
    Wrapped { hits: Vec<SearchHit> },
    Bare(Vec<SearchHit>),
}

/// Fields of the wrong shape decode as absent instead of failing the hit.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl SearchHit {
    /// Labels per level, taken from the segment of each hierarchy string that
    /// matches the level's depth.
    pub fn function_levels(&self, separator: &str) -> LabelLevels {
        let mut levels: LabelLevels = Default::default();
        let Some(function) = self
            .taxonomies_hierarchical
            .as_ref()
            .and_then(|taxonomies| taxonomies.function.as_ref())
        else {
            return levels;
        };
        for (depth, key) in HIERARCHY_KEYS.iter().enumerate() {
            let entries = match function.get(*key) {
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                Some(serde_json::Value::String(item)) => vec![item.clone()],
                _ => Vec::new(),
            };
            levels[depth] = entries
                .iter()
                .filter_map(|entry| labels::label_at_level(entry, depth, separator))
                .collect();
        }
        levels
    }

    fn active_sources(&self) -> Option<&Sources> {
        let has_links = |sources: &&Sources| {
            sources
                .source_link
                .as_ref()
                .is_some_and(|links| !links.is_empty())
        };
        self.reference_sources
            .as_ref()
            .filter(has_links)
            .or(self.sources.as_ref())
    }

    pub fn into_records(self, separator: &str) -> Vec<PaperRecord> {
        let levels = self.function_levels(separator);
        let Some(sources) = self.active_sources() else {
            debug!(object_id = ?self.object_id, "hit without sources");
            return Vec::new();
        };
        let links = sources.source_link.clone().unwrap_or_default();
        let dois = sources.source_doi.clone().unwrap_or_default();

        links
            .into_iter()
            .enumerate()
            .map(|(index, link)| {
                let doi = dois
                    .get(index)
                    .cloned()
                    .flatten()
                    .map(|raw| identifiers::extract_doi(&raw))
                    .unwrap_or_default();
                let mut record = PaperRecord {
                    doi,
                    url: link.unwrap_or_default().trim().to_string(),
                    is_biomimicry: BiomimicryStatus::Yes,
                    ..PaperRecord::default()
                };
                record.set_ask_levels(levels.clone());
                record
            })
            .collect()
    }
}

pub fn parse_hits(content: &str) -> Result<Vec<SearchHit>, serde_json::Error> {
    let payload: HitsPayload = serde_json::from_str(content)?;
    Ok(match payload {
        HitsPayload::Wrapped { hits } => hits,
        HitsPayload::Bare(hits) => hits,
    })
}

/// Converts hits to records in hit order, dropping sources without a link.
pub fn records_from_hits(hits: Vec<SearchHit>, separator: &str) -> Vec<PaperRecord> {
    let hit_count = hits.len();
    let records: Vec<PaperRecord> = hits
        .into_iter()
        .flat_map(|hit| hit.into_records(separator))
        .filter(|record| record.url.is_present())
        .collect();
    info!(hits = hit_count, records = records.len(), "harvest finished");
    records
}

pub fn load_hits(path: &Utf8Path) -> Result<Vec<SearchHit>, PetalError> {
    let content =
        fs::read_to_string(path.as_std_path()).map_err(|err| PetalError::input_read(path, err))?;
    parse_hits(&content).map_err(|err| PetalError::dataset_parse(path, err))
}
