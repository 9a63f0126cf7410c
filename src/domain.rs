use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PetalError;
use crate::identifiers;
use crate::labels;

/// Number of hierarchy levels in both taxonomies.
pub const LEVELS: usize = 3;

/// Label sets for the three hierarchy levels of one record, broadest first.
pub type LabelLevels = [Vec<String>; LEVELS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BiomimicryStatus {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
    #[default]
    #[serde(rename = "undetermined")]
    Undetermined,
}

impl fmt::Display for BiomimicryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiomimicryStatus::Yes => write!(f, "Y"),
            BiomimicryStatus::No => write!(f, "N"),
            BiomimicryStatus::Undetermined => write!(f, "undetermined"),
        }
    }
}

impl FromStr for BiomimicryStatus {
    type Err = PetalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Y" | "y" => Ok(BiomimicryStatus::Yes),
            "N" | "n" => Ok(BiomimicryStatus::No),
            "" | "undetermined" | "nan" => Ok(BiomimicryStatus::Undetermined),
            other => Err(PetalError::InvalidBiomimicryStatus(other.to_string())),
        }
    }
}

/// A normalized DOI: registry prefix plus suffix, stored uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Doi {
    type Err = PetalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let extracted = identifiers::extract_doi(value);
        if extracted.is_empty() {
            return Err(PetalError::InvalidDoi(value.to_string()));
        }
        Ok(Self(extracted))
    }
}

/// "Field present and non-empty": the single rule deciding whether a value
/// carries information during a merge.
pub trait FieldValue {
    fn is_present(&self) -> bool;
}

impl FieldValue for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> FieldValue for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> FieldValue for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl FieldValue for BiomimicryStatus {
    fn is_present(&self) -> bool {
        *self != BiomimicryStatus::Undetermined
    }
}

impl FieldValue for Value {
    fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(text) => text.is_present(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    #[serde(
        rename = "petalID",
        default,
        deserialize_with = "de_petal_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub petal_id: Option<u64>,
    #[serde(default, deserialize_with = "de_string")]
    pub doi: String,
    #[serde(default, deserialize_with = "de_string")]
    pub url: String,
    #[serde(default, deserialize_with = "de_string")]
    pub paper: String,
    #[serde(default, deserialize_with = "de_list")]
    pub level1: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub level2: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub level3: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub ask_level1: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub ask_level2: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub ask_level3: Vec<String>,
    #[serde(skip)]
    pub manual_label: bool,
    #[serde(default, deserialize_with = "de_string")]
    pub title: String,
    #[serde(rename = "abstract", default, deserialize_with = "de_string")]
    pub abstract_text: String,
    #[serde(default, deserialize_with = "de_list")]
    pub venue_names: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub venue_ids: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub author_names: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub author_ids: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub reference_ids: Vec<String>,
    #[serde(default, deserialize_with = "de_list")]
    pub mesh_terms: Vec<String>,
    #[serde(
        rename = "isOpenAccess",
        default,
        deserialize_with = "de_opt_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_open_access: Option<bool>,
    #[serde(rename = "fullDocLink", default, deserialize_with = "de_string")]
    pub full_doc_link: String,
    #[serde(rename = "isBiomimicry", default, deserialize_with = "de_status")]
    pub is_biomimicry: BiomimicryStatus,
    #[serde(default, deserialize_with = "de_list")]
    pub species: Vec<String>,
    #[serde(default, deserialize_with = "de_values")]
    pub absolute_relevancy: Vec<Value>,
    #[serde(default, deserialize_with = "de_values")]
    pub relative_relevancy: Vec<Value>,
    #[serde(default, deserialize_with = "de_list")]
    pub mag_terms: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

macro_rules! overwrite_present {
    ($target:expr, $source:expr, $changed:expr, $($field:ident => $name:literal),+ $(,)?) => {
        $(
            if $source.$field.is_present() && $target.$field != $source.$field {
                $target.$field = $source.$field.clone();
                $changed.push($name.to_string());
            }
        )+
    };
}

impl PaperRecord {
    pub fn petal_levels(&self) -> LabelLevels {
        [self.level1.clone(), self.level2.clone(), self.level3.clone()]
    }

    pub fn ask_levels(&self) -> LabelLevels {
        [
            self.ask_level1.clone(),
            self.ask_level2.clone(),
            self.ask_level3.clone(),
        ]
    }

    pub fn set_petal_levels(&mut self, levels: LabelLevels) {
        let [level1, level2, level3] = levels;
        self.level1 = level1;
        self.level2 = level2;
        self.level3 = level3;
    }

    pub fn set_ask_levels(&mut self, levels: LabelLevels) {
        let [level1, level2, level3] = levels;
        self.ask_level1 = level1;
        self.ask_level2 = level2;
        self.ask_level3 = level3;
    }

    /// Overwrites every field that is present on `incoming`, leaving the rest
    /// untouched. Returns the JSON names of the fields whose value changed.
    pub fn update_from(&mut self, incoming: &PaperRecord) -> Vec<String> {
        let mut changed = Vec::new();
        overwrite_present!(
            self, incoming, changed,
            doi => "doi",
            url => "url",
            paper => "paper",
            level1 => "level1",
            level2 => "level2",
            level3 => "level3",
            ask_level1 => "ask_level1",
            ask_level2 => "ask_level2",
            ask_level3 => "ask_level3",
            title => "title",
            abstract_text => "abstract",
            venue_names => "venue_names",
            venue_ids => "venue_ids",
            author_names => "author_names",
            author_ids => "author_ids",
            reference_ids => "reference_ids",
            mesh_terms => "mesh_terms",
            is_open_access => "isOpenAccess",
            full_doc_link => "fullDocLink",
            is_biomimicry => "isBiomimicry",
            species => "species",
            absolute_relevancy => "absolute_relevancy",
            relative_relevancy => "relative_relevancy",
            mag_terms => "mag_terms",
        );
        for (key, value) in &incoming.extra {
            if value.is_present() && self.extra.get(key) != Some(value) {
                self.extra.insert(key.clone(), value.clone());
                changed.push(key.clone());
            }
        }
        changed
    }
}

fn de_petal_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => {
            if let Some(id) = number.as_u64() {
                return Ok(Some(id));
            }
            match number.as_f64() {
                Some(float) if float >= 0.0 && float.fract() == 0.0 => Ok(Some(float as u64)),
                _ => Err(de::Error::custom(format!("invalid petalID: {number}"))),
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "nan" {
                return Ok(None);
            }
            let parsed = trimmed
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid petalID: {text}")))?;
            if parsed < 0.0 || parsed.fract() != 0.0 {
                return Err(de::Error::custom(format!("invalid petalID: {text}")));
            }
            Ok(Some(parsed as u64))
        }
        other => Err(de::Error::custom(format!("invalid petalID: {other}"))),
    }
}

fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

fn de_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::String(text) => labels::parse_label_cell(&text),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

fn de_values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::String(text) if text.trim().is_empty() => Vec::new(),
        other => vec![other],
    })
}

fn de_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => Some(flag),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "y" => Some(true),
            "false" | "0" | "n" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        _ => None,
    })
}

fn de_status<'de, D>(deserializer: D) -> Result<BiomimicryStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(BiomimicryStatus::Undetermined),
        Value::String(text) => text.parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("invalid isBiomimicry: {other}"))),
    }
}
