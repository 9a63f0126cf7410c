use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::PetalError;
use crate::labels::DEFAULT_SEPARATOR;
use crate::validate::DEFAULT_LEVEL1_LABELS;

pub const DEFAULT_CONFIG_FILE: &str = "petal.json";
pub const DEFAULT_OPENALEX_BASE_URL: &str = "https://api.openalex.org";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub openalex: Option<OpenAlexEntry>,
    #[serde(default)]
    pub label_separator: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub allowed_level1: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OpenAlexEntry {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mailto: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAlexSettings {
    pub base_url: String,
    /// Sent as the `mailto` query parameter to join the polite pool.
    pub mailto: Option<String>,
    pub timeout_secs: u64,
    pub retries: usize,
}

impl Default for OpenAlexSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENALEX_BASE_URL.to_string(),
            mailto: None,
            timeout_secs: 30,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub openalex: OpenAlexSettings,
    pub label_separator: String,
    pub workspace: Utf8PathBuf,
    pub allowed_level1: Vec<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `petal.json` in the working directory when it exists.
    /// With neither, every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PetalError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PetalError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PetalError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = OpenAlexSettings::default();
        let openalex = match config.openalex {
            Some(entry) => OpenAlexSettings {
                base_url: entry
                    .base_url
                    .filter(|url| !url.trim().is_empty())
                    .unwrap_or(defaults.base_url),
                mailto: entry.mailto.filter(|mail| !mail.trim().is_empty()),
                timeout_secs: entry.timeout_secs.unwrap_or(defaults.timeout_secs),
                retries: entry.retries.unwrap_or(defaults.retries),
            },
            None => defaults,
        };

        let allowed_level1 = config
            .allowed_level1
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(default_level1_labels);

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            openalex,
            label_separator: config
                .label_separator
                .filter(|separator| !separator.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
            workspace: Utf8PathBuf::from(config.workspace.unwrap_or_else(|| ".".to_string())),
            allowed_level1,
        }
    }
}

pub fn default_level1_labels() -> Vec<String> {
    DEFAULT_LEVEL1_LABELS
        .iter()
        .map(|label| label.to_string())
        .collect()
}
