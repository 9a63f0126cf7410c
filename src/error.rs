use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PetalError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid biomimicry status: {0}")]
    InvalidBiomimicryStatus(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("function map is missing required column `{0}`")]
    #[diagnostic(help(
        "expected columns: Level I, Level II, Level III, ALevel I, ALevel II, ALevel III"
    ))]
    FunctionMapColumn(String),

    #[error("failed to parse function map: {0}")]
    FunctionMapParse(String),

    #[error("failed to read input file {path}: {message}")]
    InputRead { path: String, message: String },

    #[error("failed to parse dataset {path}: {message}")]
    DatasetParse { path: String, message: String },

    #[error("OpenAlex request failed: {0}")]
    OpenAlexHttp(String),

    #[error("OpenAlex returned status {status}: {message}")]
    OpenAlexStatus { status: u16, message: String },

    #[error("failed to decode OpenAlex payload: {0}")]
    OpenAlexParse(String),

    #[error("page request failed: {0}")]
    PageHttp(String),

    #[error("page returned status {status} for {url}")]
    PageStatus { status: u16, url: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PetalError {
    pub fn input_read(path: impl ToString, err: impl ToString) -> Self {
        PetalError::InputRead {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn dataset_parse(path: impl ToString, err: impl ToString) -> Self {
        PetalError::DatasetParse {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
