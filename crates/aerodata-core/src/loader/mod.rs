mod delimited;
mod records;
mod spreadsheet;

use std::path::Path;

use thiserror::Error;

use crate::dataset::Dataset;

pub use delimited::{load_delimited, parse_delimited, DelimitedConvention};
pub use records::{load_records, parse_records};
pub use spreadsheet::{dataset_from_range, load_spreadsheet};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file extension '{0}'")]
    UnsupportedExtension(String),

    #[error("file has no extension")]
    MissingExtension,

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("delimited text did not match the {convention:?} convention: {reason}")]
    Convention {
        convention: DelimitedConvention,
        reason: String,
    },

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON records must be objects, found {0}")]
    NotARecord(&'static str),

    #[error("file did not contain a header row")]
    Empty,

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Spreadsheet,
    Records,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or(LoadError::MissingExtension)?
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(SourceFormat::Delimited),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Ok(SourceFormat::Spreadsheet),
            "json" => Ok(SourceFormat::Records),
            _ => Err(LoadError::UnsupportedExtension(ext)),
        }
    }
}

/// Loads a file of unknown origin into a [`Dataset`], choosing the strategy by extension.
pub fn load_dataset(path: &Path) -> Result<Dataset, LoadError> {
    match SourceFormat::from_path(path)? {
        SourceFormat::Delimited => load_delimited(path),
        SourceFormat::Spreadsheet => load_spreadsheet(path),
        SourceFormat::Records => load_records(path),
    }
}
