// crates/aerodata-core/src/error.rs

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::loader::LoadError;

/// Which statement of the staging/merge sequence the store rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Stage,
    Lock,
    Count,
    Update,
    Insert,
    Commit,
}

impl std::fmt::Display for MergeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MergeStage::Stage => "staging load",
            MergeStage::Lock => "table lock",
            MergeStage::Count => "row count",
            MergeStage::Update => "update pass",
            MergeStage::Insert => "insert pass",
            MergeStage::Commit => "commit",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported or unreadable file {path}: {source}")]
    UnsupportedFormat {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("could not determine a target table for columns {columns:?}")]
    AmbiguousOrUnknownFormat { columns: Vec<String> },

    #[error("unknown target table '{0}'")]
    UnknownTable(String),

    #[error("file structure doesn't match {table}; missing required columns: {missing:?}")]
    SchemaMismatch {
        table: &'static str,
        missing: Vec<String>,
    },

    #[error("failed to add column \"{column}\" to {table}: {source}")]
    SchemaEvolutionFailed {
        table: &'static str,
        column: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("key column '{column}' not found in the data for {table}; available columns: {available:?}")]
    MissingKeyColumn {
        table: &'static str,
        column: String,
        available: Vec<String>,
    },

    #[error("{stage} failed for {table}: {source}")]
    MergeFailed {
        table: &'static str,
        stage: MergeStage,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to drop staging table {staging_table}: {message}")]
    CleanupFailed {
        staging_table: String,
        message: String,
    },

    #[error("{step} failed for {table}: {message}")]
    MaintenanceFailed {
        table: &'static str,
        step: String,
        message: String,
    },

    #[error("ingestion did not finish within {deadline:?}")]
    DeadlineExceeded { deadline: Duration },

    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Polars operation failed: {0}")]
    Dataset(#[from] polars::error::PolarsError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
