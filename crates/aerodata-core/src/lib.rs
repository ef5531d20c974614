pub mod error;
pub mod db;
pub mod tables;
pub mod dataset;
pub mod loader;
pub mod classifier;
pub mod schema;
pub mod normalize;
pub mod staging;
pub mod merge;
pub mod maintenance;
pub mod lock;
pub mod ingestion;

pub use error::{IngestError, Result};
pub use ingestion::{ingest, IngestOptions, IngestionReport};
pub use tables::TargetTable;
