use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{check_required_columns, classify};
use crate::dataset::Dataset;
use crate::db::DbPool;
use crate::error::{IngestError, Result};
use crate::loader::load_dataset;
use crate::maintenance::{cluster, ensure_indexes, MaintenanceNote, MaintenanceStep};
use crate::merge::{MergePlan, MergeResult};
use crate::normalize::normalize;
use crate::schema::{reconcile, LiveSchema, Reconciliation};
use crate::staging::{staged_columns, StagedColumn, StagingTable};
use crate::tables::TargetTable;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Skips classification and writes into this table.
    pub table_override: Option<TargetTable>,
    /// Upper bound for the whole attempt, including time spent waiting on the table lock.
    pub deadline: Option<Duration>,
}

impl IngestOptions {
    pub fn with_table(mut self, table: TargetTable) -> Self {
        self.table_override = Some(table);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub table: TargetTable,
    pub source: PathBuf,
    pub rows_in_file: usize,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub net_row_change: i64,
    pub columns_added: Vec<String>,
    pub columns_dropped: Vec<String>,
    pub notes: Vec<MaintenanceNote>,
}

impl IngestionReport {
    /// One-line success notice for callers that surface the outcome to a user.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows in file, {} inserted, {} updated, net change {}",
            self.table, self.rows_in_file, self.rows_inserted, self.rows_updated, self.net_row_change
        )
    }
}

/// Everything the merge phase contributes to the report.
struct MergeOutcome {
    result: MergeResult,
    columns_added: Vec<String>,
    columns_dropped: Vec<String>,
    notes: Vec<MaintenanceNote>,
}

/// Loads one file and upserts it into its target table.
///
/// Errors before staging leave no trace in the store. After that point the staging
/// table is always dropped, on failure and on deadline expiry alike. Merges into
/// the same table are serialised by a transaction-scoped lock, so concurrent
/// callers wait their turn. Index, clustering and cleanup failures never fail the
/// call; they are returned as notes on the report.
pub async fn ingest(pool: &DbPool, path: &Path, options: IngestOptions) -> Result<IngestionReport> {
    let attempt = ingest_file(pool, path, options.table_override);
    match options.deadline {
        Some(deadline) => tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| {
                warn!(path = %path.display(), ?deadline, "ingestion deadline exceeded");
                IngestError::DeadlineExceeded { deadline }
            })?,
        None => attempt.await,
    }
}

async fn ingest_file(
    pool: &DbPool,
    path: &Path,
    table_override: Option<TargetTable>,
) -> Result<IngestionReport> {
    let owned = path.to_path_buf();
    let dataset = tokio::task::spawn_blocking(move || load_dataset(&owned))
        .await?
        .map_err(|source| IngestError::UnsupportedFormat {
            path: path.to_path_buf(),
            source,
        })?;
    let rows_in_file = dataset.height();
    info!(
        path = %path.display(),
        rows = rows_in_file,
        columns = ?dataset.column_names(),
        "loaded dataset"
    );

    let table = classify(&dataset, table_override)?;
    check_required_columns(&dataset, table)?;
    info!(table = %table, "target table selected");

    let outcome = merge_into(pool, table, dataset).await?;

    let report = IngestionReport {
        table,
        source: path.to_path_buf(),
        rows_in_file,
        rows_inserted: outcome.result.rows_inserted,
        rows_updated: outcome.result.rows_updated,
        net_row_change: outcome.result.net_change(),
        columns_added: outcome.columns_added,
        columns_dropped: outcome.columns_dropped,
        notes: outcome.notes,
    };
    info!(
        table = %table,
        rows_inserted = report.rows_inserted,
        rows_updated = report.rows_updated,
        net_row_change = report.net_row_change,
        "ingestion finished"
    );
    Ok(report)
}

async fn merge_into(pool: &DbPool, table: TargetTable, mut dataset: Dataset) -> Result<MergeOutcome> {
    let Reconciliation {
        schema,
        added_columns,
    } = reconcile(pool, table, &mut dataset).await?;
    let normalized = normalize(dataset, table, &schema)?;
    let mut notes = ensure_indexes(pool, table).await;

    let columns = staged_columns(&normalized.dataset)?;
    let staging = StagingTable::create(pool, table, &columns).await?;
    let merged = stage_and_merge(pool, &staging, table, &columns, &schema).await;
    if let Err(err) = staging.release().await {
        notes.push(MaintenanceNote::failed(MaintenanceStep::StagingCleanup, &err));
    }
    let result = merged?;

    notes.push(cluster(pool, table).await);

    Ok(MergeOutcome {
        result,
        columns_added: added_columns,
        columns_dropped: normalized.dropped_columns,
        notes,
    })
}

async fn stage_and_merge(
    pool: &DbPool,
    staging: &StagingTable,
    table: TargetTable,
    columns: &[StagedColumn],
    schema: &LiveSchema,
) -> Result<MergeResult> {
    let loaded = staging.load(columns).await?;
    debug!(staging_table = staging.name(), rows = loaded, "staged rows");

    let names: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();
    let plan = MergePlan::new(table, staging.name(), &names, schema)?;
    plan.execute(pool).await
}
