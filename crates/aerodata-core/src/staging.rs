use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use polars::prelude::*;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::db::{quote_ident, DbPool};
use crate::error::{IngestError, MergeStage, Result};
use crate::tables::TargetTable;

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;
const MAX_ROWS_PER_INSERT: usize = 1_000;

/// Typed values of one staged column.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedValues {
    Float(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedColumn {
    pub name: String,
    pub values: StagedValues,
}

impl StagedColumn {
    pub fn from_series(series: &Series) -> PolarsResult<Self> {
        let name = series.name().to_string();
        let values = match series.dtype() {
            DataType::Float64 => StagedValues::Float(series.f64()?.into_iter().collect()),
            DataType::Date => {
                let days = series.cast(&DataType::Int32)?;
                StagedValues::Date(
                    days.i32()?
                        .into_iter()
                        .map(|value| value.and_then(days_to_date))
                        .collect(),
                )
            }
            DataType::Datetime(_, _) => {
                let micros = series
                    .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
                    .cast(&DataType::Int64)?;
                StagedValues::Timestamp(
                    micros
                        .i64()?
                        .into_iter()
                        .map(|value| {
                            value.and_then(|m| DateTime::from_timestamp_micros(m).map(|dt| dt.naive_utc()))
                        })
                        .collect(),
                )
            }
            DataType::Boolean => StagedValues::Bool(series.bool()?.into_iter().collect()),
            _ => {
                let text = series.cast(&DataType::String)?;
                StagedValues::Text(
                    text.str()?
                        .into_iter()
                        .map(|value| value.map(str::to_string))
                        .collect(),
                )
            }
        };
        Ok(Self { name, values })
    }

    pub fn sql_type(&self) -> &'static str {
        match self.values {
            StagedValues::Float(_) => "double precision",
            StagedValues::Date(_) => "date",
            StagedValues::Timestamp(_) => "timestamp",
            StagedValues::Bool(_) => "boolean",
            StagedValues::Text(_) => "text",
        }
    }

    fn len(&self) -> usize {
        match &self.values {
            StagedValues::Float(v) => v.len(),
            StagedValues::Date(v) => v.len(),
            StagedValues::Timestamp(v) => v.len(),
            StagedValues::Bool(v) => v.len(),
            StagedValues::Text(v) => v.len(),
        }
    }

    fn push_bind<'args>(&self, row: usize, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        match &self.values {
            StagedValues::Float(v) => values.push_bind(v[row]),
            StagedValues::Date(v) => values.push_bind(v[row]),
            StagedValues::Timestamp(v) => values.push_bind(v[row]),
            StagedValues::Bool(v) => values.push_bind(v[row]),
            StagedValues::Text(v) => values.push_bind(v[row].clone()),
        };
    }
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    TimeDelta::try_days(days.into()).and_then(|delta| NaiveDate::default().checked_add_signed(delta))
}

pub fn staged_columns(dataset: &Dataset) -> PolarsResult<Vec<StagedColumn>> {
    dataset
        .frame()
        .get_columns()
        .iter()
        .map(|column| StagedColumn::from_series(column.as_materialized_series()))
        .collect()
}

/// Staging table names stay under the 63-byte identifier limit.
pub fn staging_name(table: TargetTable) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("stg_{}_{}", table.table_name(), &suffix[..16])
}

pub fn create_sql(name: &str, columns: &[StagedColumn]) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.sql_type()))
        .collect();
    format!(
        "CREATE UNLOGGED TABLE {} ({})",
        quote_ident(name),
        definitions.join(", ")
    )
}

fn drop_sql(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(name))
}

/// Rows per INSERT so a statement never exceeds the bind parameter limit.
pub fn rows_per_insert(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).clamp(1, MAX_ROWS_PER_INSERT)
}

/// Ephemeral table owned by one ingestion attempt.
///
/// Call [`StagingTable::release`] on every normal exit path; if the guard is dropped
/// without it (e.g. a deadline cancelled the attempt) the drop is issued from a
/// spawned task instead.
#[derive(Debug)]
pub struct StagingTable {
    name: String,
    target: TargetTable,
    pool: Option<DbPool>,
}

impl StagingTable {
    pub async fn create(
        pool: &DbPool,
        target: TargetTable,
        columns: &[StagedColumn],
    ) -> Result<Self> {
        let name = staging_name(target);
        let stage_err = |source: sqlx::Error| IngestError::MergeFailed {
            table: target.table_name(),
            stage: MergeStage::Stage,
            source,
        };

        sqlx::query(&drop_sql(&name))
            .execute(pool)
            .await
            .map_err(stage_err)?;
        sqlx::query(&create_sql(&name, columns))
            .execute(pool)
            .await
            .map_err(stage_err)?;

        debug!(staging_table = %name, "created staging table");
        Ok(Self {
            name,
            target,
            pool: Some(pool.clone()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bulk-loads the staged columns, chunked by the bind parameter limit.
    pub async fn load(&self, columns: &[StagedColumn]) -> Result<u64> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(0);
        };
        let rows = columns.first().map(StagedColumn::len).unwrap_or(0);
        if rows == 0 {
            return Ok(0);
        }

        let column_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
        let chunk = rows_per_insert(columns.len());
        let mut loaded = 0;

        for start in (0..rows).step_by(chunk) {
            let end = (start + chunk).min(rows);
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                quote_ident(&self.name),
                column_list.join(", ")
            ));
            builder.push_values(start..end, |mut values, row| {
                for column in columns {
                    column.push_bind(row, &mut values);
                }
            });
            let result = builder
                .build()
                .execute(pool)
                .await
                .map_err(|source| IngestError::MergeFailed {
                    table: self.target.table_name(),
                    stage: MergeStage::Stage,
                    source,
                })?;
            loaded += result.rows_affected();
        }

        debug!(staging_table = %self.name, rows = loaded, "loaded staging table");
        Ok(loaded)
    }

    /// Drops the staging table. Failure is reported, never raised.
    pub async fn release(mut self) -> std::result::Result<(), IngestError> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };
        match sqlx::query(&drop_sql(&self.name)).execute(&pool).await {
            Ok(_) => {
                info!(staging_table = %self.name, "cleaned up staging table");
                Ok(())
            }
            Err(err) => {
                warn!(staging_table = %self.name, error = %err, "failed to clean up staging table");
                Err(IngestError::CleanupFailed {
                    staging_table: self.name.clone(),
                    message: err.to_string(),
                })
            }
        }
    }
}

impl Drop for StagingTable {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sqlx::query(&drop_sql(&name)).execute(&pool).await {
                        warn!("failed to drop staging table {name} in drop: {err}");
                    }
                });
            }
            Err(_) => warn!("no runtime available to drop staging table {name}"),
        }
    }
}
