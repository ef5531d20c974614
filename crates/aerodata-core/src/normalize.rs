use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::dataset::{parse_date, parse_datetime, Dataset};
use crate::error::Result;
use crate::schema::LiveSchema;
use crate::tables::{ColumnKind, TargetTable};

/// A dataset whose retained columns all exist in the live schema and carry its types.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub dataset: Dataset,
    pub dropped_columns: Vec<String>,
}

impl Normalized {
    pub fn columns(&self) -> Vec<String> {
        self.dataset.column_names()
    }
}

/// Coerces each known column to its destination type and drops unknown columns.
pub fn normalize(
    mut dataset: Dataset,
    table: TargetTable,
    schema: &LiveSchema,
) -> Result<Normalized> {
    let profile = table.profile();
    for (source, canonical) in profile.aliases {
        if dataset.has_column(source) && !dataset.has_column(canonical) {
            dataset.rename(source, canonical)?;
        }
    }

    let mut retained = Vec::new();
    let mut dropped_columns = Vec::new();
    for name in dataset.column_names() {
        let Some(live) = schema.get(&name) else {
            dropped_columns.push(name);
            continue;
        };
        let coerced = coerce(&dataset.series(&name)?, live.kind())?;
        debug!(column = %name, dtype = %coerced.dtype(), "coerced column");
        dataset.replace_column(coerced)?;
        retained.push(name);
    }

    dataset.retain(&retained)?;
    if !dropped_columns.is_empty() {
        info!(table = %table, columns = ?dropped_columns, "ignoring columns unknown to the target table");
    }

    Ok(Normalized {
        dataset,
        dropped_columns,
    })
}

pub fn coerce(series: &Series, kind: ColumnKind) -> PolarsResult<Series> {
    match kind {
        ColumnKind::Numeric => to_numeric(series),
        ColumnKind::Date => to_date(series),
        ColumnKind::Timestamp => to_timestamp(series),
        ColumnKind::Boolean => to_boolean(series),
        ColumnKind::Text | ColumnKind::Other => series.cast(&DataType::String),
    }
}

/// Permissive numeric parse: text that is not a number becomes null.
///
/// Decimal commas are only honoured at load time, for files read under the
/// semicolon convention; here `1,234` is not a number.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn to_numeric(series: &Series) -> PolarsResult<Series> {
    match series.dtype() {
        DataType::Float64 => Ok(series.clone()),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Boolean => series.cast(&DataType::Float64),
        DataType::String => {
            let values: Vec<Option<f64>> = series
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_number))
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        _ => Ok(Series::new(
            series.name().clone(),
            vec![None::<f64>; series.len()],
        )),
    }
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn to_date(series: &Series) -> PolarsResult<Series> {
    match series.dtype() {
        DataType::Date => Ok(series.clone()),
        DataType::Datetime(_, _) => series.cast(&DataType::Date),
        DataType::String => {
            let days: Vec<Option<i32>> = series
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_date).map(date_to_days))
                .collect();
            Series::new(series.name().clone(), days).cast(&DataType::Date)
        }
        _ => Series::new(series.name().clone(), vec![None::<i32>; series.len()])
            .cast(&DataType::Date),
    }
}

fn datetime_to_micros(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_micros()
}

fn to_timestamp(series: &Series) -> PolarsResult<Series> {
    let target = DataType::Datetime(TimeUnit::Microseconds, None);
    match series.dtype() {
        DataType::Datetime(_, _) | DataType::Date => series.cast(&target),
        DataType::String => {
            let micros: Vec<Option<i64>> = series
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_datetime).map(datetime_to_micros))
                .collect();
            Series::new(series.name().clone(), micros).cast(&target)
        }
        _ => Series::new(series.name().clone(), vec![None::<i64>; series.len()]).cast(&target),
    }
}

fn to_boolean(series: &Series) -> PolarsResult<Series> {
    match series.dtype() {
        DataType::Boolean => Ok(series.clone()),
        DataType::String => {
            let values: Vec<Option<bool>> = series
                .str()?
                .into_iter()
                .map(|value| match value.map(|v| v.trim().to_ascii_lowercase()) {
                    Some(v) if matches!(v.as_str(), "true" | "t" | "yes" | "1") => Some(true),
                    Some(v) if matches!(v.as_str(), "false" | "f" | "no" | "0") => Some(false),
                    _ => None,
                })
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        _ => to_numeric(series)?.cast(&DataType::Boolean),
    }
}
