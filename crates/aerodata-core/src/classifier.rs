use tracing::debug;

use crate::dataset::{parse_date, Dataset};
use crate::error::{IngestError, Result};
use crate::tables::{TargetTable, BI_HOURLY_BUCKETS};

/// One classification rule: a pure check over the dataset's columns.
pub struct ClassificationRule {
    pub name: &'static str,
    pub classify: fn(&Dataset) -> Option<TargetTable>,
}

/// Rules in priority order; the first match wins.
pub static RULES: [ClassificationRule; 3] = [
    ClassificationRule {
        name: "sensor_readings",
        classify: sensor_readings,
    },
    ClassificationRule {
        name: "daily_totals",
        classify: daily_totals,
    },
    ClassificationRule {
        name: "bi_hourly",
        classify: bi_hourly,
    },
];

/// Timestamped readings with a pollen measurement go to the generic sensor table.
pub fn sensor_readings(dataset: &Dataset) -> Option<TargetTable> {
    (dataset.has_column("time") && dataset.has_column("pollen")).then_some(TargetTable::PollenSense)
}

/// Any date-named or date-valued column header marks the wide daily-totals layout.
pub fn daily_totals(dataset: &Dataset) -> Option<TargetTable> {
    let dated_name = dataset
        .column_names()
        .iter()
        .any(|name| parse_date(name).is_some());
    (dated_name || dataset.has_dated_header()).then_some(TargetTable::DailyParticleTotals)
}

/// Bi-hourly buckets select a station table by its station column, first station by default.
pub fn bi_hourly(dataset: &Dataset) -> Option<TargetTable> {
    if !BI_HOURLY_BUCKETS
        .iter()
        .any(|bucket| dataset.has_column(bucket))
    {
        return None;
    }
    let station = TargetTable::STATIONS
        .into_iter()
        .find(|table| {
            table
                .station_column()
                .is_some_and(|column| dataset.has_column(column))
        })
        .unwrap_or(TargetTable::LtklaiBiHourly);
    Some(station)
}

/// Picks the target table, trusting an explicit override without checking columns.
pub fn classify(dataset: &Dataset, table_override: Option<TargetTable>) -> Result<TargetTable> {
    if let Some(table) = table_override {
        debug!(table = %table, "using explicit table override");
        return Ok(table);
    }

    for rule in RULES.iter() {
        if let Some(table) = (rule.classify)(dataset) {
            debug!(rule = rule.name, table = %table, "classified dataset");
            return Ok(table);
        }
    }

    Err(IngestError::AmbiguousOrUnknownFormat {
        columns: dataset.column_names(),
    })
}

/// Table-specific gate run after classification.
pub fn check_required_columns(dataset: &Dataset, table: TargetTable) -> Result<()> {
    let names = dataset.column_names();
    let missing = table
        .profile()
        .missing_required(names.iter().map(String::as_str));
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::SchemaMismatch {
            table: table.table_name(),
            missing,
        })
    }
}
