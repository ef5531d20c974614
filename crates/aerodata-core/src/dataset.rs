use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d.%m.%Y", "%d/%m/%Y", "%Y%m%d",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M",
];

/// Parses a calendar date written in one of the conventions seen in station exports.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.len() < 8 {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| parse_datetime(text).map(|dt| dt.date()))
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// ISO form used for date-named columns on the wide daily-totals table.
pub fn iso_date_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// One source cell before column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Best-effort typing of a delimited-text field.
    pub fn from_text(raw: &str, decimal_comma: bool) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return Cell::Null;
        }
        if let Ok(value) = text.parse::<i64>() {
            return Cell::Int(value);
        }
        let numeric = if decimal_comma && !text.contains('.') {
            text.replacen(',', ".", 1)
        } else {
            text.to_string()
        };
        match numeric.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Float(value),
            _ => Cell::Text(text.to_string()),
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Bool(v) => Some(v.to_string()),
            Cell::Text(v) => Some(v.clone()),
            Cell::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// Builds a typed series from loosely typed cells: integers, floats, booleans and
/// date-times keep their type when the whole column agrees, anything mixed becomes text.
pub fn cells_to_series(name: &str, cells: &[Cell]) -> PolarsResult<Series> {
    let present = || cells.iter().filter(|c| !matches!(c, Cell::Null));
    let name: PlSmallStr = name.into();

    if present().next().is_none() {
        let values: Vec<Option<&str>> = vec![None; cells.len()];
        return Ok(Series::new(name, values));
    }

    if present().all(|c| matches!(c, Cell::Int(_))) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Int(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }

    if present().all(|c| matches!(c, Cell::Int(_) | Cell::Float(_))) {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Int(v) => Some(*v as f64),
                Cell::Float(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }

    if present().all(|c| matches!(c, Cell::Bool(_))) {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|c| match c {
                Cell::Bool(v) => Some(*v),
                _ => None,
            })
            .collect();
        return Ok(Series::new(name, values));
    }

    if present().all(|c| matches!(c, Cell::DateTime(_))) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::DateTime(v) => Some(v.and_utc().timestamp_micros()),
                _ => None,
            })
            .collect();
        return Series::new(name, values)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None));
    }

    let values: Vec<Option<String>> = cells.iter().map(Cell::render).collect();
    Ok(Series::new(name, values))
}

/// Names a header row: blanks become `Unnamed: <index>` (index 1 becomes `Particle`)
/// and repeated names get `.1`, `.2` suffixes.
pub fn finish_headers(raw: Vec<Option<String>>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    for (index, header) in raw.into_iter().enumerate() {
        let base = match header.map(|h| h.trim().trim_start_matches('\u{feff}').to_string()) {
            Some(h) if !h.is_empty() => h,
            _ if index == 1 => "Particle".to_string(),
            _ => format!("Unnamed: {index}"),
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}

/// In-memory tabular data loaded from one source file.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    frame: DataFrame,
    /// Columns whose header cell was itself a date value rather than text.
    dated_headers: BTreeSet<String>,
}

impl Dataset {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            dated_headers: BTreeSet::new(),
        }
    }

    pub fn with_dated_headers(mut self, dated_headers: BTreeSet<String>) -> Self {
        self.dated_headers = dated_headers;
        self
    }

    /// Assembles a dataset from named cell columns of equal length.
    pub fn from_cells(columns: Vec<(String, Vec<Cell>)>) -> PolarsResult<Self> {
        let series = columns
            .iter()
            .map(|(name, cells)| cells_to_series(name, cells).map(Column::from))
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(Self::new(DataFrame::new(series)?))
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn has_dated_header(&self) -> bool {
        !self.dated_headers.is_empty()
    }

    pub fn series(&self, name: &str) -> PolarsResult<Series> {
        Ok(self.frame.column(name)?.as_materialized_series().clone())
    }

    pub fn rename(&mut self, from: &str, to: &str) -> PolarsResult<()> {
        self.frame.rename(from, to.into())?;
        if self.dated_headers.remove(from) {
            self.dated_headers.insert(to.to_string());
        }
        Ok(())
    }

    pub fn replace_column(&mut self, series: Series) -> PolarsResult<()> {
        self.frame.with_column(series)?;
        Ok(())
    }

    /// Keeps only the named columns, in the given order.
    pub fn retain(&mut self, columns: &[String]) -> PolarsResult<()> {
        self.frame = self.frame.select(columns.iter().cloned())?;
        self.dated_headers.retain(|name| columns.contains(name));
        Ok(())
    }
}
