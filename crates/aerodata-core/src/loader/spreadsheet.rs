use std::collections::BTreeSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use super::LoadError;
use crate::dataset::{finish_headers, iso_date_name, parse_datetime, Cell, Dataset};

/// Reads the first worksheet; its first row is the header.
pub fn load_spreadsheet(path: &Path) -> Result<Dataset, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(LoadError::Empty)?;
    let range = workbook.worksheet_range(&sheet_name)?;
    dataset_from_range(&range)
}

pub fn dataset_from_range(range: &Range<Data>) -> Result<Dataset, LoadError> {
    let mut rows = range.rows();
    let header = rows.next().ok_or(LoadError::Empty)?;

    let mut dated = Vec::with_capacity(header.len());
    let raw_names: Vec<Option<String>> = header
        .iter()
        .map(|cell| match header_date(cell) {
            Some(name) => {
                dated.push(true);
                Some(name)
            }
            None => {
                dated.push(false);
                match cell {
                    Data::Empty => None,
                    other => Some(other.to_string()),
                }
            }
        })
        .collect();
    let names = finish_headers(raw_names);

    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
    for row in rows {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        for (index, column) in columns.iter_mut().enumerate() {
            column.push(row.get(index).map(to_cell).unwrap_or(Cell::Null));
        }
    }

    let dated_headers: BTreeSet<String> = names
        .iter()
        .zip(dated)
        .filter(|(_, is_date)| *is_date)
        .map(|(name, _)| name.clone())
        .collect();

    let dataset = Dataset::from_cells(names.into_iter().zip(columns).collect())?;
    Ok(dataset.with_dated_headers(dated_headers))
}

/// Header cells holding a date value are named by their ISO date.
fn header_date(cell: &Data) -> Option<String> {
    let datetime = match cell {
        Data::DateTime(value) => value.as_datetime(),
        Data::DateTimeIso(text) => parse_datetime(text),
        _ => None,
    }?;
    Some(iso_date_name(datetime.date()))
}

fn to_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Null,
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) => Cell::Float(*v),
        Data::Bool(v) => Cell::Bool(*v),
        Data::String(v) if v.trim().is_empty() => Cell::Null,
        Data::String(v) => Cell::Text(v.trim().to_string()),
        Data::DateTime(v) => v
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or(Cell::Null),
        Data::DateTimeIso(v) => parse_datetime(v)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(v.clone())),
        Data::DurationIso(v) => Cell::Text(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::DataType;

    use super::*;

    fn sheet(rows: &[Vec<Data>]) -> Range<Data> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (rows.len() as u32 - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    #[test]
    fn date_valued_headers_become_iso_columns() {
        let range = sheet(&[
            vec![
                Data::String("Station".into()),
                Data::String("Particle".into()),
                Data::DateTimeIso("2024-05-10T00:00:00".into()),
            ],
            vec![
                Data::String("LTKLAI".into()),
                Data::String("Birch".into()),
                Data::Float(14.0),
            ],
        ]);

        let dataset = dataset_from_range(&range).expect("dataset");
        assert_eq!(
            dataset.column_names(),
            vec!["Station", "Particle", "2024-05-10"]
        );
        assert!(dataset.has_dated_header());
        assert_eq!(
            dataset.series("2024-05-10").expect("date column").dtype(),
            &DataType::Float64
        );
    }

    #[test]
    fn empty_second_header_is_particle() {
        let range = sheet(&[
            vec![
                Data::String("LTSIAU".into()),
                Data::Empty,
                Data::String("00-02".into()),
            ],
            vec![
                Data::String("2024-03-01".into()),
                Data::String("Alnus".into()),
                Data::Int(4),
            ],
            vec![Data::Empty, Data::Empty, Data::Empty],
        ]);

        let dataset = dataset_from_range(&range).expect("dataset");
        assert_eq!(dataset.column_names(), vec!["LTSIAU", "Particle", "00-02"]);
        assert_eq!(dataset.height(), 1);
        assert!(!dataset.has_dated_header());
    }
}
