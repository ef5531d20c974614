use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use super::LoadError;
use crate::dataset::{finish_headers, Cell, Dataset};

/// Separator and decimal-mark pairing of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimitedConvention {
    /// `;` between fields, `,` as the decimal mark.
    Semicolon,
    /// `,` between fields, `.` as the decimal mark.
    Comma,
}

impl DelimitedConvention {
    fn separator(self) -> u8 {
        match self {
            DelimitedConvention::Semicolon => b';',
            DelimitedConvention::Comma => b',',
        }
    }

    fn decimal_comma(self) -> bool {
        matches!(self, DelimitedConvention::Semicolon)
    }
}

pub fn load_delimited(path: &Path) -> Result<Dataset, LoadError> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    parse_delimited(&content)
}

/// Tries the semicolon/decimal-comma convention first and falls back to plain CSV.
pub fn parse_delimited(content: &str) -> Result<Dataset, LoadError> {
    match parse_with(content, DelimitedConvention::Semicolon) {
        Ok(dataset) => Ok(dataset),
        Err(err) => {
            debug!(error = %err, "semicolon convention rejected, retrying as comma-separated");
            parse_with(content, DelimitedConvention::Comma)
        }
    }
}

fn parse_with(content: &str, convention: DelimitedConvention) -> Result<Dataset, LoadError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(convention.separator())
        .has_headers(false)
        .flexible(false)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(LoadError::Empty),
    };

    if convention == DelimitedConvention::Semicolon && header.len() < 2 {
        return Err(LoadError::Convention {
            convention,
            reason: "header row has a single field".to_string(),
        });
    }

    let names = finish_headers(header.iter().map(|h| Some(h.to_string())).collect());
    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];

    for record in records {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            column.push(Cell::from_text(field, convention.decimal_comma()));
        }
    }

    Ok(Dataset::from_cells(names.into_iter().zip(columns).collect())?)
}
