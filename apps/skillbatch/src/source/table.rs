//! Tabular file access: CSV and spreadsheet (xlsx/xls/ods) sources read into a
//! header + rows shape, and spreadsheet export for the reconciled output.

use std::fmt;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet read error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] XlsxError),

    #[error("Workbook has no worksheets")]
    EmptyWorkbook,

    #[error("Column '{0}' not found")]
    MissingColumn(String),
}

/// One cell value, kept close to what the file actually held so exports keep
/// numbers as numbers. CSV fields are always text; only spreadsheets carry
/// typed cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    /// A CSV field as written: empty or text, never reinterpreted.
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(field.to_string())
        }
    }

    /// Interprets text as a number, preferring integers, then floats.
    pub fn parse(field: &str) -> Self {
        if field.is_empty() {
            Cell::Empty
        } else if let Ok(i) = field.parse::<i64>() {
            Cell::Int(i)
        } else if let Ok(f) = field.parse::<f64>() {
            Cell::Float(f)
        } else {
            Cell::Text(field.to_string())
        }
    }

    /// Reads the cell as a non-negative integer identifier.
    pub fn as_id(&self) -> Option<u64> {
        match self {
            Cell::Int(i) => u64::try_from(*i).ok(),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 && *f >= 0.0 => Some(*f as u64),
            Cell::Text(s) => match Cell::parse(s.trim()) {
                Cell::Text(_) => None,
                parsed => parsed.as_id(),
            },
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Header row plus data rows. Rows may be shorter than the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: Cell) {
        if let Some(r) = self.rows.get_mut(row) {
            if r.len() <= col {
                r.resize(col + 1, Cell::Empty);
            }
            r[col] = value;
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Csv,
    Spreadsheet,
}

fn format_of(path: &Path) -> Format {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => Format::Csv,
        _ => Format::Spreadsheet,
    }
}

/// Reads the whole table.
pub fn read_table(path: &Path) -> Result<Table, TableError> {
    read_table_window(path, 0, usize::MAX)
}

/// Reads the header and up to `take` data rows after skipping `skip` data rows.
pub fn read_table_window(path: &Path, skip: usize, take: usize) -> Result<Table, TableError> {
    match format_of(path) {
        Format::Csv => {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
            let headers = reader.headers()?.iter().map(str::to_string).collect();
            let mut rows = Vec::new();
            for record in reader.records().skip(skip).take(take) {
                let record = record?;
                rows.push(record.iter().map(Cell::from_field).collect());
            }
            Ok(Table { headers, rows })
        }
        Format::Spreadsheet => {
            let mut workbook = open_workbook_auto(path)?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or(TableError::EmptyWorkbook)??;

            let mut sheet_rows = range.rows();
            let headers = sheet_rows
                .next()
                .map(|h| h.iter().map(|c| Cell::from(c).to_string()).collect())
                .unwrap_or_default();
            let rows = sheet_rows
                .skip(skip)
                .take(take)
                .map(|r| r.iter().map(Cell::from).collect())
                .collect();
            Ok(Table { headers, rows })
        }
    }
}

/// Number of data rows (the header is not counted).
pub fn count_rows(path: &Path) -> Result<usize, TableError> {
    match format_of(path) {
        Format::Csv => {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
            let mut count = 0;
            for record in reader.records() {
                record?;
                count += 1;
            }
            Ok(count)
        }
        Format::Spreadsheet => {
            let mut workbook = open_workbook_auto(path)?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or(TableError::EmptyWorkbook)??;
            Ok(range.height().saturating_sub(1))
        }
    }
}

/// Writes the table as a single-sheet xlsx workbook.
pub fn write_spreadsheet(table: &Table, path: &Path) -> Result<(), TableError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, header)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) if s.is_empty() => {}
                Cell::Int(i) => {
                    worksheet.write_number(row_num, col, *i as f64)?;
                }
                // xlsx has no NaN or infinity
                Cell::Float(f) if !f.is_finite() => {
                    worksheet.write_string(row_num, col, f.to_string())?;
                }
                Cell::Float(f) => {
                    worksheet.write_number(row_num, col, *f)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(row_num, col, *b)?;
                }
                Cell::Text(s) => {
                    worksheet.write_string(row_num, col, s)?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}
