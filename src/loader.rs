//! Decoding of uploaded files into a [`Table`].
//!
//! Two formats are accepted, picked by file extension: `.csv` (strict
//! UTF-8, first record is the header) and `.xlsx` (first worksheet,
//! first row is the header). Anything else is rejected up front.

use crate::table::{Column, ShapeError, Table, Value, is_numeric_str};
use calamine::{Data, Reader, Xlsx, XlsxError};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Why an upload could not be decoded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("file name has no extension")]
    MissingExtension,
    #[error("file contains no columns")]
    NoColumns,
    #[error("workbook contains no worksheets")]
    NoWorksheet,
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Xlsx(#[from] XlsxError),
    #[error("{0}")]
    Shape(#[from] ShapeError),
}

/// Decode an uploaded file.
///
/// `filename` is the name the client supplied for the upload; only its
/// extension is consulted. The whole payload is decoded in one pass, so
/// either a complete [`Table`] comes back or a [`LoadError`] describing
/// the first problem found.
pub fn load_table(filename: &str, bytes: &[u8]) -> Result<Table, LoadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(bytes),
        Some("xlsx") => from_xlsx(bytes),
        Some(ext) => Err(LoadError::UnsupportedExtension(ext.to_string())),
        None => Err(LoadError::MissingExtension),
    }
}

/// Decode CSV bytes. The first record names the columns.
///
/// A column becomes numeric only when every non-empty field in it reads
/// as a number; otherwise every field is kept as raw text. Ragged rows
/// and invalid UTF-8 are decode errors, not data.
pub fn from_csv(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut reader = csv::ReaderBuilder::new().from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::NoColumns);
    }

    let mut fields: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            fields[i].push(field.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(fields)
        .map(|(name, raw)| Column::new(name, column_values(raw)))
        .collect();

    Ok(Table::new(columns)?)
}

/// Convert one CSV column of raw fields into typed cells.
fn column_values(raw: Vec<String>) -> Vec<Value> {
    let numeric = raw.iter().any(|s| !s.is_empty())
        && raw.iter().all(|s| s.is_empty() || is_numeric_str(s));

    raw.into_iter()
        .map(|s| {
            if s.is_empty() {
                Value::Empty
            } else if numeric {
                match s.trim().parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Text(s),
                }
            } else {
                Value::Text(s)
            }
        })
        .collect()
}

/// Decode XLSX bytes from the first worksheet.
pub fn from_xlsx(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(LoadError::NoWorksheet)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(|cell| cell_value(cell).render()).collect(),
        None => return Err(LoadError::NoColumns),
    };
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::NoColumns);
    }

    let mut cells: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < headers.len() {
                cells[i].push(cell_value(cell));
            }
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name, values))
        .collect();

    Ok(Table::new(columns)?)
}

/// Map a worksheet cell onto the table's value model.
///
/// Dates keep their Excel serial number, booleans become text, and
/// error cells read as empty.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) if s.is_empty() => Value::Empty,
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Text(b.to_string()),
        Data::DateTime(dt) => Value::Number(dt.as_f64()),
        Data::DateTimeIso(s) => Value::Text(s.clone()),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) => Value::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnType;

    fn sample_xlsx() -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "region").unwrap();
        sheet.write_string(0, 1, "sales").unwrap();
        sheet.write_string(1, 0, "north").unwrap();
        sheet.write_number(1, 1, 120.0).unwrap();
        sheet.write_string(2, 0, "south").unwrap();
        sheet.write_number(2, 1, 95.5).unwrap();
        sheet.write_string(3, 0, "north").unwrap();
        sheet.write_number(3, 1, 80.0).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn csv_with_header_and_typed_columns() {
        let data = b"city,population,code\nOslo,709000,007\nLima,11204000,042\n";
        let table = from_csv(data).unwrap();
        assert_eq!(table.row_count(), 2);
        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["city", "population", "code"]);
        assert_eq!(table.column("population").unwrap().kind, ColumnType::Numeric);
        // leading-zero identifiers never become numbers
        assert_eq!(table.column("code").unwrap().kind, ColumnType::Text);
        assert_eq!(
            table.column("code").unwrap().values[0],
            Value::Text("007".to_string())
        );
    }

    #[test]
    fn csv_blank_fields_are_empty_cells() {
        let data = b"a,b\n1,\n,2\n";
        let table = from_csv(data).unwrap();
        let a = table.column("a").unwrap();
        assert_eq!(a.kind, ColumnType::Numeric);
        assert_eq!(a.values[1], Value::Empty);
        assert_eq!(table.column("b").unwrap().values[0], Value::Empty);
    }

    #[test]
    fn csv_mixed_column_keeps_raw_text() {
        let data = b"v\n1\nx\n2\n";
        let table = from_csv(data).unwrap();
        let v = table.column("v").unwrap();
        assert_ne!(v.kind, ColumnType::Numeric);
        // the numeric-looking fields stay exactly as typed
        assert_eq!(v.values[0], Value::Text("1".to_string()));
    }

    #[test]
    fn csv_quoted_fields_survive() {
        let data = b"note,n\n\"a, quoted\",1\n\"line\nbreak\",2\n";
        let table = from_csv(data).unwrap();
        let note = table.column("note").unwrap();
        assert_eq!(note.values[0], Value::Text("a, quoted".to_string()));
        assert_eq!(note.values[1], Value::Text("line\nbreak".to_string()));
    }

    #[test]
    fn csv_header_only_gives_empty_table() {
        let table = from_csv(b"a,b,c\n").unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn ragged_csv_is_a_decode_error() {
        let err = from_csv(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)), "got {err:?}");
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let err = from_csv(b"a\n\xff\xfe\n").unwrap_err();
        assert!(matches!(err, LoadError::Csv(_)), "got {err:?}");
    }

    #[test]
    fn empty_csv_reports_no_columns() {
        assert!(matches!(from_csv(b""), Err(LoadError::NoColumns)));
    }

    #[test]
    fn xlsx_first_sheet_decodes() {
        let table = load_table("report.xlsx", &sample_xlsx()).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("region").unwrap().kind, ColumnType::Categorical);
        let sales = table.column("sales").unwrap();
        assert_eq!(sales.kind, ColumnType::Numeric);
        assert_eq!(sales.values[1], Value::Number(95.5));
    }

    #[test]
    fn truncated_xlsx_is_a_decode_error() {
        let mut bytes = sample_xlsx();
        bytes.truncate(40);
        assert!(matches!(
            load_table("report.xlsx", &bytes),
            Err(LoadError::Xlsx(_))
        ));
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert!(load_table("DATA.CSV", b"a\n1\n").is_ok());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_table("notes.txt", b"a\n1\n").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(ref e) if e == "txt"));
        assert!(matches!(
            load_table("noext", b""),
            Err(LoadError::MissingExtension)
        ));
    }
}
