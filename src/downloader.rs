//! Table export.
//!
//! The dashboard offers the loaded table back as a CSV download. Cells
//! are written in their display form, so a file that was uploaded as
//! CSV round-trips through load and export.

use crate::table::{Table, Value};

/// Download name offered for exported tables.
pub const EXPORT_FILENAME: &str = "exported_data.csv";

/// Serialize a table as CSV: one header record, then one record per
/// row. Quoting follows RFC 4180 and is left to the writer.
pub fn to_csv(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns().iter().map(|c| c.name.as_str()))?;
    for row in table.rows() {
        writer.write_record(row.into_iter().map(Value::render))?;
    }
    writer.into_inner().map_err(|err| {
        csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    })
}
