//! Loading one survey table from its CSV file into the backend.

use crate::backend::Backend;
use crate::error::Result;
use crate::schema::{header_index, HeaderedRecord, TableSchema};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: usize,
    /// Every row's payload was the missing sentinel (vacuously true for an
    /// empty file).
    pub all_blank: bool,
}

/// Create the table, insert every CSV row projected through
/// [`TableSchema::load_row`], then build its key index.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; survey
/// exports are not consistent about encoding.
pub fn load_source_table(
    backend: &mut dyn Backend,
    schema: &TableSchema,
    path: &Path,
) -> Result<LoadStats> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let headers = csv::StringRecord::from_byte_record_lossy(reader.byte_headers()?.clone());
    let header = header_index(&headers);

    let missing: Vec<&str> = schema
        .all_columns()
        .iter()
        .map(|c| c.name())
        .filter(|name| !header.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        debug!(
            "{}: {} requested column(s) absent from {}: {}",
            schema.table_name(),
            missing.len(),
            path.display(),
            missing.join(", ")
        );
    }

    backend.execute(&schema.create_table_statement()?)?;

    let mut all_blank = true;
    let rows = {
        let mut projected = reader.byte_records().map(|record| -> Result<Vec<String>> {
            let record = csv::StringRecord::from_byte_record_lossy(record?);
            let row = schema.load_row(&HeaderedRecord {
                header: &header,
                record: &record,
            });
            if all_blank && !schema.payload_is_blank(&row) {
                all_blank = false;
            }
            Ok(row)
        });
        backend.insert_rows(&schema.insert_template()?, &mut projected)?
    };

    for stmt in schema.create_index_statements()? {
        backend.execute(&stmt)?;
    }

    debug!("Loaded {} rows into {}", rows, schema.table_name());
    Ok(LoadStats { rows, all_blank })
}
