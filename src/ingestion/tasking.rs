//! Readers for the run-level inputs: the column tasking list, the survey id
//! list and per-survey record specifications.

use crate::column::ColumnInfo;
use crate::error::Result;
use crate::keys::RecordSpecRow;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct TaskingRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "RecordName")]
    record_name: String,
    #[serde(rename = "Len", default, deserialize_with = "csv::invalid_option")]
    len: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SurveyRow {
    #[serde(rename = "DHS_id")]
    id: String,
}

/// Requested output columns, grouped by the table that supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedColumns {
    tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl RequestedColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a column. A name already requested for the table is ignored.
    pub fn add(&mut self, table: &str, column: ColumnInfo) {
        let columns = self.tables.entry(table.to_string()).or_default();
        if !columns.iter().any(|c| c.name() == column.name()) {
            columns.push(column);
        }
    }

    pub fn columns_for(&self, table: &str) -> &[ColumnInfo] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Requested tables plus the master, which is always loaded for its keys.
    pub fn tables_of_interest(&self, master: &str) -> BTreeSet<String> {
        let mut tables: BTreeSet<String> = self.tables.keys().cloned().collect();
        tables.insert(master.to_string());
        tables
    }
}

pub fn read_tasking(path: impl AsRef<Path>) -> Result<RequestedColumns> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut requested = RequestedColumns::new();

    for row in reader.deserialize::<TaskingRow>() {
        let row = row?;
        let table = row.record_name.trim();
        if table.is_empty() {
            warn!("Tasking row for {} has no RecordName, skipping", row.name);
            continue;
        }
        match ColumnInfo::new(row.name.trim(), row.len.unwrap_or(0)) {
            Ok(col) => requested.add(table, col),
            Err(e) => warn!("Skipping tasking row for {}: {}", table, e),
        }
    }

    Ok(requested)
}

pub fn read_survey_ids(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut ids = Vec::new();

    for row in reader.deserialize::<SurveyRow>() {
        let row = row?;
        match row.id.trim().parse::<u32>() {
            Ok(id) => ids.push(id),
            Err(_) => warn!("Ignoring non-numeric survey id {:?}", row.id),
        }
    }

    Ok(ids)
}

pub fn read_record_spec(path: impl AsRef<Path>) -> Result<Vec<RecordSpecRow>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let rows = reader
        .deserialize::<RecordSpecRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
