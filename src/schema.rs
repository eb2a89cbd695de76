//! Per-table schema: key and payload columns, plus the SQL that creates,
//! fills and indexes the table in the join backend.
//!
//! Every column is stored as TEXT. Type fidelity is left to whoever reads the
//! output file.

use crate::column::{ColumnInfo, KeyTuple};
use crate::error::{JoinerError, Result};
use crate::sql::{quote_ident, validate_identifier};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// Value stored for a requested column that a survey's file does not have,
/// and for joined columns with no matching row.
pub const MISSING_VALUE: &str = "N/A";

/// Anything that can answer "what is the value of field X in this row".
pub trait FieldLookup {
    fn field(&self, name: &str) -> Option<&str>;
}

impl FieldLookup for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl FieldLookup for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// A CSV record viewed through its file's header.
pub struct HeaderedRecord<'a> {
    pub header: &'a HashMap<String, usize>,
    pub record: &'a csv::StringRecord,
}

impl FieldLookup for HeaderedRecord<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(|idx| self.record.get(*idx))
    }
}

/// Map each header name to its position. Later duplicates lose.
pub fn header_index(headers: &csv::StringRecord) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        index.entry(name.trim().to_string()).or_insert(idx);
    }
    index
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table_name: String,
    id_columns: KeyTuple,
    output_columns: Vec<ColumnInfo>,
    all_columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(
        table_name: impl Into<String>,
        id_columns: impl Into<KeyTuple>,
        output_columns: Vec<ColumnInfo>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        validate_identifier(&table_name)
            .map_err(|e| JoinerError::Schema(format!("bad table name: {}", e)))?;

        let id_columns = id_columns.into();
        let all_columns: Vec<ColumnInfo> = id_columns
            .columns()
            .iter()
            .chain(output_columns.iter())
            .unique_by(|c| c.name().to_string())
            .cloned()
            .collect();

        for col in &all_columns {
            validate_identifier(col.name()).map_err(|e| {
                JoinerError::Schema(format!("bad column in {}: {}", table_name, e))
            })?;
        }

        Ok(Self {
            table_name,
            id_columns,
            output_columns,
            all_columns,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn id_columns(&self) -> &KeyTuple {
        &self.id_columns
    }

    pub fn output_columns(&self) -> &[ColumnInfo] {
        &self.output_columns
    }

    /// Key columns in key order, then output columns, without repeated names.
    pub fn all_columns(&self) -> &[ColumnInfo] {
        &self.all_columns
    }

    fn quoted_columns(&self, columns: &[ColumnInfo]) -> Result<Vec<String>> {
        columns.iter().map(|c| quote_ident(c.name())).collect()
    }

    pub fn create_table_statement(&self) -> Result<String> {
        if self.all_columns.is_empty() {
            return Err(JoinerError::Schema(format!(
                "table {} has no columns to create",
                self.table_name
            )));
        }

        let columns = self
            .quoted_columns(&self.all_columns)?
            .into_iter()
            .map(|c| format!("{} TEXT", c))
            .join(", ");
        Ok(format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table_name)?,
            columns
        ))
    }

    /// Parameterized insert; bind values in [`all_columns`](Self::all_columns) order.
    pub fn insert_template(&self) -> Result<String> {
        let columns = self.quoted_columns(&self.all_columns)?.join(", ");
        let params = std::iter::repeat("?").take(self.all_columns.len()).join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table_name)?,
            columns,
            params
        ))
    }

    /// One composite index over the key columns, in key order.
    ///
    /// Joins that pair only a prefix of the keys still use it.
    pub fn create_index_statements(&self) -> Result<Vec<String>> {
        if self.id_columns.is_empty() {
            return Ok(Vec::new());
        }

        let index_name = format!("idx_{}_keys", self.table_name);
        let columns = self.quoted_columns(self.id_columns.columns())?.join(", ");
        Ok(vec![format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&index_name)?,
            quote_ident(&self.table_name)?,
            columns
        )])
    }

    pub fn drop_table_statement(&self) -> Result<String> {
        Ok(format!("DROP TABLE {}", quote_ident(&self.table_name)?))
    }

    /// Values for [`all_columns`](Self::all_columns), in order, with
    /// [`MISSING_VALUE`] wherever `raw` lacks the field.
    pub fn load_row<R: FieldLookup + ?Sized>(&self, raw: &R) -> Vec<String> {
        self.all_columns
            .iter()
            .map(|c| raw.field(c.name()).unwrap_or(MISSING_VALUE).to_string())
            .collect()
    }

    /// True when every requested output value of a loaded row is the
    /// sentinel. Requested key columns count. A table with no requested
    /// columns is never blank.
    pub fn payload_is_blank(&self, row: &[String]) -> bool {
        let mut requested = self
            .all_columns
            .iter()
            .zip(row)
            .filter(|(c, _)| self.output_columns.iter().any(|o| o.name() == c.name()))
            .peekable();
        requested.peek().is_some() && requested.all(|(_, v)| v == MISSING_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, len: u32) -> ColumnInfo {
        ColumnInfo::new(name, len).unwrap()
    }

    fn rec21() -> TableSchema {
        TableSchema::new(
            "REC21",
            vec![col("CASEID", 15), col("BIDX", 2)],
            vec![col("B4", 1), col("CASEID", 15), col("B5", 1)],
        )
        .unwrap()
    }

    #[test]
    fn test_all_columns_keys_first_without_duplicates() {
        let schema = rec21();
        let names: Vec<&str> = schema.all_columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["CASEID", "BIDX", "B4", "B5"]);
    }

    #[test]
    fn test_create_table_statement() {
        assert_eq!(
            rec21().create_table_statement().unwrap(),
            "CREATE TABLE \"REC21\" (\"CASEID\" TEXT, \"BIDX\" TEXT, \"B4\" TEXT, \"B5\" TEXT)"
        );

        let empty = TableSchema::new("RECH9", KeyTuple::default(), Vec::new()).unwrap();
        assert!(matches!(
            empty.create_table_statement(),
            Err(JoinerError::Schema(_))
        ));
    }

    #[test]
    fn test_insert_template() {
        assert_eq!(
            rec21().insert_template().unwrap(),
            "INSERT INTO \"REC21\" (\"CASEID\", \"BIDX\", \"B4\", \"B5\") VALUES (?, ?, ?, ?)"
        );
    }

    #[test]
    fn test_index_statements() {
        assert_eq!(
            rec21().create_index_statements().unwrap(),
            vec!["CREATE INDEX \"idx_REC21_keys\" ON \"REC21\" (\"CASEID\", \"BIDX\")".to_string()]
        );

        let unkeyed = TableSchema::new("RECH2", KeyTuple::default(), vec![col("HV201", 2)]).unwrap();
        assert!(unkeyed.create_index_statements().unwrap().is_empty());
    }

    #[test]
    fn test_load_row_fills_missing() {
        let mut raw = HashMap::new();
        raw.insert("CASEID".to_string(), "  1234 01".to_string());
        raw.insert("BIDX".to_string(), "1".to_string());
        raw.insert("B5".to_string(), "".to_string());
        raw.insert("UNUSED".to_string(), "x".to_string());

        let row = rec21().load_row(&raw);
        assert_eq!(row, vec!["  1234 01", "1", MISSING_VALUE, ""]);
    }

    #[test]
    fn test_load_row_from_csv_record() {
        let headers = csv::StringRecord::from(vec!["B5", "CASEID", "BIDX"]);
        let record = csv::StringRecord::from(vec!["1", "A", "2"]);
        let index = header_index(&headers);
        let row = rec21().load_row(&HeaderedRecord {
            header: &index,
            record: &record,
        });
        assert_eq!(row, vec!["A", "2", MISSING_VALUE, "1"]);
    }

    #[test]
    fn test_payload_is_blank() {
        let schema = rec21();
        let na = || MISSING_VALUE.to_string();
        let blank = vec![na(), "1".to_string(), na(), na()];
        let partial = vec![na(), "1".to_string(), na(), "3".to_string()];
        let requested_key_only = vec!["A".to_string(), "1".to_string(), na(), na()];
        assert!(schema.payload_is_blank(&blank));
        assert!(!schema.payload_is_blank(&partial));
        assert!(!schema.payload_is_blank(&requested_key_only));
    }

    #[test]
    fn test_requested_keys_are_not_blank() {
        let schema =
            TableSchema::new("RECH1", vec![col("HHID", 12)], vec![col("HHID", 12)]).unwrap();
        assert!(!schema.payload_is_blank(&["HH0000000001".to_string()]));
        assert!(schema.payload_is_blank(&[MISSING_VALUE.to_string()]));

        let nothing_requested =
            TableSchema::new("RECH1", vec![col("HHID", 12)], Vec::new()).unwrap();
        assert!(!nothing_requested.payload_is_blank(&["HH0000000001".to_string()]));
    }

    #[test]
    fn test_rejects_unquotable_names() {
        assert!(matches!(
            TableSchema::new("", KeyTuple::default(), vec![col("A", 1)]),
            Err(JoinerError::Schema(_))
        ));
        assert!(TableSchema::new("T", KeyTuple::default(), vec![col("A\0", 1)]).is_err());
    }
}
