//! Join key inference from a survey's record specification.
//!
//! The record spec lists every item of every record type. Items typed as
//! identifiers or joinable become that table's keys, in file order, which is
//! what makes keys line up by position across tables.

use crate::column::ColumnInfo;
use crate::error::{JoinerError, Result};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Identifier,
    Joinable,
    Other(String),
}

impl ItemType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "IdItem" | "Identifier" => ItemType::Identifier,
            "JoinableItem" | "Joinable" => ItemType::Joinable,
            other => ItemType::Other(other.to_string()),
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, ItemType::Identifier | ItemType::Joinable)
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ItemType::parse(&raw))
    }
}

/// One row of a record-specification file.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordSpecRow {
    #[serde(rename = "RecordName")]
    pub record_name: String,
    #[serde(rename = "ItemType")]
    pub item_type: ItemType,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Len", default, deserialize_with = "csv::invalid_option")]
    pub len: Option<u32>,
}

impl RecordSpecRow {
    pub fn new(record_name: &str, item_type: &str, name: &str, len: u32) -> Self {
        Self {
            record_name: record_name.to_string(),
            item_type: ItemType::parse(item_type),
            name: name.to_string(),
            len: Some(len),
        }
    }
}

/// Keys per table, as resolved from the record spec plus any appended patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeys {
    keys: BTreeMap<String, Vec<ColumnInfo>>,
}

impl ResolvedKeys {
    pub fn keys_for(&self, table: &str) -> Result<&[ColumnInfo]> {
        self.keys
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| JoinerError::UnresolvedTable(table.to_string()))
    }

    /// Add a key after resolution, for tables whose record spec is known to be
    /// missing one. Index fields get their fixed width first, then exact
    /// duplicates are ignored.
    ///
    /// Returns whether the key was added.
    pub fn append(&mut self, table: &str, column: ColumnInfo) -> bool {
        let column = column.normalized();
        let keys = self.keys.entry(table.to_string()).or_default();
        if keys.contains(&column) {
            return false;
        }
        keys.push(column);
        true
    }
}

pub struct JoinKeyResolver;

impl JoinKeyResolver {
    /// Collect identifier and joinable items of the given tables.
    ///
    /// Never fails; tables without any key item are simply absent from the
    /// result.
    pub fn resolve<'a, I>(rows: I, tables_of_interest: &BTreeSet<String>) -> ResolvedKeys
    where
        I: IntoIterator<Item = &'a RecordSpecRow>,
    {
        let mut resolved = ResolvedKeys::default();

        for row in rows {
            if !row.item_type.is_key() || !tables_of_interest.contains(row.record_name.trim()) {
                continue;
            }

            let column = match ColumnInfo::new(row.name.trim(), row.len.unwrap_or(0)) {
                Ok(c) => c.normalized(),
                Err(e) => {
                    warn!("Skipping key item of {}: {}", row.record_name, e);
                    continue;
                }
            };

            if resolved.append(row.record_name.trim(), column.clone()) {
                debug!("Key {}({}) -> {}", column, column.length(), row.record_name);
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_keeps_order_and_filters() {
        let rows = vec![
            RecordSpecRow::new("REC21", "IdItem", "CASEID", 15),
            RecordSpecRow::new("REC21", "Item", "B4", 1),
            RecordSpecRow::new("REC21", "JoinableItem", "BIDX", 2),
            RecordSpecRow::new("RECH1", "IdItem", "HHID", 12),
            RecordSpecRow::new("REC01", "IdItem", "CASEID", 15),
        ];

        let keys = JoinKeyResolver::resolve(&rows, &tables(&["REC21", "RECH1"]));
        let rec21: Vec<&str> = keys.keys_for("REC21").unwrap().iter().map(|c| c.name()).collect();
        assert_eq!(rec21, vec!["CASEID", "BIDX"]);
        assert_eq!(keys.keys_for("RECH1").unwrap(), &[ColumnInfo::new("HHID", 12).unwrap()]);
        assert!(keys.keys_for("REC01").is_err());
    }

    #[test]
    fn test_resolve_skips_exact_duplicates() {
        let rows = vec![
            RecordSpecRow::new("REC41", "IdItem", "CASEID", 15),
            RecordSpecRow::new("REC41", "IdItem", "CASEID", 15),
            RecordSpecRow::new("REC41", "IdItem", "CASEID", 12),
        ];
        let keys = JoinKeyResolver::resolve(&rows, &tables(&["REC41"]));
        assert_eq!(keys.keys_for("REC41").unwrap().len(), 2);
    }

    #[test]
    fn test_index_fields_forced_to_two() {
        let rows = vec![
            RecordSpecRow::new("REC43", "JoinableItem", "HIDX", 1),
            RecordSpecRow::new("REC43", "JoinableItem", "HIDX", 3),
            RecordSpecRow::new("REC41", "Identifier", "MIDX", 9),
        ];
        let keys = JoinKeyResolver::resolve(&rows, &tables(&["REC43", "REC41"]));
        // both declarations collapse onto one normalized key
        assert_eq!(keys.keys_for("REC43").unwrap(), &[ColumnInfo::new("HIDX", 2).unwrap()]);
        assert_eq!(keys.keys_for("REC41").unwrap()[0].length(), 2);
    }

    #[test]
    fn test_unresolved_table() {
        let keys = JoinKeyResolver::resolve(&Vec::<RecordSpecRow>::new(), &tables(&["RECH3"]));
        assert!(matches!(
            keys.keys_for("RECH3"),
            Err(JoinerError::UnresolvedTable(t)) if t == "RECH3"
        ));
    }

    #[test]
    fn test_empty_names_skipped() {
        let rows = vec![RecordSpecRow::new("RECH1", "IdItem", " ", 12)];
        let keys = JoinKeyResolver::resolve(&rows, &tables(&["RECH1"]));
        assert!(keys.keys_for("RECH1").is_err());
    }

    #[test]
    fn test_append_patches_keys() {
        let mut keys = ResolvedKeys::default();
        assert!(keys.append("RECH3", ColumnInfo::new("HHID", 12).unwrap()));
        assert!(!keys.append("RECH3", ColumnInfo::new("HHID", 12).unwrap()));
        assert_eq!(keys.keys_for("RECH3").unwrap().len(), 1);
    }

    #[test]
    fn test_append_forces_index_width() {
        let mut keys = ResolvedKeys::default();
        assert!(keys.append("REC43", ColumnInfo::new("HIDX", 1).unwrap()));
        assert!(!keys.append("REC43", ColumnInfo::new("HIDX", 2).unwrap()));
        assert_eq!(keys.keys_for("REC43").unwrap(), &[ColumnInfo::new("HIDX", 2).unwrap()]);
    }

    #[test]
    fn test_deserialize_rows_from_csv() {
        let data = "RecordName,ItemType,Name,Len\nRECH1,IdItem,HHID,12\nRECH1,Item,HV001,\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<RecordSpecRow> = rdr
            .deserialize::<RecordSpecRow>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].item_type, ItemType::Identifier);
        assert_eq!(rows[0].len, Some(12));
        assert_eq!(rows[1].item_type, ItemType::Other("Item".to_string()));
        assert_eq!(rows[1].len, None);
    }
}
