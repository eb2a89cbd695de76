//! Column descriptors and ordered join-key tuples.

use crate::error::{JoinerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width forced onto index/sequence-number fields (`BIDX`, `HIDX`, ...).
/// Survey versions declare these inconsistently, which breaks key matching.
pub const INDEX_FIELD_LENGTH: u32 = 2;

const INDEX_FIELD_MARKER: &str = "IDX";

/// One logical column: physical field name plus declared width.
///
/// Equality and hashing use both name and length, so the same field declared
/// with two widths counts as two distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawColumn", into = "RawColumn")]
pub struct ColumnInfo {
    name: String,
    length: u32,
}

#[derive(Serialize, Deserialize)]
struct RawColumn {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Length", default)]
    length: u32,
}

impl TryFrom<RawColumn> for ColumnInfo {
    type Error = JoinerError;

    fn try_from(raw: RawColumn) -> Result<Self> {
        ColumnInfo::new(raw.name, raw.length)
    }
}

impl From<ColumnInfo> for RawColumn {
    fn from(col: ColumnInfo) -> Self {
        RawColumn {
            name: col.name,
            length: col.length,
        }
    }
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, length: u32) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(JoinerError::InvalidColumnSpec(
                "column name cannot be empty".to_string(),
            ));
        }
        Ok(Self { name, length })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn is_index_field(&self) -> bool {
        self.name.contains(INDEX_FIELD_MARKER)
    }

    /// Copy with the length of index fields forced to [`INDEX_FIELD_LENGTH`].
    pub fn normalized(&self) -> Self {
        if self.is_index_field() {
            Self {
                name: self.name.clone(),
                length: INDEX_FIELD_LENGTH,
            }
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered join keys of one table.
///
/// Position carries meaning: key 0 of one table corresponds to key 0 of every
/// table it joins to (case id first, then sub-record index, ...). Names are
/// never compared across tables because record types name the same key
/// differently (`CASEID` vs `HHID`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTuple(Vec<ColumnInfo>);

/// Two keys that occupy the same position in their tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPair<'a> {
    pub position: usize,
    pub left: &'a ColumnInfo,
    pub right: &'a ColumnInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlignment<'a> {
    /// Both tuples have the same arity.
    Matched(Vec<KeyPair<'a>>),
    /// Left has more keys; the shared prefix gives a many-to-one join.
    LeftPrefix(Vec<KeyPair<'a>>),
    /// Right has more keys; pairing only the prefix may fan out rows.
    RightPrefix(Vec<KeyPair<'a>>),
    /// At least one side has no keys at all.
    Disjoint,
}

impl<'a> KeyAlignment<'a> {
    pub fn pairs(&self) -> &[KeyPair<'a>] {
        match self {
            KeyAlignment::Matched(p) | KeyAlignment::LeftPrefix(p) | KeyAlignment::RightPrefix(p) => p,
            KeyAlignment::Disjoint => &[],
        }
    }
}

impl KeyTuple {
    /// Build from columns in key order. Repeated names keep their first position.
    pub fn new(columns: impl IntoIterator<Item = ColumnInfo>) -> Self {
        let mut keys: Vec<ColumnInfo> = Vec::new();
        for col in columns {
            if !keys.iter().any(|k| k.name() == col.name()) {
                keys.push(col);
            }
        }
        Self(keys)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.0
    }

    /// Pair keys by position over the common prefix of both tuples.
    pub fn align<'a>(&'a self, right: &'a KeyTuple) -> KeyAlignment<'a> {
        let shared = self.arity().min(right.arity());
        if shared == 0 {
            return KeyAlignment::Disjoint;
        }

        let pairs = self.0[..shared]
            .iter()
            .zip(&right.0[..shared])
            .enumerate()
            .map(|(position, (left, right))| KeyPair {
                position,
                left,
                right,
            })
            .collect();

        match self.arity().cmp(&right.arity()) {
            std::cmp::Ordering::Equal => KeyAlignment::Matched(pairs),
            std::cmp::Ordering::Greater => KeyAlignment::LeftPrefix(pairs),
            std::cmp::Ordering::Less => KeyAlignment::RightPrefix(pairs),
        }
    }
}

impl From<Vec<ColumnInfo>> for KeyTuple {
    fn from(columns: Vec<ColumnInfo>) -> Self {
        KeyTuple::new(columns)
    }
}
