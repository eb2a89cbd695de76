//! Typed join plans and their rendering to SQL.
//!
//! A [`JoinPlan`] is what [`MultiTableJoiner`] builds: the projection, the
//! left joins and the positional key predicates of one denormalizing query.
//! Rendering to text happens last, through [`JoinPlan::to_sql`], with every
//! identifier quoted.

pub mod joiner;

pub use joiner::MultiTableJoiner;

use crate::error::Result;
use crate::schema::MISSING_VALUE;
use crate::sql::{qualify, quote_ident, quote_literal};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// What to do when two joined tables have different numbers of keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArityPolicy {
    /// Pair the common prefix of both key tuples.
    #[default]
    Truncate,
    /// Refuse any join whose key tuples differ in length.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Alias every output column as `<table>_<column>`.
    pub qualify_field_names: bool,
    pub arity_policy: ArityPolicy,
    /// Compare keys of different declared widths on the shorter width.
    pub trim_mismatched_keys: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            qualify_field_names: true,
            arity_policy: ArityPolicy::Truncate,
            trim_mismatched_keys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExpr {
    Column { table: String, column: String },
    /// The column with its last `by` characters cut off.
    Trimmed { table: String, column: String, by: u32 },
}

impl KeyExpr {
    fn render(&self) -> Result<String> {
        match self {
            KeyExpr::Column { table, column } => qualify(table, column),
            KeyExpr::Trimmed { table, column, by } => {
                let col = qualify(table, column)?;
                Ok(format!("substr({col}, 1, length({col}) - {by})"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPredicate {
    pub left: KeyExpr,
    pub right: KeyExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftJoin {
    pub table: String,
    pub on: Vec<KeyPredicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub table: String,
    pub column: String,
    pub alias: String,
    /// Replace NULLs from unmatched left-join rows with the missing sentinel.
    pub fill_missing: bool,
}

impl ProjectedColumn {
    fn render(&self) -> Result<String> {
        let source = qualify(&self.table, &self.column)?;
        let expr = if self.fill_missing {
            format!("COALESCE({}, {})", source, quote_literal(MISSING_VALUE))
        } else {
            source
        };
        Ok(format!("{} AS {}", expr, quote_ident(&self.alias)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub output_table: String,
    pub master: String,
    pub projection: Vec<ProjectedColumn>,
    pub joins: Vec<LeftJoin>,
}

impl JoinPlan {
    /// Column names of the output table, in projection order.
    pub fn output_columns(&self) -> Vec<&str> {
        self.projection.iter().map(|p| p.alias.as_str()).collect()
    }

    pub fn select_sql(&self) -> Result<String> {
        let columns = self
            .projection
            .iter()
            .map(ProjectedColumn::render)
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!(
            "SELECT\n  {}\nFROM {}",
            columns.join(",\n  "),
            quote_ident(&self.master)?
        );

        for join in &self.joins {
            let on = join
                .on
                .iter()
                .map(|p| Ok(format!("{} = {}", p.left.render()?, p.right.render()?)))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .join(" AND ");
            sql.push_str(&format!("\nLEFT JOIN {} ON {}", quote_ident(&join.table)?, on));
        }

        Ok(sql)
    }

    /// The single statement that materializes the output table.
    pub fn to_sql(&self) -> Result<String> {
        Ok(format!(
            "CREATE TABLE {} AS {}",
            quote_ident(&self.output_table)?,
            self.select_sql()?
        ))
    }
}
