//! Multi-table joiner
//!
//! Builds one wide `CREATE TABLE .. AS SELECT .. LEFT JOIN ..` from a master
//! table and any number of tables hanging off it. All joins are anchored on
//! the master, so relative to it every other table must be 1:1 or M:1. That
//! is the caller's responsibility; the joiner only warns where the key shapes
//! suggest a 1:M join.
//!
//! The output is always a single statement. Copying fields across tables with
//! correlated UPDATEs is not supported by the backend, and REPLACE-based
//! copying duplicates rows.

use super::{ArityPolicy, JoinOptions, JoinPlan, KeyExpr, KeyPredicate, LeftJoin, ProjectedColumn};
use crate::column::{ColumnInfo, KeyAlignment, KeyPair};
use crate::error::{JoinerError, Result};
use crate::schema::TableSchema;
use crate::sql::validate_identifier;
use std::collections::HashSet;
use tracing::{debug, warn};

pub struct MultiTableJoiner {
    tables: Vec<TableSchema>,
}

impl MultiTableJoiner {
    /// `tables[0]` is the master; the rest are joined in the given order.
    pub fn new(tables: Vec<TableSchema>) -> Result<Self> {
        if tables.is_empty() {
            return Err(JoinerError::EmptyPlan);
        }

        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.table_name()) {
                return Err(JoinerError::Schema(format!(
                    "table {} appears twice in the join plan",
                    table.table_name()
                )));
            }
        }

        Ok(Self { tables })
    }

    /// Order `tables` master first, the rest by name.
    ///
    /// If `master` is not among them the lexicographically first table takes
    /// its place, and the substitution is handed back as a
    /// [`JoinerError::NoMasterTable`] for the caller to report.
    pub fn arrange(master: &str, mut tables: Vec<TableSchema>) -> Result<(Self, Option<JoinerError>)> {
        if tables.is_empty() {
            return Err(JoinerError::EmptyPlan);
        }

        tables.sort_by(|a, b| a.table_name().cmp(b.table_name()));

        let substitution = match tables.iter().position(|t| t.table_name() == master) {
            Some(idx) => {
                let m = tables.remove(idx);
                tables.insert(0, m);
                None
            }
            None => Some(JoinerError::NoMasterTable {
                requested: master.to_string(),
                substitute: tables[0].table_name().to_string(),
            }),
        };

        Ok((Self::new(tables)?, substitution))
    }

    pub fn master(&self) -> &TableSchema {
        &self.tables[0]
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Shorthand for [`build_plan`](Self::build_plan) + render with default
    /// key handling.
    pub fn build_join_sql(&self, output_table: &str, qualify_field_names: bool) -> Result<String> {
        let options = JoinOptions {
            qualify_field_names,
            ..JoinOptions::default()
        };
        self.build_plan(output_table, &options)?.to_sql()
    }

    pub fn build_plan(&self, output_table: &str, options: &JoinOptions) -> Result<JoinPlan> {
        validate_identifier(output_table)?;

        let master = self.master();
        let mut projection = Projection::new(options.qualify_field_names);

        for col in master.all_columns() {
            projection.push(master.table_name(), col, false);
        }

        let mut joins = Vec::with_capacity(self.tables.len() - 1);
        for table in &self.tables[1..] {
            let on = self.key_predicates(table, options)?;
            joins.push(LeftJoin {
                table: table.table_name().to_string(),
                on,
            });

            for col in table.output_columns() {
                projection.push(table.table_name(), col, true);
            }
        }

        let plan = JoinPlan {
            output_table: output_table.to_string(),
            master: master.table_name().to_string(),
            projection: projection.columns,
            joins,
        };
        debug!(
            "Join plan for {}: {} tables, {} columns",
            output_table,
            self.tables.len(),
            plan.projection.len()
        );
        Ok(plan)
    }

    fn key_predicates(&self, table: &TableSchema, options: &JoinOptions) -> Result<Vec<KeyPredicate>> {
        let master = self.master();
        let alignment = master.id_columns().align(table.id_columns());

        let arity_mismatch = || JoinerError::KeyArityMismatch {
            left: master.table_name().to_string(),
            left_arity: master.id_columns().arity(),
            right: table.table_name().to_string(),
            right_arity: table.id_columns().arity(),
        };

        match (&alignment, options.arity_policy) {
            (KeyAlignment::Disjoint, _) => {
                return Err(JoinerError::NoJoinKeys {
                    table: table.table_name().to_string(),
                    master: master.table_name().to_string(),
                });
            }
            (KeyAlignment::Matched(_), _) => {}
            (_, ArityPolicy::Strict) => return Err(arity_mismatch()),
            (KeyAlignment::LeftPrefix(pairs), ArityPolicy::Truncate) => {
                debug!(
                    "Joining {} to {} on the first {} key(s)",
                    table.table_name(),
                    master.table_name(),
                    pairs.len()
                );
            }
            (KeyAlignment::RightPrefix(_), ArityPolicy::Truncate) => {
                warn!(
                    "Right table {} has more join columns than {} - is this a 1:M join?",
                    table.table_name(),
                    master.table_name()
                );
            }
        }

        Ok(alignment
            .pairs()
            .iter()
            .map(|pair| self.key_predicate(table, pair, options.trim_mismatched_keys))
            .collect())
    }

    /// `CASEID` holds the household id plus a 3-character line number, so a
    /// 15-wide `CASEID` matches a 12-wide `HHID` once its last 3 characters
    /// are cut. Any pair of keys with different declared widths is compared
    /// this way.
    fn key_predicate(&self, table: &TableSchema, pair: &KeyPair<'_>, trim: bool) -> KeyPredicate {
        let master = self.master().table_name();
        let (left_len, right_len) = (pair.left.length(), pair.right.length());
        let lengths_differ = trim && left_len > 0 && right_len > 0 && left_len != right_len;

        let left = if lengths_differ && left_len > right_len {
            trimmed(master, pair.left, left_len - right_len)
        } else {
            column(master, pair.left)
        };

        let right = if lengths_differ && right_len > left_len {
            warn!(
                "Right table {} has a longer id column ({}) than {} ({}) - is this a 1:M join?",
                table.table_name(),
                pair.right,
                master,
                pair.left
            );
            trimmed(table.table_name(), pair.right, right_len - left_len)
        } else {
            column(table.table_name(), pair.right)
        };

        KeyPredicate { left, right }
    }
}

fn column(table: &str, col: &ColumnInfo) -> KeyExpr {
    KeyExpr::Column {
        table: table.to_string(),
        column: col.name().to_string(),
    }
}

fn trimmed(table: &str, col: &ColumnInfo, by: u32) -> KeyExpr {
    KeyExpr::Trimmed {
        table: table.to_string(),
        column: col.name().to_string(),
        by,
    }
}

/// Output columns under construction, with alias collision handling.
struct Projection {
    qualify: bool,
    columns: Vec<ProjectedColumn>,
    sources: HashSet<(String, String)>,
    aliases: HashSet<String>,
}

impl Projection {
    fn new(qualify: bool) -> Self {
        Self {
            qualify,
            columns: Vec::new(),
            sources: HashSet::new(),
            aliases: HashSet::new(),
        }
    }

    fn push(&mut self, table: &str, col: &ColumnInfo, fill_missing: bool) {
        if !self.sources.insert((table.to_string(), col.name().to_string())) {
            return;
        }

        let qualified = format!("{}_{}", table, col.name());
        let mut alias = if self.qualify {
            qualified.clone()
        } else {
            col.name().to_string()
        };

        if self.aliases.contains(&alias) && !self.qualify {
            // the same bare name from two tables: keep both, qualify the later one
            warn!(
                "Column {} is supplied by more than one table, emitting {} as {}",
                col.name(),
                table,
                qualified
            );
            alias = qualified;
        }

        let base = alias.clone();
        let mut n = 2;
        while self.aliases.contains(&alias) {
            alias = format!("{}_{}", base, n);
            n += 1;
        }

        self.aliases.insert(alias.clone());
        self.columns.push(ProjectedColumn {
            table: table.to_string(),
            column: col.name().to_string(),
            alias,
            fill_missing,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::KeyTuple;

    fn col(name: &str, len: u32) -> ColumnInfo {
        ColumnInfo::new(name, len).unwrap()
    }

    fn table(name: &str, keys: Vec<ColumnInfo>, out: &[&str]) -> TableSchema {
        TableSchema::new(name, keys, out.iter().map(|c| col(c, 1)).collect()).unwrap()
    }

    fn rec21() -> TableSchema {
        table("REC21", vec![col("CASEID", 15), col("BIDX", 2)], &["B4", "B5"])
    }

    fn rech1() -> TableSchema {
        table("RECH1", vec![col("HHID", 12)], &["HV001", "HV025"])
    }

    fn rec43() -> TableSchema {
        table("REC43", vec![col("CASEID", 15), col("HIDX", 2)], &["H2", "B4"])
    }

    #[test]
    fn test_empty_plan() {
        assert!(matches!(MultiTableJoiner::new(vec![]), Err(JoinerError::EmptyPlan)));
        assert!(matches!(
            MultiTableJoiner::arrange("REC21", vec![]),
            Err(JoinerError::EmptyPlan)
        ));
    }

    #[test]
    fn test_duplicate_tables_rejected() {
        assert!(matches!(
            MultiTableJoiner::new(vec![rec21(), rec21()]),
            Err(JoinerError::Schema(_))
        ));
    }

    #[test]
    fn test_arrange_master_first_then_by_name() {
        let (joiner, warning) = MultiTableJoiner::arrange("REC21", vec![rech1(), rec43(), rec21()]).unwrap();
        let names: Vec<&str> = joiner.tables().iter().map(|t| t.table_name()).collect();
        assert_eq!(names, vec!["REC21", "REC43", "RECH1"]);
        assert!(warning.is_none());
    }

    #[test]
    fn test_arrange_substitutes_missing_master() {
        let (joiner, warning) = MultiTableJoiner::arrange("REC21", vec![rech1(), rec43()]).unwrap();
        assert_eq!(joiner.master().table_name(), "REC43");
        match warning {
            Some(JoinerError::NoMasterTable { requested, substitute }) => {
                assert_eq!(requested, "REC21");
                assert_eq!(substitute, "REC43");
            }
            other => panic!("expected substitution, got {:?}", other),
        }
    }

    #[test]
    fn test_join_by_position_with_trimming() {
        let joiner = MultiTableJoiner::new(vec![rec21(), rech1()]).unwrap();
        let plan = joiner.build_plan("out", &JoinOptions::default()).unwrap();

        assert_eq!(plan.joins.len(), 1);
        assert_eq!(
            plan.joins[0].on,
            vec![KeyPredicate {
                left: KeyExpr::Trimmed {
                    table: "REC21".to_string(),
                    column: "CASEID".to_string(),
                    by: 3
                },
                right: KeyExpr::Column {
                    table: "RECH1".to_string(),
                    column: "HHID".to_string()
                },
            }]
        );
        assert_eq!(
            plan.output_columns(),
            vec!["REC21_CASEID", "REC21_BIDX", "REC21_B4", "REC21_B5", "RECH1_HV001", "RECH1_HV025"]
        );
    }

    #[test]
    fn test_join_sql_text() {
        let joiner = MultiTableJoiner::new(vec![rec21(), rec43()]).unwrap();
        let sql = joiner.build_join_sql("births", false).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"births\" AS SELECT"));
        assert!(sql.contains(
            "LEFT JOIN \"REC43\" ON \"REC21\".\"CASEID\" = \"REC43\".\"CASEID\" AND \"REC21\".\"BIDX\" = \"REC43\".\"HIDX\""
        ));
        // REC43.B4 collides with REC21.B4 and is kept under its qualified name
        assert!(sql.contains("COALESCE(\"REC43\".\"B4\", 'N/A') AS \"REC43_B4\""));
        assert!(sql.contains("\"REC21\".\"B4\" AS \"B4\""));
        crate::sql::check_statement(&sql).unwrap();
    }

    #[test]
    fn test_no_trimming_when_disabled() {
        let joiner = MultiTableJoiner::new(vec![rec21(), rech1()]).unwrap();
        let options = JoinOptions {
            trim_mismatched_keys: false,
            ..JoinOptions::default()
        };
        let plan = joiner.build_plan("out", &options).unwrap();
        assert!(matches!(plan.joins[0].on[0].left, KeyExpr::Column { .. }));
    }

    #[test]
    fn test_longer_right_key_is_trimmed() {
        let joiner = MultiTableJoiner::new(vec![rech1(), rec21()]).unwrap();
        let plan = joiner.build_plan("out", &JoinOptions::default()).unwrap();
        assert!(matches!(plan.joins[0].on[0].left, KeyExpr::Column { .. }));
        assert!(matches!(plan.joins[0].on[0].right, KeyExpr::Trimmed { by: 3, .. }));
    }

    #[test]
    fn test_strict_arity() {
        let joiner = MultiTableJoiner::new(vec![rec21(), rech1()]).unwrap();
        let options = JoinOptions {
            arity_policy: ArityPolicy::Strict,
            ..JoinOptions::default()
        };
        assert!(matches!(
            joiner.build_plan("out", &options),
            Err(JoinerError::KeyArityMismatch { left_arity: 2, right_arity: 1, .. })
        ));
    }

    #[test]
    fn test_unkeyed_table_cannot_join() {
        let unkeyed = TableSchema::new("RECH2", KeyTuple::default(), vec![col("HV201", 2)]).unwrap();
        let joiner = MultiTableJoiner::new(vec![rec21(), unkeyed]).unwrap();
        assert!(matches!(
            joiner.build_plan("out", &JoinOptions::default()),
            Err(JoinerError::NoJoinKeys { .. })
        ));
    }

    #[test]
    fn test_master_alone() {
        let joiner = MultiTableJoiner::new(vec![rec21()]).unwrap();
        let sql = joiner.build_join_sql("out", true).unwrap();
        assert!(!sql.contains("LEFT JOIN"));
        assert!(sql.ends_with("FROM \"REC21\""));
    }

    #[test]
    fn test_bad_output_name() {
        let joiner = MultiTableJoiner::new(vec![rec21()]).unwrap();
        assert!(joiner.build_join_sql("", true).is_err());
    }
}
