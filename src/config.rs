//! Run configuration.
//!
//! Loaded from an optional JSON file, then overridden from the command line.
//! The per-survey switches live in [`SurveyOptions`] and are passed into each
//! pipeline call rather than read from globals.

use crate::column::ColumnInfo;
use crate::error::{JoinerError, Result};
use crate::plan::JoinOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_MASTER_TABLE: &str = "REC21";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyOptions {
    #[serde(flatten)]
    pub join: JoinOptions,
    /// Leave out non-master tables whose requested columns are all missing.
    /// The master is always kept: its rows fix the output's row count, so
    /// dropping it would leave nothing to join onto.
    pub skip_blanks: bool,
    /// Check and log every statement without executing anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub tasking_file: Option<PathBuf>,
    pub survey_list_file: Option<PathBuf>,
    /// Source CSV patterns, tried in order. `{survey}` and `{table}` are
    /// substituted before globbing.
    pub table_patterns: Vec<String>,
    /// Record-spec patterns, same placeholders.
    pub spec_patterns: Vec<String>,
    pub output_dir: PathBuf,
    /// Output file name; `{survey}` is substituted.
    pub output_template: String,
    pub master_table: String,
    /// Keys appended after resolution for tables whose record spec misses them.
    pub key_overrides: BTreeMap<String, Vec<ColumnInfo>>,
    pub options: SurveyOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tasking_file: None,
            survey_list_file: None,
            table_patterns: Vec::new(),
            spec_patterns: Vec::new(),
            output_dir: PathBuf::from("."),
            output_template: "{survey}.csv".to_string(),
            master_table: DEFAULT_MASTER_TABLE.to_string(),
            key_overrides: BTreeMap::new(),
            options: SurveyOptions::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasking_file.is_none() {
            return Err(JoinerError::Config("tasking_file is required".to_string()));
        }
        if self.survey_list_file.is_none() {
            return Err(JoinerError::Config("survey_list_file is required".to_string()));
        }
        if self.table_patterns.is_empty() {
            return Err(JoinerError::Config(
                "at least one table pattern is required".to_string(),
            ));
        }
        if self.spec_patterns.is_empty() && self.key_overrides.is_empty() {
            return Err(JoinerError::Config(
                "no spec_patterns or key_overrides: no table would have join keys".to_string(),
            ));
        }
        if self.master_table.trim().is_empty() {
            return Err(JoinerError::Config("master_table cannot be empty".to_string()));
        }
        if !self.output_template.contains("{survey}") {
            return Err(JoinerError::Config(
                "output_template must contain {survey}, or surveys overwrite each other".to_string(),
            ));
        }
        Ok(())
    }

    pub fn output_path(&self, survey_id: u32) -> PathBuf {
        self.output_dir
            .join(self.output_template.replace("{survey}", &survey_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ArityPolicy;

    fn minimal() -> RunConfig {
        RunConfig {
            tasking_file: Some(PathBuf::from("tasking.csv")),
            survey_list_file: Some(PathBuf::from("surveys.csv")),
            table_patterns: vec!["in/{survey}/{table}.csv".to_string()],
            spec_patterns: vec!["in/{survey}/spec.csv".to_string()],
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_load_with_defaults() {
        let json = r#"{
            "tasking_file": "tasking.csv",
            "survey_list_file": "surveys.csv",
            "table_patterns": ["in/{survey}/{table}.csv"],
            "key_overrides": {"RECH3": [{"Name": "HHID", "Length": 12}]},
            "options": {"skip_blanks": true, "qualify_field_names": false, "arity_policy": "strict"}
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.master_table, "REC21");
        assert_eq!(config.output_template, "{survey}.csv");
        assert!(config.options.skip_blanks);
        assert!(!config.options.dry_run);
        assert!(!config.options.join.qualify_field_names);
        assert!(config.options.join.trim_mismatched_keys);
        assert_eq!(config.options.join.arity_policy, ArityPolicy::Strict);
        assert_eq!(config.key_overrides["RECH3"][0].name(), "HHID");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(minimal().validate().is_ok());

        let mut no_tasking = minimal();
        no_tasking.tasking_file = None;
        assert!(matches!(no_tasking.validate(), Err(JoinerError::Config(_))));

        let mut shared_output = minimal();
        shared_output.output_template = "out.csv".to_string();
        assert!(shared_output.validate().is_err());

        let mut no_keys = minimal();
        no_keys.spec_patterns.clear();
        assert!(no_keys.validate().is_err());
    }

    #[test]
    fn test_output_path() {
        let mut config = minimal();
        config.output_dir = PathBuf::from("out");
        config.output_template = "DHS_{survey}_births.csv".to_string();
        assert_eq!(config.output_path(517), PathBuf::from("out/DHS_517_births.csv"));
    }
}
