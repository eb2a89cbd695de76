//! Source file discovery.
//!
//! Patterns are glob templates with `{survey}` and `{table}` placeholders,
//! e.g. `data/{survey}/*_{table}.csv`. They are tried in order and the first
//! one that matches exactly one file wins.

use crate::error::Result;
use glob::Pattern;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    Missing,
    /// No pattern matched exactly one file; these are the first multiple matches.
    Ambiguous(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default)]
pub struct TablePathResolver {
    patterns: Vec<String>,
}

impl TablePathResolver {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Fill in the placeholders. The table name is escaped so glob
    /// metacharacters in it match literally.
    pub fn expand(pattern: &str, survey_id: u32, table: &str) -> String {
        pattern
            .replace("{survey}", &survey_id.to_string())
            .replace("{table}", &Pattern::escape(table))
    }

    pub fn resolve(&self, survey_id: u32, table: &str) -> Result<Resolution> {
        let mut ambiguous: Option<Vec<PathBuf>> = None;

        for pattern in &self.patterns {
            let expanded = Self::expand(pattern, survey_id, table);
            let mut matches = Vec::new();
            for entry in glob::glob(&expanded)? {
                match entry {
                    Ok(path) => matches.push(path),
                    Err(e) => warn!("Unreadable path while matching {}: {}", expanded, e),
                }
            }

            match matches.len() {
                0 => {}
                1 => return Ok(Resolution::Found(matches.remove(0))),
                _ => {
                    ambiguous.get_or_insert(matches);
                }
            }
        }

        Ok(match ambiguous {
            Some(paths) => Resolution::Ambiguous(paths),
            None => Resolution::Missing,
        })
    }
}
