//! Survey pipeline
//!
//! One survey at a time: locate and load each requested table, build the join
//! plan with the master first, materialize the output table and stream it to
//! a sink. Missing or ambiguous files and blank tables are logged and skipped;
//! structural and backend errors abort only the current survey.
//!
//! A badly ordered 1:M join can grow the output without bound. Nothing here
//! detects that beyond the joiner's key-shape warnings.

use crate::backend::{Backend, RecordingBackend, SqliteBackend};
use crate::config::{RunConfig, SurveyOptions};
use crate::error::{JoinerError, Result};
use crate::ingestion::{
    load_source_table, read_record_spec, read_survey_ids, read_tasking, RequestedColumns,
    Resolution, TablePathResolver,
};
use crate::keys::{JoinKeyResolver, RecordSpecRow, ResolvedKeys};
use crate::plan::MultiTableJoiner;
use crate::schema::TableSchema;
use crate::sink::{CsvSink, MemorySink, RowSink};
use crate::sql::quote_ident;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Name of the joined table inside the backend.
pub const OUTPUT_TABLE: &str = "survey_output";

pub struct SurveyPipeline<'a> {
    pub resolver: &'a TablePathResolver,
    pub requested: &'a RequestedColumns,
    pub master_table: &'a str,
    pub options: &'a SurveyOptions,
}

impl<'a> SurveyPipeline<'a> {
    pub fn new(
        resolver: &'a TablePathResolver,
        requested: &'a RequestedColumns,
        master_table: &'a str,
        options: &'a SurveyOptions,
    ) -> Self {
        Self {
            resolver,
            requested,
            master_table,
            options,
        }
    }

    /// Join one survey's tables into `sink`. Returns the number of rows written.
    pub fn process_survey(
        &self,
        survey_id: u32,
        join_keys: &ResolvedKeys,
        backend: &mut dyn Backend,
        sink: &mut dyn RowSink,
    ) -> Result<usize> {
        let tables = self.requested.tables_of_interest(self.master_table);
        let mut loaded = Vec::new();

        for table in &tables {
            if let Some(schema) = self.load_table(survey_id, table, join_keys, backend)? {
                loaded.push(schema);
            }
        }

        if loaded.is_empty() {
            return Err(JoinerError::process(survey_id, "no tables could be loaded"));
        }

        let (joiner, substitution) = MultiTableJoiner::arrange(self.master_table, loaded)?;
        if let Some(warning) = substitution {
            warn!("Survey {}: {}", survey_id, warning);
        }

        let plan = joiner.build_plan(OUTPUT_TABLE, &self.options.join)?;
        debug!(
            "Survey {}: {} joined onto {}",
            survey_id,
            plan.joins.iter().map(|j| j.table.as_str()).collect::<Vec<_>>().join(", "),
            plan.master
        );
        backend.execute(&plan.to_sql()?)?;

        let select = format!("SELECT * FROM {}", quote_ident(OUTPUT_TABLE)?);
        let rows = backend.query_into(&select, sink)?;
        sink.finish()?;
        Ok(rows)
    }

    /// Locate, build and load one table. `None` means skipped with a warning.
    fn load_table(
        &self,
        survey_id: u32,
        table: &str,
        join_keys: &ResolvedKeys,
        backend: &mut dyn Backend,
    ) -> Result<Option<TableSchema>> {
        let is_master = table == self.master_table;

        let path = match self.resolver.resolve(survey_id, table)? {
            Resolution::Found(path) => path,
            Resolution::Missing => {
                warn!("Survey {}: no file found for table {}, skipping", survey_id, table);
                return Ok(None);
            }
            Resolution::Ambiguous(paths) => {
                warn!(
                    "Survey {}: {} files match table {}, skipping: {:?}",
                    survey_id,
                    paths.len(),
                    table,
                    paths
                );
                return Ok(None);
            }
        };

        let keys = match join_keys.keys_for(table) {
            Ok(keys) => keys.to_vec(),
            Err(e) if !is_master => {
                warn!("Survey {}: {}, skipping", survey_id, e);
                return Ok(None);
            }
            Err(e) => {
                warn!("Survey {}: {}, master loaded without keys", survey_id, e);
                Vec::new()
            }
        };

        let schema = TableSchema::new(table, keys, self.requested.columns_for(table).to_vec())?;
        let stats = load_source_table(backend, &schema, &path)?;

        if self.options.skip_blanks && !is_master && stats.all_blank {
            warn!(
                "Survey {}: table {} has no data for any requested column, leaving it out",
                survey_id, table
            );
            backend.execute(&schema.drop_table_statement()?)?;
            return Ok(None);
        }

        info!("Survey {}: loaded {} ({} rows)", survey_id, table, stats.rows);
        Ok(Some(schema))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyOutcome {
    pub survey_id: u32,
    pub rows: Option<usize>,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub surveys: Vec<SurveyOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.surveys.iter().filter(|s| s.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.surveys.len() - self.succeeded()
    }
}

/// Record-spec rows for a survey, read once per distinct matching file.
pub fn load_join_keys(
    spec_resolver: &TablePathResolver,
    survey_id: u32,
    tables: &BTreeSet<String>,
) -> Result<ResolvedKeys> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for table in tables {
        match spec_resolver.resolve(survey_id, table)? {
            Resolution::Found(path) => {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            Resolution::Missing => {
                debug!("Survey {}: no record spec for {}", survey_id, table);
            }
            Resolution::Ambiguous(found) => {
                warn!(
                    "Survey {}: {} record specs match {}, ignoring them",
                    survey_id,
                    found.len(),
                    table
                );
            }
        }
    }

    if paths.is_empty() && !spec_resolver.patterns().is_empty() {
        warn!("Survey {}: no record specification found", survey_id);
    }

    let mut rows: Vec<RecordSpecRow> = Vec::new();
    for path in &paths {
        rows.extend(read_record_spec(path)?);
    }
    Ok(JoinKeyResolver::resolve(&rows, tables))
}

/// Process every survey in the configured list, in order.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    config.validate()?;

    let tasking_file = config
        .tasking_file
        .as_ref()
        .ok_or_else(|| JoinerError::Config("tasking_file is required".to_string()))?;
    let survey_file = config
        .survey_list_file
        .as_ref()
        .ok_or_else(|| JoinerError::Config("survey_list_file is required".to_string()))?;

    let requested = read_tasking(tasking_file)?;
    if requested.is_empty() {
        return Err(JoinerError::Config(format!(
            "tasking file {} requests no columns",
            tasking_file.display()
        )));
    }
    let surveys = read_survey_ids(survey_file)?;
    info!(
        "Processing {} surveys, {} tables requested",
        surveys.len(),
        requested.table_names().count()
    );

    let table_resolver = TablePathResolver::new(config.table_patterns.clone());
    let spec_resolver = TablePathResolver::new(config.spec_patterns.clone());
    let pipeline = SurveyPipeline::new(
        &table_resolver,
        &requested,
        &config.master_table,
        &config.options,
    );

    let mut summary = RunSummary::default();
    for survey_id in surveys {
        let outcome = match run_survey(config, &pipeline, &spec_resolver, survey_id) {
            Ok((rows, output)) => {
                info!("✅ Survey {}: {} rows", survey_id, rows);
                SurveyOutcome {
                    survey_id,
                    rows: Some(rows),
                    output,
                    error: None,
                }
            }
            Err(e) => {
                error!("❌ Survey {} failed: {}", survey_id, e);
                SurveyOutcome {
                    survey_id,
                    rows: None,
                    output: None,
                    error: Some(e.to_string()),
                }
            }
        };
        summary.surveys.push(outcome);
    }

    Ok(summary)
}

fn run_survey(
    config: &RunConfig,
    pipeline: &SurveyPipeline<'_>,
    spec_resolver: &TablePathResolver,
    survey_id: u32,
) -> Result<(usize, Option<PathBuf>)> {
    let tables = pipeline.requested.tables_of_interest(pipeline.master_table);
    let mut keys = load_join_keys(spec_resolver, survey_id, &tables)?;
    for (table, columns) in &config.key_overrides {
        for column in columns {
            keys.append(table, column.clone());
        }
    }

    if config.options.dry_run {
        let mut backend = RecordingBackend::new();
        let mut sink = MemorySink::new();
        pipeline.process_survey(survey_id, &keys, &mut backend, &mut sink)?;
        info!(
            "Survey {}: dry run generated {} statements over {} source rows",
            survey_id,
            backend.statements().len(),
            backend.rows_seen()
        );
        return Ok((0, None));
    }

    let output = config.output_path(survey_id);
    let mut backend = SqliteBackend::open_in_memory()?;
    let mut sink = CsvSink::create(&output)?;
    let result = pipeline.process_survey(survey_id, &keys, &mut backend, &mut sink);
    drop(sink);

    if let Err(e) = backend.close() {
        warn!("Survey {}: closing backend failed: {}", survey_id, e);
    }

    match result {
        Ok(rows) => Ok((rows, Some(output))),
        Err(e) => {
            // do not leave a header-only or truncated file behind
            if let Err(rm) = std::fs::remove_file(&output) {
                debug!("Could not remove {}: {}", output.display(), rm);
            }
            Err(e)
        }
    }
}
