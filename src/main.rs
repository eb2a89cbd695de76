use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use survey_joiner::{ArityPolicy, RunConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "survey-joiner")]
#[command(about = "Denormalize DHS survey tables into one CSV per survey")]
#[command(long_about = "Denormalize DHS survey tables into one CSV per survey.

Every requested table is LEFT JOINed onto the master table by position of its
key columns. A table keyed more finely than the master (a 1:M join) multiplies
master rows and can make the output very large; watch for the 1:M warnings.")]
struct Args {
    /// JSON run configuration (or set SURVEY_JOINER_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tasking list: Name,RecordName,Len
    #[arg(long)]
    tasking: Option<PathBuf>,

    /// Survey id list with a DHS_id column
    #[arg(long)]
    surveys: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Table every other table is joined onto
    #[arg(long)]
    master: Option<String>,

    /// Log the generated SQL instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Leave out tables with no data for any requested column
    #[arg(long)]
    skip_blanks: bool,

    /// Keep bare column names in the output header
    #[arg(long)]
    no_qualify: bool,

    /// Fail instead of truncating when key counts differ
    #[arg(long)]
    strict_keys: bool,

    /// Print the survey summary as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<RunConfig> {
        let path = self
            .config
            .or_else(|| std::env::var("SURVEY_JOINER_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => RunConfig::load(&path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(tasking) = self.tasking {
            config.tasking_file = Some(tasking);
        }
        if let Some(surveys) = self.surveys {
            config.survey_list_file = Some(surveys);
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(master) = self.master {
            config.master_table = master;
        }
        if self.dry_run {
            config.options.dry_run = true;
        }
        if self.skip_blanks {
            config.options.skip_blanks = true;
        }
        if self.no_qualify {
            config.options.join.qualify_field_names = false;
        }
        if self.strict_keys {
            config.options.join.arity_policy = ArityPolicy::Strict;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let json = args.json;
    let config = args.into_config()?;
    info!("Survey joiner starting, master table {}", config.master_table);

    let summary = survey_joiner::run(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Survey Summary ===");
        for outcome in &summary.surveys {
            match (&outcome.error, &outcome.output) {
                (Some(e), _) => println!("{:>8}  FAILED  {}", outcome.survey_id, e),
                (None, Some(path)) => println!(
                    "{:>8}  {:>8} rows  {}",
                    outcome.survey_id,
                    outcome.rows.unwrap_or(0),
                    path.display()
                ),
                (None, None) => println!("{:>8}  dry run", outcome.survey_id),
            }
        }
    }

    if summary.surveys.is_empty() {
        warn!("Survey list was empty, nothing to do");
    } else if summary.succeeded() == 0 {
        bail!("all {} surveys failed", summary.failed());
    }

    Ok(())
}
