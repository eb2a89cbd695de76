pub mod backend;
pub mod column;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod keys;
pub mod pipeline;
pub mod plan;
pub mod schema;
pub mod sink;
pub mod sql;

pub use backend::{Backend, RecordingBackend, SqliteBackend};
pub use column::{ColumnInfo, KeyTuple};
pub use config::{RunConfig, SurveyOptions};
pub use error::{JoinerError, Result};
pub use keys::{JoinKeyResolver, RecordSpecRow, ResolvedKeys};
pub use pipeline::{run, RunSummary, SurveyOutcome, SurveyPipeline};
pub use plan::{ArityPolicy, JoinOptions, JoinPlan, MultiTableJoiner};
pub use schema::TableSchema;
pub use sink::{CsvSink, MemorySink, RowSink};
