use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoinerError {
    #[error("Invalid column spec: {0}")]
    InvalidColumnSpec(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No join keys resolved for table {0}")]
    UnresolvedTable(String),

    #[error("Join plan has no tables")]
    EmptyPlan,

    #[error("Master table {requested} not available, using {substitute}")]
    NoMasterTable { requested: String, substitute: String },

    #[error("Key arity mismatch joining {right} ({right_arity} keys) to {left} ({left_arity} keys)")]
    KeyArityMismatch {
        left: String,
        left_arity: usize,
        right: String,
        right_arity: usize,
    },

    #[error("Table {table} shares no join keys with {master}")]
    NoJoinKeys { table: String, master: String },

    #[error("Invalid identifier: {0}")]
    Identifier(String),

    #[error("Generated SQL failed to parse: {0}")]
    SqlSyntax(String),

    #[error("Survey {survey}: {message}")]
    Process { survey: u32, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Bad file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JoinerError {
    pub fn process(survey: u32, message: impl Into<String>) -> Self {
        JoinerError::Process {
            survey,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JoinerError>;
