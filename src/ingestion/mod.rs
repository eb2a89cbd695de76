//! Ingestion Module
//!
//! Everything that touches input files:
//! - locating per-survey table and record-spec files
//! - reading the tasking list and survey ids
//! - streaming source tables into the join backend

pub mod locate;
pub mod source;
pub mod tasking;

pub use locate::{Resolution, TablePathResolver};
pub use source::{load_source_table, LoadStats};
pub use tasking::{read_record_spec, read_survey_ids, read_tasking, RequestedColumns};
