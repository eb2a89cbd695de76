//! Execution backends for generated SQL.
//!
//! A backend lives for exactly one survey. [`SqliteBackend`] keeps its tables
//! in an in-memory SQLite database that disappears when the backend is
//! dropped, so nothing carries over into the next survey.
//! [`RecordingBackend`] executes nothing; it syntax-checks and keeps each
//! statement so a plan can be inspected before it is run for real.

use crate::error::Result;
use crate::schema::MISSING_VALUE;
use crate::sink::RowSink;
use crate::sql::check_statement;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info, warn};

pub trait Backend {
    /// Run a statement that returns no rows (DDL, CREATE TABLE .. AS).
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Bind each row to `insert_sql` and run it. Returns rows inserted.
    fn insert_rows(
        &mut self,
        insert_sql: &str,
        rows: &mut dyn Iterator<Item = Result<Vec<String>>>,
    ) -> Result<usize>;

    /// Run a query, passing its column names then every row to `sink`.
    /// Returns rows written.
    fn query_into(&mut self, sql: &str, sink: &mut dyn RowSink) -> Result<usize>;
}

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Close the connection, reporting any error instead of swallowing it in
    /// `Drop`.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => MISSING_VALUE.to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

impl Backend for SqliteBackend {
    fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("SQL: {}", sql);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn insert_rows(
        &mut self,
        insert_sql: &str,
        rows: &mut dyn Iterator<Item = Result<Vec<String>>>,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(insert_sql)?;
            for row in rows {
                let row = row?;
                stmt.execute(params_from_iter(row.iter()))?;
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    fn query_into(&mut self, sql: &str, sink: &mut dyn RowSink) -> Result<usize> {
        debug!("SQL: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let header: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        sink.write_header(&header)?;

        let mut rows = stmt.query([])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            let values = (0..header.len())
                .map(|i| row.get_ref(i).map(value_to_string))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            sink.write_row(&values)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Dry-run backend: checks and records statements, executes nothing.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    statements: Vec<String>,
    rows_seen: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    fn record(&mut self, sql: &str) -> Result<()> {
        check_statement(sql)?;
        info!("{};", sql);
        self.statements.push(sql.to_string());
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.record(sql)
    }

    fn insert_rows(
        &mut self,
        insert_sql: &str,
        rows: &mut dyn Iterator<Item = Result<Vec<String>>>,
    ) -> Result<usize> {
        // placeholders are not checked; the template shape is covered by schema tests
        self.statements.push(insert_sql.to_string());
        let mut count = 0;
        for row in rows {
            row?;
            count += 1;
        }
        self.rows_seen += count;
        Ok(count)
    }

    fn query_into(&mut self, sql: &str, _sink: &mut dyn RowSink) -> Result<usize> {
        self.record(sql)?;
        warn!("Dry run: query not executed, no rows written");
        Ok(0)
    }
}
