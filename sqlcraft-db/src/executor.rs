//! Read-only query execution

use crate::guard::check_statement;
use crate::value::{display_value, json_value_from_sql};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use sqlcraft_error::{Error, Result};
use std::path::{Path, PathBuf};

pub const RESULTS_BEGIN: &str = "<<<BEGIN_SQL_RESULTS>>>";
pub const RESULTS_END: &str = "<<<END_SQL_RESULTS>>>";
const RESULTS_INSTRUCTION: &str =
    "IMPORTANT: Your final answer MUST include ALL fields shown above in EXACTLY the same format and order.";

/// Rows returned by one statement, columns in statement order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// True when the row cap cut the result short
    pub truncated: bool,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows as ordered `(column, value)` pairs
    pub fn records(&self) -> Vec<Vec<(&str, &Value)>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter())
                    .collect()
            })
            .collect()
    }

    /// Array of `{column: value}` objects
    pub fn to_json(&self) -> Value {
        let rows = self
            .records()
            .into_iter()
            .map(|record| {
                let map: serde_json::Map<String, Value> = record
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                Value::Object(map)
            })
            .collect();
        Value::Array(rows)
    }

    /// Numbered listing framed by the result markers, as handed to the model
    pub fn render_block(&self) -> String {
        let mut out = format!("{}\n", RESULTS_BEGIN);
        for (idx, record) in self.records().into_iter().enumerate() {
            let cells: Vec<String> = record
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, display_value(v)))
                .collect();
            out.push_str(&format!("{}. {}\n", idx + 1, cells.join(", ")));
        }
        if self.truncated {
            out.push_str(&format!("(truncated after {} rows)\n", self.rows.len()));
        }
        out.push_str(RESULTS_END);
        out.push('\n');
        out.push_str(RESULTS_INSTRUCTION);
        out.push('\n');
        out
    }
}

/// Runs single statements against a SQLite file opened read-only.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    path: PathBuf,
    row_cap: Option<usize>,
}

impl QueryExecutor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            row_cap: None,
        }
    }

    /// Stop collecting after `cap` rows and mark the result truncated.
    /// A cap of zero is raised to one.
    pub fn with_row_cap(mut self, cap: usize) -> Self {
        self.row_cap = Some(cap.max(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check, then run `sql` on a fresh read-only connection.
    ///
    /// Rejected statements never reach the database.
    pub fn execute(&self, sql: &str) -> Result<ResultSet> {
        let sql = sql.trim();
        check_statement(sql).map_err(|e| e.with_operation("executor::execute"))?;

        if !self.path.is_file() {
            return Err(Error::database_not_found(self.path.display().to_string())
                .with_operation("executor::execute"));
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| driver_error(e, sql))?;

        let result = run(&conn, sql, self.row_cap)?;
        tracing::debug!(
            rows = result.len(),
            columns = result.columns.len(),
            truncated = result.truncated,
            "query executed"
        );
        Ok(result)
    }
}

fn run(conn: &Connection, sql: &str, row_cap: Option<usize>) -> Result<ResultSet> {
    let mut stmt = conn.prepare(sql).map_err(|e| driver_error(e, sql))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([]).map_err(|e| driver_error(e, sql))?;
    let mut result = ResultSet {
        columns,
        ..Default::default()
    };

    while let Some(row) = rows.next().map_err(|e| driver_error(e, sql))? {
        if row_cap.is_some_and(|cap| result.rows.len() >= cap) {
            result.truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(result.columns.len());
        for index in 0..result.columns.len() {
            let value = row
                .get::<usize, SqlValue>(index)
                .map_err(|e| driver_error(e, sql))?;
            values.push(json_value_from_sql(value));
        }
        result.rows.push(values);
    }

    Ok(result)
}

fn is_read_only_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => failure.code == ErrorCode::ReadOnly,
        other => other.to_string().to_ascii_lowercase().contains("readonly"),
    }
}

fn driver_error(err: rusqlite::Error, sql: &str) -> Error {
    let base = if is_read_only_failure(&err) {
        Error::read_only_violation()
    } else {
        Error::query_failed(format!("database error: {}", err))
    };
    base.with_operation("executor::execute")
        .with_context("sql", sql)
        .set_source(err)
}
