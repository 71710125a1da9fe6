//! # sqlcraft DB
//!
//! Everything sqlcraft does against the SQLite file.
//!
//! ## Pieces
//! - **Schema**: table/column/key metadata plus an optional sample row per table
//! - **Guard**: cleanup of model-written SQL and the read-only keyword allow-list
//! - **Executor**: runs one statement on a read-only connection and collects rows
//!
//! Every call opens its own connection and drops it before returning.

pub mod executor;
pub mod guard;
pub mod schema;
mod value;

#[cfg(test)]
mod fixtures;

pub use executor::{QueryExecutor, ResultSet};
pub use guard::{check_statement, clean_candidate, leading_keyword, ALLOWED_KEYWORDS};
pub use schema::{
    introspect, schema_info, ColumnInfo, ForeignKey, IntrospectOptions, Schema, TableSchema,
};
pub use value::display_value;
pub use sqlcraft_error::{Error, ErrorKind, Result};
