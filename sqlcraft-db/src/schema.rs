//! # Schema introspection
//!
//! Reads table, column and key metadata straight from SQLite (`sqlite_master`,
//! `PRAGMA table_info`, `PRAGMA foreign_key_list`). The snapshot is rebuilt on
//! every call; nothing is cached.

use crate::value::{display_value, json_value_from_sql};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::{json, Value};
use sqlcraft_error::{Error, ErrorKind, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// What to read besides the bare schema
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    /// Read one row per table as model context
    pub include_samples: bool,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self { include_samples: true }
    }
}

/// A single column, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as written in the DDL (may be empty)
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position inside the primary key, 0 when not part of it
    pub pk_position: u32,
}

/// A foreign key constraint (possibly multi-column)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    /// Empty entries mean "the referred table's primary key"
    pub referred_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    /// First row of the table, column order preserved
    pub sample: Option<Vec<(String, Value)>>,
}

/// Snapshot of every user table, sorted by name. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Prompt-friendly schema description
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("Table: {}\n", table.name));

            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    if c.decl_type.is_empty() {
                        c.name.clone()
                    } else {
                        format!("{} ({})", c.name, c.decl_type)
                    }
                })
                .collect();
            out.push_str(&format!("Columns: {}\n", columns.join(", ")));

            if !table.primary_keys.is_empty() {
                out.push_str(&format!("Primary key: {}\n", table.primary_keys.join(", ")));
            }
            for fk in &table.foreign_keys {
                out.push_str(&format!(
                    "Foreign key: {} -> {}({})\n",
                    fk.constrained_columns.join(", "),
                    fk.referred_table,
                    fk.referred_columns.join(", ")
                ));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// One `First line from <table>: ...` entry per table that has a sample
    pub fn describe_samples(&self) -> String {
        self.tables
            .iter()
            .filter_map(|t| {
                let sample = t.sample.as_ref()?;
                let cells: Vec<String> = sample
                    .iter()
                    .map(|(col, v)| format!("{}: {}", col, display_value(v)))
                    .collect();
                Some(format!("First line from {}: {}", t.name, cells.join(", ")))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `{table: {columns, primary_keys, foreign_keys}}`
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for table in &self.tables {
            let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
            map.insert(
                table.name.clone(),
                json!({
                    "columns": columns,
                    "primary_keys": table.primary_keys,
                    "foreign_keys": table.foreign_keys,
                }),
            );
        }
        Value::Object(map)
    }
}

/// Read the schema of the SQLite file at `path`.
///
/// Fails with `DatabaseNotFound` when the file is missing (it is never
/// created) and with `SchemaEmpty` when there are no user tables.
pub fn introspect(path: impl AsRef<Path>, options: &IntrospectOptions) -> Result<Schema> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    if !path.is_file() {
        return Err(Error::database_not_found(shown.clone()).with_operation("schema::introspect"));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| schema_error(e, "failed to open database"))?;

    let names = table_names(&conn)?;
    if names.is_empty() {
        return Err(Error::schema_empty(shown).with_operation("schema::introspect"));
    }

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = table_columns(&conn, &name)?;
        let mut pk: Vec<&ColumnInfo> = columns.iter().filter(|c| c.pk_position > 0).collect();
        pk.sort_by_key(|c| c.pk_position);
        let primary_keys = pk.into_iter().map(|c| c.name.clone()).collect();
        let foreign_keys = table_foreign_keys(&conn, &name)?;

        let sample = if options.include_samples {
            match sample_row(&conn, &name) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(table = %name, error = %e, "skipping sample row");
                    None
                }
            }
        } else {
            None
        };

        tables.push(TableSchema {
            name,
            columns,
            primary_keys,
            foreign_keys,
            sample,
        });
    }

    tracing::debug!(path = %path.display(), tables = tables.len(), "introspected schema");
    Ok(Schema { tables })
}

/// Schema as JSON, or `{"error": "..."}`. Never fails; meant as model context.
pub fn schema_info(path: impl AsRef<Path>) -> Value {
    let options = IntrospectOptions { include_samples: false };
    match introspect(path, &options) {
        Ok(schema) => schema.to_json(),
        Err(e) => json!({ "error": e.message() }),
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn schema_error(err: rusqlite::Error, message: &str) -> Error {
    Error::new(ErrorKind::SchemaFailed, format!("{}: {}", message, err))
        .with_operation("schema::introspect")
        .set_source(err)
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(|e| schema_error(e, "failed to list tables"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| schema_error(e, "failed to list tables"))?;
    Ok(names)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| schema_error(e, "failed to read columns").with_context("table", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                pk_position: row.get(5)?,
            })
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| schema_error(e, "failed to read columns").with_context("table", table))?;
    Ok(columns)
}

fn table_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let sql = format!("PRAGMA foreign_key_list({})", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| schema_error(e, "failed to read foreign keys").with_context("table", table))?;

    // (id, seq, referred table, from, to, on_update, on_delete)
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| schema_error(e, "failed to read foreign keys").with_context("table", table))?;

    let mut grouped: BTreeMap<i64, Vec<_>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.0).or_default().push(row);
    }

    let mut keys = Vec::with_capacity(grouped.len());
    for (_, mut parts) in grouped {
        parts.sort_by_key(|p| p.1);
        let first = &parts[0];

        // `REFERENCES t` without a column list points at t's primary key
        let implicit = if parts.iter().any(|p| p.4.is_none()) {
            referred_primary_key(conn, &first.2)?
        } else {
            Vec::new()
        };
        let referred_columns = parts
            .iter()
            .enumerate()
            .map(|(i, p)| match &p.4 {
                Some(col) => col.clone(),
                None => implicit.get(i).cloned().unwrap_or_default(),
            })
            .collect();

        keys.push(ForeignKey {
            referred_table: first.2.clone(),
            on_update: first.5.clone(),
            on_delete: first.6.clone(),
            constrained_columns: parts.iter().map(|p| p.3.clone()).collect(),
            referred_columns,
        });
    }
    Ok(keys)
}

fn referred_primary_key(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut pk: Vec<ColumnInfo> = table_columns(conn, table)?
        .into_iter()
        .filter(|c| c.pk_position > 0)
        .collect();
    pk.sort_by_key(|c| c.pk_position);
    Ok(pk.into_iter().map(|c| c.name).collect())
}

fn sample_row(conn: &Connection, table: &str) -> Result<Option<Vec<(String, Value)>>> {
    let sql = format!("SELECT * FROM {} LIMIT 1", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| schema_error(e, "failed to read sample row").with_context("table", table))?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| schema_error(e, "failed to read sample row").with_context("table", table))?;
    let Some(row) = rows
        .next()
        .map_err(|e| schema_error(e, "failed to read sample row").with_context("table", table))?
    else {
        return Ok(None);
    };

    let mut cells = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let value = row
            .get::<usize, SqlValue>(index)
            .map_err(|e| schema_error(e, "failed to decode sample").with_context("table", table))?;
        cells.push((name.clone(), json_value_from_sql(value)));
    }
    Ok(Some(cells))
}
