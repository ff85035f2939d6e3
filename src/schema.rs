//! Live schema introspection for prompting.
//!
//! The summary is read from SQLite's catalog on every request, never from
//! static declarations, so the prompt always matches the actual database.

use std::fmt::Write as _;

use rusqlite::Connection;
use serde::Serialize;

use crate::database::Database;
use crate::error::QueryExecutionError;

pub const EMPTY_SCHEMA_TEXT: &str = "No tables found in the database.";

const INTROSPECTION_SQL: &str = "
    SELECT m.name, p.name, p.type
    FROM sqlite_master AS m
    JOIN pragma_table_info(m.name) AS p
    WHERE m.type IN ('table', 'view')
      AND substr(m.name, 1, 7) <> 'sqlite_'
    ORDER BY m.name, p.cid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Tables ordered by name, columns by declared position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SchemaSummary {
    pub tables: Vec<TableSchema>,
}

impl SchemaSummary {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// One line per table: `table: col (type), col (type)`.
    pub fn to_prompt_text(&self) -> String {
        if self.is_empty() {
            return EMPTY_SCHEMA_TEXT.to_string();
        }

        let mut out = String::new();
        for table in &self.tables {
            let columns = table
                .columns
                .iter()
                .map(|c| {
                    if c.data_type.is_empty() {
                        c.name.clone()
                    } else {
                        format!("{} ({})", c.name, c.data_type)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{}: {}", table.name, columns);
        }
        out.trim_end().to_string()
    }

    fn push(&mut self, table: String, column: ColumnInfo) {
        match self.tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => self.tables.push(TableSchema { name: table, columns: vec![column] }),
        }
    }
}

impl Database {
    /// Read the current tables and columns from the live catalog.
    pub async fn schema_summary(&self) -> Result<SchemaSummary, QueryExecutionError> {
        self.with_connection(read_schema).await
    }
}

fn read_schema(conn: &Connection) -> Result<SchemaSummary, QueryExecutionError> {
    let mut stmt = conn.prepare(INTROSPECTION_SQL)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut summary = SchemaSummary::default();
    for row in rows {
        let (table, name, data_type) = row?;
        summary.push(table, ColumnInfo { name, data_type });
    }
    Ok(summary)
}
