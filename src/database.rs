//! SQLite store access and read-only query execution.
//!
//! Every call opens its own read-only connection on the blocking pool and
//! materializes all rows before the connection is dropped. A semaphore bounds
//! how many connections are open at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::QueryExecutionError;
use crate::sql_guard::ValidatedQuery;

// ─── Result types ────────────────────────────────────────────────────────────

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(n) => write!(f, "{n}"),
            SqlValue::Real(x) => write!(f, "{x}"),
            SqlValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(n) => SqlValue::Integer(n),
            Value::Real(x) => SqlValue::Real(x),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(_) => SqlValue::Text("[BLOB]".to_string()),
        }
    }
}

/// One result row: column name → value, in result-column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, SqlValue)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    pub fn cells(&self) -> &[(String, SqlValue)] {
        &self.cells
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Fully materialized query result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    permits: Arc<Semaphore>,
    busy_timeout: Duration,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>, max_connections: usize, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
            busy_timeout,
        }
    }

    /// Handle for the configured database file. The file must already exist.
    pub fn open(cfg: &DatabaseConfig) -> Result<Self, QueryExecutionError> {
        let path = resolve_db_path(&cfg.path);
        if !path.exists() {
            return Err(QueryExecutionError::new(format!(
                "database not found: {} (run `data-gpt init-db` first)",
                path.display()
            )));
        }
        info!("Using database {}", path.display());
        Ok(Self::new(path, cfg.max_connections, Duration::from_millis(cfg.busy_timeout_ms)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a validated query and return every row.
    pub async fn execute(&self, query: &ValidatedQuery) -> Result<ResultSet, QueryExecutionError> {
        let sql = query.as_str().to_string();
        debug!("Executing SQL: {}", sql);
        let result = self.with_connection(move |conn| run_query(conn, &sql)).await?;
        debug!("Query returned {} row(s)", result.len());
        Ok(result)
    }

    /// Run `f` against a fresh read-only connection on the blocking pool.
    pub(crate) async fn with_connection<T, F>(&self, f: F) -> Result<T, QueryExecutionError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, QueryExecutionError> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| QueryExecutionError::new(format!("connection pool closed: {e}")))?;
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;

        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path, busy_timeout)?;
            let out = f(&conn);
            drop(conn);
            drop(permit);
            out
        })
        .await?
    }

    /// Create the dataset tables if they do not exist yet.
    ///
    /// This is the only write path in the crate; questions never go through it.
    pub fn create_schema(path: &Path) -> rusqlite::Result<()> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY,
                telegram_id INTEGER UNIQUE,
                username    TEXT    NOT NULL,
                first_name  TEXT    NOT NULL
            );

            CREATE TABLE IF NOT EXISTS videos (
                id               TEXT    PRIMARY KEY,
                creator_id       TEXT    NOT NULL,
                video_created_at TEXT,
                views_count      INTEGER,
                likes_count      INTEGER,
                comments_count   INTEGER,
                reports_count    INTEGER,
                created_at       TEXT,
                updated_at       TEXT
            );

            CREATE TABLE IF NOT EXISTS video_snapshots (
                id                   TEXT    PRIMARY KEY,
                video_id             TEXT    NOT NULL REFERENCES videos(id),
                views_count          INTEGER,
                likes_count          INTEGER,
                comments_count       INTEGER,
                reports_count        INTEGER,
                delta_views_count    INTEGER,
                delta_likes_count    INTEGER,
                delta_comments_count INTEGER,
                delta_reports_count  INTEGER,
                created_at           TEXT,
                updated_at           TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_videos_creator   ON videos (creator_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_video  ON video_snapshots (video_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_ts     ON video_snapshots (created_at);
        ",
        )
    }
}

fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection, QueryExecutionError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| QueryExecutionError::new(format!("cannot open {}: {}", path.display(), e)))?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

fn run_query(conn: &Connection, sql: &str) -> Result<ResultSet, QueryExecutionError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let value: Value = row.get(i)?;
            cells.push((name.clone(), SqlValue::from(value)));
        }
        out.push(Row::new(cells));
    }

    Ok(ResultSet { columns, rows: out })
}

/// Resolve bare DB filenames to the local app data directory.
pub fn resolve_db_path(db_path: &str) -> PathBuf {
    let path = Path::new(db_path);
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    match dirs::data_local_dir() {
        Some(data_dir) => data_dir.join("data-gpt").join(db_path),
        None => path.to_path_buf(),
    }
}
