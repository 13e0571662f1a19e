// medbot-core/src/sql/database.rs
use anyhow::{anyhow, Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::errors::MedbotError;

const MAX_QUERY_ROWS: usize = 100;
const SAMPLE_ROWS: usize = 3;

/// A read-only SQLite database, opened on first use and then kept open.
#[derive(Clone)]
pub struct SqlDatabase {
    path: PathBuf,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqlDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connection: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| anyhow!("database connection lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(open_read_only(&path)?);
            }
            match guard.as_ref() {
                Some(conn) => f(conn),
                None => Err(anyhow!("database connection unavailable")),
            }
        })
        .await
        .context("database task panicked")?
    }

    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| table_names(conn)).await
    }

    /// CREATE statements plus a few sample rows for each requested table.
    pub async fn table_info(&self, tables: Vec<String>) -> Result<String> {
        self.with_connection(move |conn| {
            let known = table_names(conn)?;
            let unknown: Vec<&str> = tables
                .iter()
                .filter(|t| !known.contains(*t))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(anyhow!(
                    "Unknown table(s): {}. Available tables: {}",
                    unknown.join(", "),
                    known.join(", ")
                ));
            }

            let mut sections = Vec::new();
            for table in &tables {
                let create: String = conn
                    .query_row(
                        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [table],
                        |row| row.get(0),
                    )
                    .with_context(|| format!("Failed to read schema of table '{}'", table))?;
                let sample = render_query(
                    conn,
                    &format!("SELECT * FROM \"{}\" LIMIT {}", table.replace('"', "\"\""), SAMPLE_ROWS),
                    SAMPLE_ROWS,
                )?;
                sections.push(format!(
                    "{}\n\n/*\n{} rows from {} table:\n{}\n*/",
                    create.trim(),
                    SAMPLE_ROWS,
                    table,
                    sample
                ));
            }
            Ok(sections.join("\n\n"))
        })
        .await
    }

    /// Runs one read-only statement and renders its rows as text.
    pub async fn run_query(&self, sql: String) -> Result<String> {
        debug!(db = %self.path.display(), sql = %sql, "Running SQL query.");
        self.with_connection(move |conn| render_query(conn, &sql, MAX_QUERY_ROWS))
            .await
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(MedbotError::Database(anyhow!(
            "database file not found: {}. Run `medbot ingest` to create it.",
            path.display()
        ))
        .into());
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| MedbotError::Database(anyhow!(e)))
    .with_context(|| format!("Failed to open database {}", path.display()))?;
    info!(db = %path.display(), "Opened dataset database.");
    Ok(conn)
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn render_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<String> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare query")?;
    if !stmt.readonly() {
        return Err(anyhow!("Only read-only queries are allowed"));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut lines = vec![columns.join(" | ")];
    let mut rows = stmt.query([]).context("Failed to run query")?;
    let mut row_count = 0;
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if row_count == max_rows {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            cells.push(render_value(row.get_ref(i)?));
        }
        lines.push(cells.join(" | "));
        row_count += 1;
    }

    if row_count == 0 {
        lines.push("(no rows)".to_string());
    }
    if truncated {
        lines.push(format!("... (truncated after {} rows)", max_rows));
    }
    Ok(lines.join("\n"))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
