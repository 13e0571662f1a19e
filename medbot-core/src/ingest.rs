// medbot-core/src/ingest.rs

//! Loads the dataset CSV files into the SQLite databases the query tools read.

use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::MedbotError;
use crate::tools::dataset::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
        let mut column_type = ColumnType::Integer;
        let mut seen_value = false;
        for cell in cells.filter(|c| !c.is_empty()) {
            seen_value = true;
            if column_type == ColumnType::Integer && cell.parse::<i64>().is_err() {
                column_type = ColumnType::Real;
            }
            if column_type == ColumnType::Real && cell.parse::<f64>().is_err() {
                return ColumnType::Text;
            }
        }
        if seen_value {
            column_type
        } else {
            ColumnType::Text
        }
    }

    fn value(&self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => cell
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            ColumnType::Real => cell
                .parse::<f64>()
                .map(Value::Real)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
            ColumnType::Text => Value::Text(cell.to_string()),
        }
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().replace(' ', "_").to_lowercase()
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Replaces `table` in the database at `db_path` with the contents of
/// `csv_path`. Returns the number of rows written.
pub fn csv_to_sqlite(csv_path: &Path, db_path: &Path, table: &str) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header of {}", csv_path.display()))?
        .iter()
        .map(normalize_header)
        .collect();
    if headers.is_empty() || headers.iter().any(|h| h.is_empty()) {
        return Err(anyhow!("{} has an empty column name", csv_path.display()));
    }
    let mut unique = HashSet::new();
    if let Some(dup) = headers.iter().find(|h| !unique.insert(h.as_str())) {
        return Err(anyhow!(
            "{} has duplicate column '{}' after normalization",
            csv_path.display(),
            dup
        ));
    }

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read CSV records of {}", csv_path.display()))?;

    let column_types: Vec<ColumnType> = (0..headers.len())
        .map(|i| ColumnType::infer(records.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();

    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let tx = conn.transaction()?;

    let columns_sql: Vec<String> = headers
        .iter()
        .zip(&column_types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect();
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
        table = quote_ident(table),
        columns = columns_sql.join(", ")
    ))?;

    {
        let placeholders = vec!["?"; headers.len()].join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(table),
            placeholders
        ))?;
        for record in &records {
            let values = column_types
                .iter()
                .enumerate()
                .map(|(i, ty)| ty.value(record.get(i).unwrap_or("")));
            insert.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    info!(
        csv = %csv_path.display(),
        db = %db_path.display(),
        table,
        rows = records.len(),
        "Ingested CSV file."
    );
    Ok(records.len())
}

/// Ingests every dataset CSV under `data_dir` into its database in `db_dir`.
pub fn ingest_all(data_dir: &Path, db_dir: &Path) -> Result<Vec<(Dataset, PathBuf, usize)>> {
    for dataset in Dataset::ALL {
        let csv_path = data_dir.join(dataset.csv_file());
        if !csv_path.is_file() {
            return Err(MedbotError::Ingest(format!(
                "missing CSV file for the {} dataset: {}",
                dataset,
                csv_path.display()
            ))
            .into());
        }
    }

    fs::create_dir_all(db_dir)
        .with_context(|| format!("Failed to create database directory {}", db_dir.display()))?;

    let mut written = Vec::new();
    for dataset in Dataset::ALL {
        let db_path = db_dir.join(dataset.database_file());
        let rows = csv_to_sqlite(
            &data_dir.join(dataset.csv_file()),
            &db_path,
            dataset.table_name(),
        )
        .map_err(|e| MedbotError::Ingest(format!("{} dataset: {:#}", dataset, e)))?;
        written.push((dataset, db_path, rows));
    }
    Ok(written)
}
