use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Pool, Row, Sqlite, TypeInfo, ValueRef};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::pipeline::SqlEngine;


pub type DbPool = Pool<Sqlite>;

/// DDL of one table or view, as recorded in `sqlite_master`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    pub name: String,
    pub ddl: String,
}

/// Read-only SQLite engine for generated queries
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    pool: DbPool,
}

impl SqliteEngine {
    /// Open an existing database file without write access
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Database file not found: {}", path.display());
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        info!("Opened database {} read-only", path.display());
        Ok(Self { pool })
    }

    /// Tables and views, excluding SQLite's internal objects, ordered by name
    #[inline]
    pub async fn schema_sources(&self) -> Result<Vec<SchemaSource>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read schema from sqlite_master")?;

        debug!("Found {} schema objects", rows.len());
        Ok(rows
            .into_iter()
            .map(|(name, ddl)| SchemaSource { name, ddl })
            .collect())
    }

    /// Run `sql` and render the rows in literal form
    #[inline]
    pub async fn run(&self, sql: &str) -> Result<String> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .context("Query failed")?;
        render_rows(&rows)
    }
}

#[async_trait]
impl SqlEngine for SqliteEngine {
    async fn run_no_throw(&self, sql: &str) -> String {
        match self.run(sql).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Query failed: {:#}", e);
                format!("Error: {:#}", e)
            }
        }
    }
}

/// Render rows as a list of column-to-value mappings
fn render_rows(rows: &[SqliteRow]) -> Result<String> {
    let rendered = rows.iter().map(render_row).collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", rendered.join(", ")))
}

fn render_row(row: &SqliteRow) -> Result<String> {
    let mut fields = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = render_value(row, index)
            .with_context(|| format!("Failed to decode column {}", column.name()))?;
        fields.push(format!("{}: {}", quote_text(column.name()), value));
    }
    Ok(format!("{{{}}}", fields.join(", ")))
}

fn render_value(row: &SqliteRow, index: usize) -> Result<String> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok("None".to_string());
    }

    let type_name = raw.type_info().name().to_string();
    let rendered = match type_name.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(index)?.to_string(),
        "REAL" => format_real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            let hex = bytes.iter().fold(String::new(), |mut acc, byte| {
                let _ = write!(acc, "{:02x}", byte);
                acc
            });
            quote_text(&hex)
        }
        _ => quote_text(&row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(rendered)
}

fn format_real(value: f64) -> String {
    if value.is_finite() {
        format!("{:?}", value)
    } else {
        // Not representable as a literal; keep it readable as text
        quote_text(&value.to_string())
    }
}

/// Quote text the way a Python `repr` would
fn quote_text(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
