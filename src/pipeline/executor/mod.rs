pub mod literal;

use serde::Serialize;
use serde_json::Value;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::SqlEngine;
pub use literal::{LiteralError, parse_literal};

/// Result of running a statement, decided once at the executor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryResult {
    Rows(Vec<Value>),
    EngineError(String),
}

impl QueryResult {
    /// Number of rows, or `None` for an engine error
    #[inline]
    pub fn row_count(&self) -> Option<usize> {
        match self {
            Self::Rows(rows) => Some(rows.len()),
            Self::EngineError(_) => None,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::EngineError(_))
    }
}

/// Why a statement was refused before reaching the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error("Statement is empty")]
    Empty,
    #[error("Only SELECT statements may be executed, found {0}")]
    NotReadOnly(String),
    #[error("Statement contains data-modifying keyword {0}")]
    DataModifying(String),
    #[error("Only a single statement may be executed")]
    MultipleStatements,
    #[error("Statement could not be parsed: {0}")]
    Unparseable(String),
}

/// Accept only a single read-only query
#[inline]
pub fn check_read_only(sql: &str) -> Result<(), StatementError> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| StatementError::Unparseable(e.to_string()))?;

    let mut statements = statements.into_iter();
    let statement = statements.next().ok_or(StatementError::Empty)?;
    if statements.next().is_some() {
        return Err(StatementError::MultipleStatements);
    }

    match statement {
        Statement::Query(query) => check_query(&query),
        other => Err(StatementError::NotReadOnly(leading_keyword(&other))),
    }
}

/// A query is read-only when its body and every CTE body are
fn check_query(query: &Query) -> Result<(), StatementError> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> Result<(), StatementError> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => {
            Err(StatementError::DataModifying("INTO".to_string()))
        }
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        other => Err(StatementError::DataModifying(leading_keyword(other))),
    }
}

fn leading_keyword(node: &impl fmt::Display) -> String {
    node.to_string()
        .split_whitespace()
        .next()
        .map(str::to_uppercase)
        .unwrap_or_default()
}

/// Turn the engine's text output into a [`QueryResult`]
#[inline]
pub fn classify_output(output: String) -> QueryResult {
    match parse_literal(&output) {
        Ok(Value::Array(rows)) => QueryResult::Rows(rows),
        Ok(_) => {
            warn!("Engine output is not a sequence: {}", output);
            QueryResult::EngineError(output)
        }
        Err(e) => {
            warn!("Engine output is not a row literal ({}): {}", e, output);
            QueryResult::EngineError(output)
        }
    }
}

/// Runs statements against the relational engine without raising
pub struct QueryExecutor {
    engine: Arc<dyn SqlEngine>,
}

impl QueryExecutor {
    #[inline]
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub async fn execute(&self, sql: &str) -> QueryResult {
        if let Err(e) = check_read_only(sql) {
            warn!("Refusing to execute statement: {}", e);
            return QueryResult::EngineError(format!("Error: {}", e));
        }

        let output = self.engine.run_no_throw(sql).await;
        debug!("Engine output: {}", output);

        let result = classify_output(output);
        if let Some(count) = result.row_count() {
            info!("Query returned {} rows", count);
        }
        result
    }
}
