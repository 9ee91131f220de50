
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::CompletionBackend;

/// Text that stands in for the query in prompts when synthesis failed
pub const SYNTHESIS_FAILED_SENTINEL: &str = "Error generating query";

/// Outcome of query synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlStatement {
    Query(String),
    SynthesisFailed,
}

impl SqlStatement {
    #[inline]
    pub fn as_sql(&self) -> Option<&str> {
        match self {
            Self::Query(sql) => Some(sql),
            Self::SynthesisFailed => None,
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::SynthesisFailed)
    }

    /// Rendering used inside prompts
    #[inline]
    pub fn prompt_text(&self) -> &str {
        self.as_sql().unwrap_or(SYNTHESIS_FAILED_SENTINEL)
    }
}

impl fmt::Display for SqlStatement {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prompt_text())
    }
}

/// Reasons a model reply did not yield a query
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Reply contains no '{{'")]
    NoOpeningBrace,
    #[error("Reply contains no '}}' after the first '{{'")]
    NoClosingBrace,
    #[error("Reply JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Reply JSON has no string field 'query'")]
    MissingQuery,
    #[error("Reply query is blank")]
    BlankQuery,
}

/// Extract the `query` field from the first brace-delimited span of `reply`.
///
/// The span runs from the first `{` to the first `}` after it, so nested
/// objects are not supported.
#[inline]
pub fn extract_query(reply: &str) -> Result<String, ExtractError> {
    let (_, after_open) = reply
        .split_once('{')
        .ok_or(ExtractError::NoOpeningBrace)?;
    let (body, _) = after_open
        .split_once('}')
        .ok_or(ExtractError::NoClosingBrace)?;

    let value: serde_json::Value = serde_json::from_str(&format!("{{{}}}", body))?;
    let query = value
        .get("query")
        .and_then(serde_json::Value::as_str)
        .ok_or(ExtractError::MissingQuery)?
        .trim();

    if query.is_empty() {
        return Err(ExtractError::BlankQuery);
    }
    Ok(query.to_string())
}

#[inline]
pub fn system_prompt(dialect: &str, schema_context: &str) -> String {
    format!(
        r#"Given an input question, create a syntactically correct {dialect} query to run to help find the answer. Only query for the few relevant columns given the question.

Write exactly one read-only SELECT statement. Never modify data or schema.

Pay attention to use only the column names that you can see in the schema description. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.

Only use the following tables:
{schema_context}

Return your response as a single JSON object with the following format and nothing else:
{{
  "query": "your SQL query here"
}}
"#
    )
}

#[inline]
pub fn user_prompt(question: &str) -> String {
    format!("Question: {}", question)
}

/// Turns a question and its schema context into one SQL statement
pub struct QuerySynthesizer {
    backend: Arc<dyn CompletionBackend>,
}

impl QuerySynthesizer {
    #[inline]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Ask the completion backend for a query. Every failure collapses into
    /// [`SqlStatement::SynthesisFailed`].
    #[inline]
    pub async fn synthesize(
        &self,
        question: &str,
        schema_context: &str,
        dialect: &str,
    ) -> SqlStatement {
        let system = system_prompt(dialect, schema_context);
        let user = user_prompt(question);
        debug!("Query synthesis prompt:\n{}\n{}", system, user);

        let reply = match self.backend.complete(&system, &user).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Query synthesis call failed: {}", e);
                return SqlStatement::SynthesisFailed;
            }
        };
        debug!("Raw synthesis reply: {}", reply);

        match extract_query(&reply) {
            Ok(sql) => {
                info!("Synthesized query: {}", sql);
                SqlStatement::Query(sql)
            }
            Err(e) => {
                warn!("Could not parse synthesized query: {}", e);
                SqlStatement::SynthesisFailed
            }
        }
    }
}
