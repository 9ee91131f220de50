#[cfg(test)]
mod tests;

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::{CompletionBackend, FragmentStream};
use crate::Result;

/// Final answer when no schema document is relevant to the question
pub const NO_RELEVANT_TABLES_MESSAGE: &str = "No relevant tables found to answer the question.";

/// Result text used in the prompt when no query could be synthesized
pub const EMPTY_RESULT: &str = "Empty";

/// Everything the answer prompt is built from
#[derive(Debug, Clone, Copy)]
pub struct AnswerInputs<'a> {
    pub question: &'a str,
    pub schema_context: &'a str,
    pub sql: &'a str,
    pub display_result: &'a str,
    pub full_count: Option<usize>,
}

#[inline]
pub fn answer_prompt(inputs: &AnswerInputs<'_>) -> String {
    let row_count = inputs
        .full_count
        .map_or_else(|| "unknown".to_string(), |count| count.to_string());

    format!(
        r#"Given the following user question and available information, provide a helpful answer.
Use the SQL query and its result to answer the question.

Question: {question}
Tables Info: {schema}
SQL Query: {sql}
SQL Result Row Count: {row_count}
SQL Result: {result}

Important instructions:
- Answer strictly from the data shown above. Do not make assumptions beyond what is explicitly shown
- If the question is unrelated to the tables above, say that you can only answer questions about this database
- If the SQL query is "Error generating query", the result is "Empty" or the result is an error, say plainly that you cannot answer the question with the available data
- Only mention that the result was truncated if the SQL Result says so, and then report the full row count
- Format data in an easily readable way appropriate to the question (tables, lists, etc.)
- Do NOT suggest alternative queries or hypothetical solutions
- Answer in the same language as the question
"#,
        question = inputs.question,
        schema = inputs.schema_context,
        sql = inputs.sql,
        row_count = row_count,
        result = inputs.display_result,
    )
}

/// A stream that yields only the fixed no-context message
#[inline]
pub fn no_context_stream() -> FragmentStream {
    futures::stream::iter([Ok(NO_RELEVANT_TABLES_MESSAGE.to_string())]).boxed()
}

/// Streams the natural-language answer from the completion backend
pub struct AnswerSynthesizer {
    backend: Arc<dyn CompletionBackend>,
}

impl AnswerSynthesizer {
    #[inline]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Start streaming an answer. Connectivity failures opening the stream
    /// are returned to the caller.
    #[inline]
    pub async fn synthesize(&self, inputs: &AnswerInputs<'_>) -> Result<FragmentStream> {
        let prompt = answer_prompt(inputs);
        debug!("Answer prompt:\n{}", prompt);

        let stream = self.backend.complete_streaming(&prompt).await?;
        info!("Answer stream opened");
        Ok(stream)
    }
}
