//! Question answering pipeline.
//!
//! A question moves through retrieval, query synthesis, execution, result
//! bounding and answer synthesis. Each stage consumes the request's
//! [`RequestState`] and returns the next one; [`Pipeline`] sequences them and
//! short-circuits when retrieval finds nothing or synthesis fails.

pub mod answer;
pub mod backend;
pub mod bounder;
pub mod executor;
#[cfg(test)]
mod fakes;
pub mod retriever;
pub mod synthesizer;

use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use answer::{AnswerInputs, AnswerSynthesizer, EMPTY_RESULT, NO_RELEVANT_TABLES_MESSAGE};
pub use backend::{CompletionBackend, FragmentStream, SimilarityIndex, SqlEngine};
pub use bounder::{BoundedResult, bound};
pub use executor::{QueryExecutor, QueryResult};
pub use retriever::{ContextRetriever, RelevanceFilter, SchemaDocument, schema_context};
pub use synthesizer::{QuerySynthesizer, SYNTHESIS_FAILED_SENTINEL, SqlStatement};

use crate::config::Config;
use crate::{RagError, Result};

/// Position of a request in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Start,
    Retrieved,
    EmptyContext,
    Queried,
    QueryError,
    Executed,
    Bounded,
    Answered,
    AnsweredError,
}

impl Stage {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::EmptyContext | Self::Answered | Self::AnsweredError)
    }

    /// Whether `next` directly follows this stage
    #[inline]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::Retrieved)
                | (Self::Retrieved, Self::EmptyContext | Self::Queried)
                | (Self::Queried, Self::QueryError | Self::Executed)
                | (Self::QueryError, Self::AnsweredError)
                | (Self::Executed, Self::Bounded)
                | (Self::Bounded, Self::Answered)
        )
    }
}

impl fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::Retrieved => "RETRIEVED",
            Self::EmptyContext => "EMPTY_CONTEXT",
            Self::Queried => "QUERIED",
            Self::QueryError => "QUERY_ERROR",
            Self::Executed => "EXECUTED",
            Self::Bounded => "BOUNDED",
            Self::Answered => "ANSWERED",
            Self::AnsweredError => "ANSWERED_ERROR",
        };
        f.write_str(name)
    }
}

/// Everything known about one question as it moves through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct RequestState {
    question: String,
    stage: Stage,
    documents: Vec<SchemaDocument>,
    schema_context: String,
    statement: Option<SqlStatement>,
    result: Option<QueryResult>,
    bounded: Option<BoundedResult>,
}

impl RequestState {
    #[inline]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            stage: Stage::Start,
            documents: Vec::new(),
            schema_context: String::new(),
            statement: None,
            result: None,
            bounded: None,
        }
    }

    #[inline]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    #[inline]
    pub fn schema_context(&self) -> &str {
        &self.schema_context
    }

    #[inline]
    pub fn statement(&self) -> Option<&SqlStatement> {
        self.statement.as_ref()
    }

    #[inline]
    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    #[inline]
    pub fn bounded(&self) -> Option<&BoundedResult> {
        self.bounded.as_ref()
    }

    /// True row count of the executed query, if it produced rows
    #[inline]
    pub fn row_count(&self) -> Option<usize> {
        self.result.as_ref().and_then(QueryResult::row_count)
    }

    /// Move to `next`, refusing anything but a direct forward transition
    #[inline]
    pub fn advance(mut self, next: Stage) -> Result<Self> {
        if !self.stage.can_advance_to(next) {
            return Err(RagError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        info!("Request stage {} -> {}", self.stage, next);
        self.stage = next;
        Ok(self)
    }

    #[inline]
    pub fn with_documents(mut self, documents: Vec<SchemaDocument>) -> Result<Self> {
        self.schema_context = schema_context(&documents);
        self.documents = documents;
        self.advance(Stage::Retrieved)
    }

    #[inline]
    pub fn with_statement(mut self, statement: SqlStatement) -> Result<Self> {
        self.statement = Some(statement);
        self.advance(Stage::Queried)
    }

    #[inline]
    pub fn with_result(mut self, result: QueryResult) -> Result<Self> {
        self.result = Some(result);
        self.advance(Stage::Executed)
    }

    #[inline]
    pub fn with_bounded(mut self, bounded: BoundedResult) -> Result<Self> {
        self.bounded = Some(bounded);
        self.advance(Stage::Bounded)
    }

    /// Prompt inputs for the answer stage
    #[inline]
    pub fn answer_inputs(&self) -> AnswerInputs<'_> {
        let sql = self
            .statement
            .as_ref()
            .map_or(SYNTHESIS_FAILED_SENTINEL, SqlStatement::prompt_text);
        let (display_result, full_count) = self
            .bounded
            .as_ref()
            .map_or((EMPTY_RESULT, None), |bounded| {
                (bounded.display_text.as_str(), bounded.full_count)
            });

        AnswerInputs {
            question: &self.question,
            schema_context: &self.schema_context,
            sql,
            display_result,
            full_count,
        }
    }
}

/// Notified after every completed stage
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, state: &RequestState);
}

impl<F> StageObserver for F
where
    F: Fn(&RequestState) + Send + Sync,
{
    #[inline]
    fn on_stage(&self, state: &RequestState) {
        self(state);
    }
}

struct SilentObserver;

impl StageObserver for SilentObserver {
    fn on_stage(&self, _state: &RequestState) {}
}

/// Final state of a request together with its answer stream
pub struct Answer {
    state: RequestState,
    fragments: FragmentStream,
}

impl Answer {
    #[inline]
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    #[inline]
    pub fn into_parts(self) -> (RequestState, FragmentStream) {
        (self.state, self.fragments)
    }

    /// Drain the stream into a single string
    #[inline]
    pub async fn collect_text(self) -> Result<(RequestState, String)> {
        let mut fragments = self.fragments;
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment?);
        }
        Ok((self.state, text))
    }
}

impl fmt::Debug for Answer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Tunables for one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub filter: RelevanceFilter,
    pub dialect: String,
    pub max_display_rows: usize,
}

impl PipelineSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            filter: RelevanceFilter::from_config(&config.retrieval),
            dialect: config.database.dialect.clone(),
            max_display_rows: config.answer.max_display_rows,
        }
    }
}

impl Default for PipelineSettings {
    #[inline]
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Sequences the stages for each question
pub struct Pipeline {
    retriever: ContextRetriever,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    answerer: AnswerSynthesizer,
    settings: PipelineSettings,
}

impl Pipeline {
    #[inline]
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        completion: Arc<dyn CompletionBackend>,
        engine: Arc<dyn SqlEngine>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retriever: ContextRetriever::new(index, settings.filter),
            synthesizer: QuerySynthesizer::new(Arc::clone(&completion)),
            executor: QueryExecutor::new(engine),
            answerer: AnswerSynthesizer::new(completion),
            settings,
        }
    }

    /// Answer a question
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_observed(question, &SilentObserver).await
    }

    /// Answer a question, reporting each completed stage to `observer`
    #[inline]
    pub async fn answer_observed(
        &self,
        question: &str,
        observer: &dyn StageObserver,
    ) -> Result<Answer> {
        info!("Answering question: {}", question);

        let documents = self
            .retriever
            .retrieve(question, self.settings.top_k)
            .await?;
        let state = RequestState::new(question).with_documents(documents)?;
        observer.on_stage(&state);

        if state.documents().is_empty() {
            let state = state.advance(Stage::EmptyContext)?;
            observer.on_stage(&state);
            return Ok(Answer {
                state,
                fragments: answer::no_context_stream(),
            });
        }

        let statement = self
            .synthesizer
            .synthesize(question, state.schema_context(), &self.settings.dialect)
            .await;
        let state = state.with_statement(statement)?;
        observer.on_stage(&state);

        let sql = state
            .statement()
            .and_then(SqlStatement::as_sql)
            .map(ToString::to_string);
        let state = match sql {
            Some(sql) => {
                let result = self.executor.execute(&sql).await;
                let bounded = bound(&result, self.settings.max_display_rows);

                let state = state.with_result(result)?;
                observer.on_stage(&state);
                let state = state.with_bounded(bounded)?;
                observer.on_stage(&state);
                state
            }
            None => {
                let state = state.advance(Stage::QueryError)?;
                observer.on_stage(&state);
                state
            }
        };

        let fragments = self.answerer.synthesize(&state.answer_inputs()).await?;
        let terminal = if state.stage() == Stage::QueryError {
            Stage::AnsweredError
        } else {
            Stage::Answered
        };
        let state = state.advance(terminal)?;
        observer.on_stage(&state);

        Ok(Answer { state, fragments })
    }
}
