//! In-memory backends for exercising the pipeline without external services.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backend::{CompletionBackend, FragmentStream, SimilarityIndex, SqlEngine};
use super::retriever::SchemaDocument;
use crate::{RagError, Result};

pub struct FakeIndex {
    documents: Vec<SchemaDocument>,
    queries: AtomicUsize,
}

impl FakeIndex {
    pub fn new(documents: Vec<SchemaDocument>) -> Self {
        Self {
            documents,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimilarityIndex for FakeIndex {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<SchemaDocument>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.iter().take(k).cloned().collect())
    }
}

pub struct FakeCompletion {
    reply: Option<String>,
    fragments: Vec<String>,
    complete_calls: Mutex<Vec<(String, String)>>,
    stream_prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(reply: &str, fragments: Vec<&str>) -> Self {
        Self {
            reply: Some(reply.to_string()),
            fragments: fragments.into_iter().map(str::to_string).collect(),
            complete_calls: Mutex::new(Vec::new()),
            stream_prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose every call fails
    pub fn failing() -> Self {
        Self {
            reply: None,
            fragments: Vec::new(),
            complete_calls: Mutex::new(Vec::new()),
            stream_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn complete_calls(&self) -> Vec<(String, String)> {
        self.complete_calls.lock().expect("lock poisoned").clone()
    }

    pub fn stream_prompts(&self) -> Vec<String> {
        self.stream_prompts.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeCompletion {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.complete_calls
            .lock()
            .expect("lock poisoned")
            .push((system_prompt.to_string(), user_prompt.to_string()));
        self.reply
            .clone()
            .ok_or_else(|| RagError::Completion("backend unavailable".to_string()))
    }

    async fn complete_streaming(&self, prompt: &str) -> Result<FragmentStream> {
        self.stream_prompts
            .lock()
            .expect("lock poisoned")
            .push(prompt.to_string());
        if self.reply.is_none() {
            return Err(RagError::Network("backend unavailable".to_string()));
        }
        let fragments: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(fragments).boxed())
    }
}

pub struct FakeEngine {
    output: String,
    statements: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new(output: &str) -> Self {
        Self {
            output: output.to_string(),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl SqlEngine for FakeEngine {
    async fn run_no_throw(&self, sql: &str) -> String {
        self.statements
            .lock()
            .expect("lock poisoned")
            .push(sql.to_string());
        self.output.clone()
    }
}
