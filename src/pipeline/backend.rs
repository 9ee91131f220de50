//! Seams between the pipeline and its external collaborators.
//!
//! Each trait covers one backend: the similarity index, the completion model
//! and the relational engine. The concrete adapters live in [`crate::indexer`],
//! [`crate::ollama`] and [`crate::database::sqlite`].

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc::Receiver;

use super::retriever::SchemaDocument;
use crate::Result;

/// Answer text fragments in production order
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Nearest-neighbour lookup over the indexed schema documents
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Return up to `k` documents ranked by ascending distance to `text`.
    /// An empty index yields an empty list.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SchemaDocument>>;
}

/// Text completion model used for both query synthesis and answer synthesis
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Start an incremental completion. Dropping the returned stream must stop
    /// fragment production and release the backend call.
    async fn complete_streaming(&self, prompt: &str) -> Result<FragmentStream>;
}

/// Relational engine that reports SQL errors as text instead of failing
#[async_trait]
pub trait SqlEngine: Send + Sync {
    async fn run_no_throw(&self, sql: &str) -> String;
}

/// Adapt a channel receiver into a [`FragmentStream`]. The stream ends once every
/// sender has been dropped.
#[inline]
pub fn receiver_stream(rx: Receiver<Result<String>>) -> FragmentStream {
    futures::stream::unfold(rx, |mut rx| async move {
        let next_item = rx.recv().await;
        next_item.map(|next_item| (next_item, rx))
    })
    .boxed()
}
