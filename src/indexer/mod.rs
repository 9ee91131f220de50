// Indexer module
// Embeds schema documents into the vector store and answers similarity queries

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::lancedb::{SchemaRecord, VectorStore};
use crate::database::sqlite::{SchemaSource, SqliteEngine};
use crate::ollama::OllamaClient;
use crate::pipeline::{SchemaDocument, SimilarityIndex};
use crate::{RagError, Result};

/// Statistics about a completed index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingStats {
    pub documents_indexed: usize,
    pub vector_dimension: usize,
}

/// Similarity index over schema documents backed by Ollama embeddings and LanceDB
pub struct SchemaIndex {
    client: OllamaClient,
    store: VectorStore,
}

impl SchemaIndex {
    #[inline]
    pub fn new(client: OllamaClient, store: VectorStore) -> Self {
        Self { client, store }
    }

    /// Open the index described by `config`
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let client = OllamaClient::new(config)
            .map_err(|e| RagError::Config(format!("Failed to initialize Ollama client: {:#}", e)))?;
        let store = VectorStore::new(config).await?;
        Ok(Self::new(client, store))
    }

    #[inline]
    pub async fn document_count(&self) -> Result<usize> {
        self.store.count().await
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || client.embed_batch(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }

    /// Replace the index contents with one document per schema source
    #[inline]
    pub async fn rebuild(&mut self, sources: &[SchemaSource]) -> Result<IndexingStats> {
        info!("Embedding {} schema documents", sources.len());

        let texts: Vec<String> = sources.iter().map(|source| source.ddl.clone()).collect();
        let embeddings = self.embed_texts(texts).await?;

        let records: Vec<SchemaRecord> = sources
            .iter()
            .zip(embeddings)
            .map(|(source, vector)| SchemaRecord::new(&source.name, vector, &source.ddl))
            .collect();

        self.store.replace_all(&records).await?;

        let stats = IndexingStats {
            documents_indexed: records.len(),
            vector_dimension: self.store.vector_dimension(),
        };
        info!(
            "Indexed {} schema documents ({} dimensions)",
            stats.documents_indexed, stats.vector_dimension
        );
        Ok(stats)
    }
}

#[async_trait]
impl SimilarityIndex for SchemaIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SchemaDocument>> {
        if self.store.count().await? == 0 {
            debug!("Schema index is empty");
            return Ok(Vec::new());
        }

        let query_vector = self
            .embed_texts(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("No embedding returned for question".to_string()))?;

        let hits = self.store.search(&query_vector, k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| SchemaDocument {
                id: hit.id,
                text: hit.content,
                distance: hit.distance,
            })
            .collect())
    }
}

/// Read the schema of the configured database and rebuild the index from it
#[inline]
pub async fn index_database(config: &Config) -> Result<IndexingStats> {
    let engine = SqliteEngine::open(config.database_path())
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;
    let sources = engine
        .schema_sources()
        .await
        .map_err(|e| RagError::Database(format!("{:#}", e)))?;

    let mut index = SchemaIndex::open(config).await?;
    index.rebuild(&sources).await
}
