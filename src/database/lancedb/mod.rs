// LanceDB vector database module
// Stores embedded schema documents and answers nearest-neighbour queries

#[cfg(test)]
mod tests;

pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use vector_store::{SearchHit, VectorStore};

/// Schema document stored in LanceDB together with its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaRecord {
    /// Name of the table or view the document describes
    pub id: String,
    /// The vector embedding (768 dimensions for nomic-embed-text)
    pub vector: Vec<f32>,
    /// Document text handed to the prompts
    pub content: String,
    /// RFC 3339 timestamp of when the record was embedded
    pub created_at: String,
}

impl SchemaRecord {
    #[inline]
    pub fn new(id: impl Into<String>, vector: Vec<f32>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vector,
            content: content.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
