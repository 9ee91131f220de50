
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::SimilarityIndex;
use crate::Result;
use crate::config::RetrievalConfig;

/// Separator placed between document texts in the schema context
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// One indexed table or view, as returned by the similarity index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDocument {
    pub id: String,
    pub text: String,
    /// Dissimilarity to the question; smaller is more relevant
    pub distance: f32,
}

/// Conjunction of a relative and an absolute distance test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceFilter {
    /// θ in `distance <= best * (1 + θ)`
    pub relative_threshold: f32,
    pub absolute_cutoff: f32,
}

impl RelevanceFilter {
    #[inline]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            relative_threshold: config.distance_threshold,
            absolute_cutoff: config.distance_cutoff,
        }
    }

    /// Whether a candidate at `distance` survives when the best candidate sits at `best`
    #[inline]
    pub fn admits(&self, best: f32, distance: f32) -> bool {
        distance <= best * (1.0 + self.relative_threshold) && distance <= self.absolute_cutoff
    }

    /// Rank candidates by ascending distance and keep the relevant ones, preserving rank order
    #[inline]
    pub fn apply(&self, candidates: Vec<SchemaDocument>) -> Vec<SchemaDocument> {
        let mut ranked: Vec<SchemaDocument> = candidates
            .into_iter()
            .filter_map(|mut doc| {
                if doc.distance.is_nan() {
                    warn!("Dropping schema document {} with NaN distance", doc.id);
                    return None;
                }
                doc.distance = doc.distance.max(0.0);
                Some(doc)
            })
            .collect();
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let Some(best) = ranked.first().map(|doc| doc.distance) else {
            return ranked;
        };

        ranked.retain(|doc| self.admits(best, doc.distance));
        ranked
    }
}

/// Finds the schema documents relevant to a question
pub struct ContextRetriever {
    index: Arc<dyn SimilarityIndex>,
    filter: RelevanceFilter,
}

impl ContextRetriever {
    #[inline]
    pub fn new(index: Arc<dyn SimilarityIndex>, filter: RelevanceFilter) -> Self {
        Self { index, filter }
    }

    /// Query the index for the `top_k` nearest documents and apply the relevance filter.
    ///
    /// An empty result is a normal outcome meaning no schema is relevant.
    #[inline]
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<SchemaDocument>> {
        let candidates = self.index.query(question, top_k).await?;
        let candidate_count = candidates.len();

        let mut relevant = self.filter.apply(candidates);
        relevant.truncate(top_k);

        for doc in &relevant {
            debug!("Retrieved {} at distance {:.4}", doc.id, doc.distance);
        }

        info!(
            "Kept {} of {} candidate schema documents",
            relevant.len(),
            candidate_count
        );
        Ok(relevant)
    }
}

/// Join document texts into the schema context handed to the prompts
#[inline]
pub fn schema_context(documents: &[SchemaDocument]) -> String {
    documents.iter().map(|doc| doc.text.as_str()).join(CONTEXT_SEPARATOR)
}
