use crate::embeddings::Embedder;
use crate::traits::ChunkIndex;
use crate::{SearchError, SearchQuery, SearchResult};
use std::sync::Arc;

/// Read-only query path: embed the query, look up neighbours, rank.
///
/// Holds no mutable state, so one instance can serve any number of
/// concurrent searches.
#[derive(Clone)]
pub struct SimilaritySearch {
    index: Arc<dyn ChunkIndex>,
    embedder: Arc<dyn Embedder>,
}

impl SimilaritySearch {
    pub fn new(index: Arc<dyn ChunkIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Returns at most `query.limit` results scoring at least
    /// `query.threshold`, best first. An empty list means nothing cleared the
    /// threshold; a failed query embedding is an error.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let query_vector = self.embedder.embed(&query.text).await?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.index.match_chunks(&query_vector, query).await?;
        let candidate_count = candidates.len();

        // The index is trusted to pre-filter, but the contract is enforced here.
        let mut results: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|candidate| query.accepts(&candidate.report))
            .filter(|candidate| {
                candidate.similarity.is_finite() && candidate.similarity >= query.threshold
            })
            .map(|candidate| {
                let mut chunk = candidate.chunk;
                chunk.embedding = None;
                SearchResult {
                    chunk,
                    report: candidate.report,
                    similarity: candidate.similarity.clamp(0.0, 1.0),
                }
            })
            .collect();

        results.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        results.truncate(query.limit);

        tracing::info!(
            query = %query.text,
            candidates = candidate_count,
            hits = results.len(),
            "similarity search finished"
        );

        Ok(results)
    }
}
