use crate::embeddings::cosine_similarity;
use crate::models::RetrievalResult;
use crate::store::Index;
use crate::traits::EmbeddingProvider;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;

pub struct Retriever<'a, E> {
    embedder: &'a E,
}

impl<'a, E> Retriever<'a, E>
where
    E: EmbeddingProvider + Send + Sync,
{
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    /// At most `k` entries ordered by descending cosine similarity, ties in
    /// insertion order. Every failure degrades to an empty result.
    pub async fn search(&self, index: &Index, query: &str, k: usize) -> Vec<RetrievalResult> {
        if index.is_empty() || k == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(error = %error, "query embedding failed");
                return Vec::new();
            }
        };

        if query_vector.len() != index.dimensions() {
            warn!(
                expected = index.dimensions(),
                actual = query_vector.len(),
                "query vector dimension does not match index"
            );
            return Vec::new();
        }

        let results = rank(index, &query_vector, k);
        debug!(
            hits = results.len(),
            top_score = ?results.first().map(|hit| hit.score),
            "search complete"
        );
        results
    }
}

/// Brute-force scan. `sort_by` is stable, so equal scores keep index order.
pub fn rank(index: &Index, query_vector: &[f32], k: usize) -> Vec<RetrievalResult> {
    let mut scored = index
        .entries()
        .iter()
        .map(|entry| (entry, cosine_similarity(query_vector, &entry.vector)))
        .collect::<Vec<_>>();

    scored.sort_by(|left, right| right.1.total_cmp(&left.1));

    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(rank, (entry, score))| RetrievalResult {
            chunk: entry.chunk.clone(),
            score,
            rank,
        })
        .collect()
}
