use super::index::Taxonomy;
use crate::embedding::{Embedder, Embedding, EmbeddingError};
use tracing::warn;

/// Taxonomy entries encoded per backend call.
const ENCODE_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    /// Position of the category in the taxonomy.
    pub position: usize,
    pub category: String,
    pub score: f32,
}

/// Holds one embedding per taxonomy entry, computed once per run.
pub struct CandidateRanker {
    vectors: Vec<Embedding>,
}

impl CandidateRanker {
    pub fn new<E: Embedder>(taxonomy: &Taxonomy, embedder: &E) -> Result<Self, EmbeddingError> {
        let mut vectors = Vec::with_capacity(taxonomy.len());
        for chunk in taxonomy.entries().chunks(ENCODE_BATCH) {
            let texts: Vec<&str> = chunk.iter().map(String::as_str).collect();
            vectors.extend(embedder.embed_batch(&texts)?);
        }
        Ok(Self { vectors })
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }

    /// Caps `top_n` at the taxonomy size, warning when it had to.
    pub fn effective_top_n(&self, top_n: usize) -> usize {
        if top_n > self.vectors.len() {
            warn!(
                target: "catmap.setup",
                requested = top_n,
                taxonomy_size = self.vectors.len(),
                "top_n_clamped_to_taxonomy_size"
            );
        }
        top_n.clamp(1, self.vectors.len().max(1))
    }

    /// Top `top_n` categories by similarity to `label`, best first. Equal
    /// scores keep taxonomy order.
    pub fn rank<E: Embedder>(
        &self,
        label: &str,
        taxonomy: &Taxonomy,
        embedder: &E,
        top_n: usize,
    ) -> Result<Vec<RankedCandidate>, EmbeddingError> {
        let query = embedder.embed(label)?;
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, embedder.similarity(&query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(top_n)
            .filter_map(|(position, score)| {
                taxonomy.get(position).map(|category| RankedCandidate {
                    position,
                    category: category.to_string(),
                    score,
                })
            })
            .collect())
    }
}
