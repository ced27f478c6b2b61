use crate::embedding::{Embedder, EmbeddingError};
use crate::models::{MatchMethod, Resolution, ReviewFlag};
use crate::taxonomy::{CandidateRanker, RankedCandidate, Taxonomy, normalize, trailing_segment};
use thiserror::Error;

pub const DEFAULT_REASONING_MARKER: &str = "...done thinking.";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("no cached vector for taxonomy position {0}")]
    MissingVector(usize),
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub reasoning_marker: String,
    pub max_trailing_depth: usize,
    pub similarity_threshold: f32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            reasoning_marker: DEFAULT_REASONING_MARKER.to_string(),
            max_trailing_depth: 3,
            similarity_threshold: 0.85,
        }
    }
}

/// Maps a raw oracle reply back onto the taxonomy. Layers run in order and
/// the first hit wins: exact, trailing segments, semantic, unresolved.
pub struct Resolver<'a, E> {
    taxonomy: &'a Taxonomy,
    ranker: &'a CandidateRanker,
    embedder: &'a E,
    settings: &'a ResolverSettings,
}

impl<'a, E: Embedder> Resolver<'a, E> {
    pub fn new(
        taxonomy: &'a Taxonomy,
        ranker: &'a CandidateRanker,
        embedder: &'a E,
        settings: &'a ResolverSettings,
    ) -> Self {
        Self {
            taxonomy,
            ranker,
            embedder,
            settings,
        }
    }

    pub fn resolve(
        &self,
        raw_reply: &str,
        candidates: &[RankedCandidate],
    ) -> Result<Resolution, ResolveError> {
        let cleaned = self.strip_reasoning(raw_reply);
        let normalized = normalize(cleaned);

        if let Some(entry) = self.taxonomy.lookup_normalized(&normalized) {
            return Ok(Resolution::new(entry, ReviewFlag::Accepted, MatchMethod::Exact));
        }

        if let Some((candidate, depth)) = self.trailing_match(&normalized, candidates) {
            return Ok(Resolution::new(
                candidate.category.clone(),
                ReviewFlag::Accepted,
                MatchMethod::Trailing { depth },
            ));
        }

        if let Some((candidate, score)) = self.best_semantic(cleaned, candidates)?
            && score >= self.settings.similarity_threshold
        {
            return Ok(Resolution::new(
                candidate.category.clone(),
                ReviewFlag::Check,
                MatchMethod::Semantic { score },
            ));
        }

        Ok(Resolution::new(
            cleaned,
            ReviewFlag::Check,
            MatchMethod::Unresolved,
        ))
    }

    fn strip_reasoning<'r>(&self, reply: &'r str) -> &'r str {
        let marker = self.settings.reasoning_marker.as_str();
        if marker.is_empty() {
            return reply.trim();
        }
        match reply.rsplit_once(marker) {
            Some((_, answer)) => answer.trim(),
            None => reply.trim(),
        }
    }

    fn trailing_match<'c>(
        &self,
        normalized_reply: &str,
        candidates: &'c [RankedCandidate],
    ) -> Option<(&'c RankedCandidate, usize)> {
        (1..=self.settings.max_trailing_depth).find_map(|depth| {
            candidates
                .iter()
                .find(|candidate| {
                    normalize(&trailing_segment(&candidate.category, depth)) == normalized_reply
                })
                .map(|candidate| (candidate, depth))
        })
    }

    fn best_semantic<'c>(
        &self,
        cleaned: &str,
        candidates: &'c [RankedCandidate],
    ) -> Result<Option<(&'c RankedCandidate, f32)>, ResolveError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let reply_vector = self.embedder.embed(cleaned)?;
        let mut best: Option<(&RankedCandidate, f32)> = None;
        for candidate in candidates {
            let vector = self
                .ranker
                .vector(candidate.position)
                .ok_or(ResolveError::MissingVector(candidate.position))?;
            let score = self.embedder.similarity(&reply_vector, vector);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedding, HashingEmbedder};

    /// Scores every pair with the same fixed similarity.
    struct FixedScore(f32);

    impl Embedder for FixedScore {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Ok(vec![1.0])
        }

        fn similarity(&self, _a: &[f32], _b: &[f32]) -> f32 {
            self.0
        }
    }

    struct Broken;

    impl Embedder for Broken {
        fn model_id(&self) -> &str {
            "broken"
        }

        fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Err(EmbeddingError::Backend("model unavailable".into()))
        }
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(
            [
                "A > B > C",
                "X > B > C",
                "Clothing > Shoes > Running Shoes",
                "Electronics > Phones > Cases",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
        .unwrap()
    }

    fn candidates(tax: &Taxonomy, positions: &[usize]) -> Vec<RankedCandidate> {
        positions
            .iter()
            .map(|&position| RankedCandidate {
                position,
                category: tax.get(position).unwrap().to_string(),
                score: 0.0,
            })
            .collect()
    }

    fn resolve_with<E: Embedder>(
        embedder: &E,
        reply: &str,
        positions: &[usize],
    ) -> Result<Resolution, ResolveError> {
        let tax = taxonomy();
        let ranker = CandidateRanker::new(&tax, &HashingEmbedder::new()).unwrap();
        let settings = ResolverSettings::default();
        let resolver = Resolver::new(&tax, &ranker, embedder, &settings);
        resolver.resolve(reply, &candidates(&tax, positions))
    }

    #[test]
    fn exact_match_wins_over_everything_else() {
        let out = resolve_with(&FixedScore(1.0), "electronics > phones > CASES", &[0, 1]).unwrap();
        assert_eq!(out.record.mapped_category, "Electronics > Phones > Cases");
        assert_eq!(out.record.review_flag, ReviewFlag::Accepted);
        assert_eq!(out.method, MatchMethod::Exact);
    }

    #[test]
    fn exact_match_may_pick_entry_outside_candidates() {
        let out = resolve_with(&FixedScore(0.0), "Clothing > Shoes > Running Shoes", &[0]).unwrap();
        assert_eq!(out.record.mapped_category, "Clothing > Shoes > Running Shoes");
        assert_eq!(out.method, MatchMethod::Exact);
    }

    #[test]
    fn reasoning_prefix_is_discarded() {
        let reply = "hmm, phones... ...done thinking.\n  Electronics > Phones > Cases ";
        let out = resolve_with(&FixedScore(0.0), reply, &[3]).unwrap();
        assert_eq!(out.record.mapped_category, "Electronics > Phones > Cases");
        assert_eq!(out.method, MatchMethod::Exact);
    }

    #[test]
    fn trailing_match_breaks_ties_by_rank_order() {
        let out = resolve_with(&FixedScore(0.0), "C", &[0, 1]).unwrap();
        assert_eq!(out.record.mapped_category, "A > B > C");
        assert_eq!(out.method, MatchMethod::Trailing { depth: 1 });

        let out = resolve_with(&FixedScore(0.0), "C", &[1, 0]).unwrap();
        assert_eq!(out.record.mapped_category, "X > B > C");
    }

    #[test]
    fn trailing_match_uses_deeper_levels() {
        let out = resolve_with(&FixedScore(0.0), "shoes > running shoes", &[0, 2]).unwrap();
        assert_eq!(out.record.mapped_category, "Clothing > Shoes > Running Shoes");
        assert_eq!(out.record.review_flag, ReviewFlag::Accepted);
        assert_eq!(out.method, MatchMethod::Trailing { depth: 2 });
    }

    #[test]
    fn threshold_is_inclusive() {
        let out = resolve_with(&FixedScore(0.85), "sneakers", &[2, 3]).unwrap();
        assert_eq!(out.record.mapped_category, "Clothing > Shoes > Running Shoes");
        assert_eq!(out.record.review_flag, ReviewFlag::Check);
        assert_eq!(out.method, MatchMethod::Semantic { score: 0.85 });
    }

    #[test]
    fn below_threshold_keeps_raw_reply() {
        let out = resolve_with(&FixedScore(0.849_999), "  sneakers  ", &[2, 3]).unwrap();
        assert_eq!(out.record.mapped_category, "sneakers");
        assert_eq!(out.record.review_flag, ReviewFlag::Check);
        assert_eq!(out.method, MatchMethod::Unresolved);
    }

    /// Puts texts mentioning shoes and phones on separate axes.
    struct Keyword;

    impl Embedder for Keyword {
        fn model_id(&self) -> &str {
            "keyword"
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            let text = normalize(text);
            Ok(vec![
                if text.contains("shoe") { 1.0 } else { 0.0 },
                if text.contains("phone") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    #[test]
    fn semantic_fallback_picks_most_similar_candidate() {
        let tax = taxonomy();
        let ranker = CandidateRanker::new(&tax, &Keyword).unwrap();
        let settings = ResolverSettings::default();
        let resolver = Resolver::new(&tax, &ranker, &Keyword, &settings);

        let out = resolver
            .resolve("trail shoes for men", &candidates(&tax, &[3, 2]))
            .unwrap();
        assert_eq!(out.record.mapped_category, "Clothing > Shoes > Running Shoes");
        assert_eq!(out.record.review_flag, ReviewFlag::Check);
        assert!(matches!(out.method, MatchMethod::Semantic { score } if score > 0.99));
    }

    #[test]
    fn embedding_failure_surfaces_as_error() {
        let err = resolve_with(&Broken, "sneakers", &[2]).expect_err("should fail");
        assert!(matches!(err, ResolveError::Embedding(_)));
    }

    #[test]
    fn empty_candidate_list_is_unresolved() {
        let out = resolve_with(&FixedScore(1.0), "sneakers", &[]).unwrap();
        assert_eq!(out.method, MatchMethod::Unresolved);
    }
}
