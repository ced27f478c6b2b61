use super::{Embedder, Embedding, EmbeddingError};
use crate::taxonomy::normalize;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

const HASHING_DIM: usize = 384;
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline stand-in for a sentence encoder: feature hashing over normalized
/// words and character trigrams. Lexical overlap only, so scores stay low for
/// paraphrases.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self { dim: HASHING_DIM }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dim as u64) as usize
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        "hashing-384"
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = normalize(text);
        for word in normalized.split_whitespace() {
            vector[self.bucket(word)] += WORD_WEIGHT;
            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram)] += TRIGRAM_WEIGHT;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

#[test]
fn deterministic_and_normalized() {
    let embedder = HashingEmbedder::new();
    let a = embedder.embed("Running Shoes").unwrap();
    let b = embedder.embed("running shoes!").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), HASHING_DIM);
    let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn empty_text_embeds_to_zero_vector() {
    let v = HashingEmbedder::new().embed("  ...  ").unwrap();
    assert!(v.iter().all(|x| *x == 0.0));
}
