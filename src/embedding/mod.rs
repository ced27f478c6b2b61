#[cfg(test)]
pub mod hashing;
pub mod minilm;

#[cfg(test)]
pub use hashing::HashingEmbedder;
pub use minilm::{MINILM_MODEL_ID, MINILM_REPO, MiniLmEmbedder};

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Embedding = Vec<f32>;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("unknown embedding model `{0}`")]
    UnknownModel(String),
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// Text embedding backend. Calls are synchronous and made from a single task,
/// so implementations do not need to be reentrant.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        (**self).embed_batch(texts)
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        (**self).similarity(a, b)
    }
}

/// Where the weights for a configured model id come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub(String),
    Local(PathBuf),
}

/// Accepts the `all-MiniLM-L6-v2` alias, an `owner/name` hub repo id, or a
/// local model directory.
pub fn model_source(model_id: &str) -> Result<ModelSource, EmbeddingError> {
    let id = model_id.trim();
    if id.eq_ignore_ascii_case(MINILM_MODEL_ID) {
        return Ok(ModelSource::Hub(MINILM_REPO.to_string()));
    }
    let path = Path::new(id);
    if path.is_dir() {
        return Ok(ModelSource::Local(path.to_path_buf()));
    }
    match id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(ModelSource::Hub(id.to_string()))
        }
        _ => Err(EmbeddingError::UnknownModel(id.to_string())),
    }
}

pub fn embedder_from_model(model_id: &str) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let embedder = match model_source(model_id)? {
        ModelSource::Hub(repo) => MiniLmEmbedder::from_hub(&repo)?,
        ModelSource::Local(dir) => MiniLmEmbedder::from_dir(&dir)?,
    };
    Ok(Box::new(embedder))
}

/// Cosine similarity clamped to `[0, 1]`. Zero-norm or mismatched vectors
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        let same = cosine_similarity(&[3.0, 4.0], &[3.0, 4.0]);
        assert!((same - 1.0).abs() < 1e-6);
    }

    #[test]
    fn minilm_alias_resolves_to_hub_repo() {
        assert_eq!(
            model_source("all-MiniLM-L6-v2").unwrap(),
            ModelSource::Hub("sentence-transformers/all-MiniLM-L6-v2".into())
        );
        assert_eq!(
            model_source(" BAAI/bge-small-en-v1.5 ").unwrap(),
            ModelSource::Hub("BAAI/bge-small-en-v1.5".into())
        );
    }

    #[test]
    fn local_directory_is_a_model_source() {
        let dir = tempfile::tempdir().unwrap();
        let id = dir.path().display().to_string();
        assert_eq!(
            model_source(&id).unwrap(),
            ModelSource::Local(dir.path().to_path_buf())
        );
        // An empty directory holds no model.
        assert!(matches!(
            embedder_from_model(&id),
            Err(EmbeddingError::Backend(_))
        ));
    }

    #[test]
    fn unknown_ids_are_rejected_before_loading() {
        for id in ["word2vec", "", "a/b/c", "/nope"] {
            assert!(
                matches!(model_source(id), Err(EmbeddingError::UnknownModel(_))),
                "id {id:?}"
            );
        }
    }

    #[test]
    fn batch_default_embeds_each_text() {
        let embedder = HashingEmbedder::new();
        let batch = embedder.embed_batch(&["shoes", "bags"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("shoes").unwrap());
    }

    #[test]
    fn lexically_related_text_scores_higher() {
        let embedder = HashingEmbedder::new();
        let label = embedder.embed("mens running shoes").unwrap();
        let close = embedder.embed("Clothing > Shoes > Running Shoes").unwrap();
        let far = embedder.embed("Garden > Lawn Mowers").unwrap();
        assert!(embedder.similarity(&label, &close) > embedder.similarity(&label, &far));
    }
}
