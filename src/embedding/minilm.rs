use super::{Embedder, Embedding, EmbeddingError};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

pub const MINILM_MODEL_ID: &str = "all-MiniLM-L6-v2";
pub const MINILM_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Longest input the model was trained on; longer labels are truncated.
const MAX_TOKENS: usize = 256;

fn backend(context: impl Display, err: impl Display) -> EmbeddingError {
    EmbeddingError::Backend(format!("{context}: {err}"))
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// BERT sentence encoder run on the CPU with candle. Mean pooling over the
/// attention mask, then L2 normalisation, as sentence-transformers does for
/// the MiniLM family.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
}

impl MiniLmEmbedder {
    /// Downloads (or reuses from the Hugging Face cache) `repo_id`.
    pub fn from_hub(repo_id: &str) -> Result<Self, EmbeddingError> {
        info!(target: "catmap.setup", model = repo_id, "loading_embedding_model");
        let api = Api::new().map_err(|e| backend("hugging face api", e))?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));
        let fetch = |name: &str| {
            repo.get(name)
                .map_err(|e| backend(&format!("download {name}"), e))
        };
        let files = ModelFiles {
            config: fetch("config.json")?,
            tokenizer: fetch("tokenizer.json")?,
            weights: fetch("model.safetensors")?,
        };
        Self::load(files, repo_id)
    }

    /// Loads `config.json`, `tokenizer.json` and `model.safetensors` from a
    /// local directory.
    pub fn from_dir(dir: &Path) -> Result<Self, EmbeddingError> {
        info!(target: "catmap.setup", model = %dir.display(), "loading_embedding_model");
        let files = ModelFiles {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        Self::load(files, &dir.display().to_string())
    }

    fn load(files: ModelFiles, model_id: &str) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let raw = fs::read_to_string(&files.config)
            .map_err(|e| backend(&format!("read {}", files.config.display()), e))?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| backend("parse config.json", e))?;
        debug!(target: "catmap.setup", hidden_size = config.hidden_size, "model_config_loaded");

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| backend("load tokenizer", e))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| backend("configure truncation", e))?;

        // SAFETY: the weights file is not modified while it is mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)
                .map_err(|e| backend("load weights", e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| backend("build bert model", e))?;

        info!(target: "catmap.setup", model = model_id, "embedding_model_loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
        })
    }

    fn forward_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| backend("tokenize", e))?;
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut ids = Vec::with_capacity(texts.len() * max_len);
        let mut mask = Vec::with_capacity(texts.len() * max_len);
        for encoding in &encodings {
            let mut row_ids = encoding.get_ids().to_vec();
            let mut row_mask = encoding.get_attention_mask().to_vec();
            row_ids.resize(max_len, 0);
            row_mask.resize(max_len, 0);
            ids.extend(row_ids);
            mask.extend(row_mask);
        }

        self.encode(ids, mask, (texts.len(), max_len))
            .map_err(|e| backend("inference", e))
    }

    fn encode(
        &self,
        ids: Vec<u32>,
        mask: Vec<u32>,
        shape: (usize, usize),
    ) -> candle_core::Result<Vec<Embedding>> {
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        l2_normalize(&mean_pool(&hidden, &attention_mask)?)?.to_vec2::<f32>()
    }
}

/// Averages token vectors `(batch, seq, hidden)` over positions whose mask is
/// set.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

fn l2_normalize(vectors: &Tensor) -> candle_core::Result<Tensor> {
    let norm = vectors
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    vectors.broadcast_div(&norm)
}

impl Embedder for MiniLmEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.forward_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Backend("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.forward_batch(texts)
    }
}
