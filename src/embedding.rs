//! Sentence-embedding backend.
//!
//! Wraps a local fastembed model behind the one interface the index and
//! retriever need: order-preserving, deterministic `encode`. Batching is an
//! optimization only; per-text output is identical to unbatched encoding.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{RagError, Result};

/// Batch size for corpus encoding.
const EMBEDDING_BATCH_SIZE: usize = 32;

pub struct EmbeddingBackend {
    model: TextEmbedding,
    model_id: String,
}

impl EmbeddingBackend {
    /// Initialize the named model. Downloads it on first use; failure here
    /// means the caller degrades to keyword retrieval, not an abort.
    pub fn init(model_name: &str) -> Result<Self> {
        let model_id = model_name.to_ascii_lowercase();
        let model = resolve_model(&model_id)
            .ok_or_else(|| RagError::Embedding(format!("unknown embedding model '{model_name}'")))?;

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = false;
        let inner = TextEmbedding::try_new(options).map_err(|e| RagError::Embedding(e.to_string()))?;

        Ok(Self {
            model: inner,
            model_id,
        })
    }

    /// The identifier persisted alongside vectors; a stored corpus built
    /// with a different model is an incompatible vector space.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts, Some(EMBEDDING_BATCH_SIZE))
            .map_err(|e| RagError::Embedding(e.to_string()))
    }

    pub fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("backend returned no vector".to_string()))
    }
}

fn resolve_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Some(EmbeddingModel::AllMiniLML6V2)
        }
        "all-minilm-l12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "nomic-embed-text-v1.5" => Some(EmbeddingModel::NomicEmbedTextV15),
        _ => None,
    }
}
