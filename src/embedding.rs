//! # Embedders
//!
//! Text → vector functions used to build and query the [`VectorIndex`](crate::vector_store::VectorIndex).
//!
//! Vectors are only comparable when they come from the same model, so every [`Embedder`]
//! reports a [`model_id`](Embedder::model_id) that the index records at build time and checks
//! at query time.
//!
//! Two implementations are provided:
//!
//! - [`SentenceEmbedder`]: a sentence-transformer (BERT family) from the Hugging Face Hub,
//!   run in process with Candle. Mean pooling over the attention mask, then L2 normalization.
//!   Batches are embedded in parallel with rayon.
//! - [`ApiEmbedder`]: the `/embeddings` endpoint of an OpenAI compatible API.

use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use futures::{StreamExt, TryStreamExt, stream};
use hf_hub::{Repo, RepoType, api::sync::Api};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tokenizers::Tokenizer;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info};

use crate::config::{EmbeddingConfig, EmbeddingProvider, GroundworkConfig};
use crate::error::{Error, Result};

/// A deterministic text embedding function.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the vector space. Two embedders with the same id must agree on every input.
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts; the output is in input order.
    ///
    /// The default calls [`embed`](Embedder::embed) sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Build the embedder selected in the configuration.
///
/// `show_progress` only affects the local model, which can take a while on large corpora.
pub fn from_config(config: &GroundworkConfig, show_progress: bool) -> Result<Box<dyn Embedder>> {
    match config.embedding.provider {
        EmbeddingProvider::Local => Ok(Box::new(
            SentenceEmbedder::load(&config.embedding.model)?.with_progress(show_progress),
        )),
        EmbeddingProvider::Api => Ok(Box::new(ApiEmbedder::new(config, &config.embedding)?)),
    }
}

fn embedding_error(e: impl std::fmt::Display) -> Error {
    Error::Embedding(e.to_string())
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbedder {
    model_id: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    show_progress: bool,
}

impl SentenceEmbedder {
    /// Download (or reuse the cached copy of) `model_id` from the Hugging Face Hub and load it.
    ///
    /// # Errors
    /// [`Error::Embedding`] if the files cannot be fetched or the weights do not load as a
    /// BERT model.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(embedding_error)?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json").map_err(embedding_error)?;
        let tokenizer_filename = api_repo.get("tokenizer.json").map_err(embedding_error)?;
        let weights_filename = api_repo.get("model.safetensors").map_err(embedding_error)?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config).map_err(embedding_error)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| Error::Embedding(format!("Failed to load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(embedding_error)?
        };
        let model = BertModel::load(vb, &config).map_err(embedding_error)?;

        info!("Loaded sentence embedding model {}", model_id);
        Ok(Self {
            model_id: model_id.to_string(),
            model,
            tokenizer,
            device,
            show_progress: false,
        })
    }

    /// Draw a progress bar while embedding batches.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Encode text into a normalized embedding.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        // Tokenize with automatic truncation at the model's max length
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Embedding(format!("Tokenization error: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(embedding_error)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(embedding_error)?;

        let output = self
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(embedding_error)?;

        let embedding = self
            .mean_pooling(&output, tokens.get_attention_mask())
            .and_then(|pooled| normalize(&pooled))
            .map_err(embedding_error)?;

        embedding.to_vec1::<f32>().map_err(embedding_error)
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> candle_core::Result<Tensor> {
        // [1, seq_len, hidden] * [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        sum.broadcast_div(&count)?.squeeze(0)
    }
}

/// Run CPU-bound inference without stalling the other tasks scheduled on this worker.
///
/// `block_in_place` needs the multi-threaded runtime; elsewhere the work runs inline.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

/// L2 normalize the embedding vector
fn normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let norm = tensor.sqr()?.sum_all()?.sqrt()?;
    tensor.broadcast_div(&norm)
}

#[async_trait]
impl Embedder for SentenceEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        run_blocking(|| self.encode(text))
    }

    /// Chunks are independent, so they are encoded in parallel; `collect` keeps input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let bar = if self.show_progress {
            ProgressBar::new(texts.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} embedding {pos}/{len} [{bar:40}] {eta}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let vectors = run_blocking(|| {
            texts
                .par_iter()
                .progress_with(bar.clone())
                .map(|text| self.encode(text))
                .collect::<Result<Vec<_>>>()
        });
        bar.finish_and_clear();
        vectors
    }
}

/// Embeddings from an OpenAI compatible `/embeddings` endpoint.
pub struct ApiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    batch_size: usize,
}

/// Batches in flight at once.
const API_CONCURRENCY: usize = 4;

impl ApiEmbedder {
    pub fn new(config: &GroundworkConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: crate::api::create_client(config)?,
            model: embedding.model.clone(),
            batch_size: embedding.batch_size.max(1),
        })
    }

    async fn embed_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts)
            .build()
            .map_err(embedding_error)?;

        debug!("Requesting {} embeddings from {}", expected, self.model);
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(embedding_error)?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(Error::Embedding(format!(
                "expected {expected} embeddings, API returned {}",
                data.len()
            )));
        }
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_request(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("API returned no embedding".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(requests)
            .map(|batch| self.embed_request(batch))
            .buffered(API_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }
}
