//! Retrieval-augmented question answering.
//!
//! [`QaPipeline::ask`] retrieves the `top_k` passages for a question, assembles a bounded
//! prompt from them and returns the model's reply together with the exact passages it was
//! shown.

use serde::Serialize;
use std::sync::Arc;

use tracing::info;

use crate::agent::scrape::HttpFetcher;
use crate::api::ChatModel;
use crate::config::GroundworkConfig;
use crate::document::load_source;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::prompt::PromptAssembler;
use crate::splitter::TextSplitter;
use crate::vector_store::{ScoredChunk, VectorIndex};

/// Load `source`, split it with the configured chunking and embed every chunk.
pub async fn build_index(
    config: &GroundworkConfig,
    source: &str,
    embedder: &dyn Embedder,
) -> Result<VectorIndex> {
    let fetcher = HttpFetcher::from_config(&config.http)?;
    let document = load_source(&fetcher, source).await?;
    let chunks = TextSplitter::from_config(&config.retrieval)?.split(&document);
    VectorIndex::build(chunks, embedder, config.retrieval.metric).await
}

/// A grounded answer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The model's reply, unmodified.
    pub text: String,
    /// Passages included in the prompt, in rank order.
    pub sources: Vec<ScoredChunk>,
}

pub struct QaPipeline {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    assembler: PromptAssembler,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl QaPipeline {
    /// # Errors
    /// [`Error::InvalidTopK`] for `top_k == 0`.
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        assembler: PromptAssembler,
        model: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidTopK);
        }
        Ok(Self {
            index,
            embedder,
            assembler,
            model,
            top_k,
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// # Errors
    /// Retrieval errors, [`Error::Budget`] when the top passage does not fit the context
    /// budget, and chat model errors.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let ranked = self
            .index
            .query(question, self.top_k, self.embedder.as_ref())
            .await?;
        let prompt = self.assembler.assemble(question, &ranked)?;
        info!(
            "Asking with {} passages ({} dropped)",
            prompt.used.len(),
            prompt.dropped
        );

        let text = self.model.complete(&prompt.messages()).await?;
        Ok(Answer {
            text,
            sources: prompt.used,
        })
    }
}
