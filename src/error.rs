//! Error types shared by the retrieval and agent pipelines.
//!
//! Tool failures are deliberately **not** part of [`Error`]: they are
//! [`ToolError`](crate::agent::ToolError)s that the registry turns into observation strings so
//! the agent loop can keep going. Everything here is surfaced to the caller.

use thiserror::Error;

use crate::agent::AgentStep;

/// Errors produced by groundwork.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration values (chunk sizes, top-k, step bound, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The corpus handed to the index was empty.
    #[error("cannot build or query an index over an empty corpus")]
    EmptyCorpus,

    /// A query asked for zero results.
    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// Two vectors that must share a dimension did not.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The index was built with a different embedding model than the one used to query it.
    #[error("index was built with embedder `{indexed}` but queried with `{queried}`")]
    EmbedderMismatch { indexed: String, queried: String },

    /// The embedding model failed to produce a vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The prompt could not be made to fit its budget.
    #[error("prompt budget exceeded: {0}")]
    Budget(String),

    /// The agent used every step it was allowed without producing a final answer.
    #[error("agent stopped after {limit} steps without a final answer")]
    StepLimitExceeded { limit: usize, steps: Vec<AgentStep> },

    /// The generative model API failed or returned nothing usable.
    #[error("model error: {0}")]
    Model(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading or writing an index snapshot failed.
    #[error("index snapshot error: {0}")]
    Index(String),
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::Model(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
