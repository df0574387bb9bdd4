//! This module provides functionality for loading and validating the application's configuration.
//!
//! It defines the [`GroundworkConfig`] struct, which holds every knob the two pipelines read
//! (model endpoint, sampling, retrieval breadth, chunking, budgets, agent bounds and scrape
//! tools), and a [`load_config`] function to load it from a YAML file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use groundwork::config::{GroundworkConfig, load_config};
//!
//! let config: GroundworkConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config.model);
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::agent::scrape::ScrapeToolConfig;
use crate::error::{Error, Result};
use crate::prompt::Budget;
use crate::template::{AGENT_TEMPLATE, PromptTemplate, QA_TEMPLATE};
use crate::vector_store::Metric;

/// Represents the application's configuration.
///
/// Missing sections fall back to [`Default`], so a config file only needs the endpoint
/// settings to be usable.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct GroundworkConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the OpenAI compatible API.
    pub api_base: String,

    /// The name of the model used for generating responses.
    pub model: String,

    /// Sampling temperature. Zero makes agent runs reproducible.
    pub temperature: f32,

    /// Output budget for a single completion.
    pub max_tokens: u32,

    // Stop words
    pub stop_words: Vec<String>,

    /// Timeout for chat and embedding API calls.
    pub request_timeout_secs: u64,

    pub retrieval: RetrievalConfig,

    pub embedding: EmbeddingConfig,

    pub agent: AgentConfig,

    pub http: HttpConfig,

    /// Scraping tools offered to the agent.
    pub tools: Vec<ScrapeToolConfig>,
}

/// Chunking and retrieval settings.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Character budget for a chunk.
    pub chunk_size: usize,
    /// Characters repeated between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question.
    pub top_k: usize,
    pub metric: Metric,
    /// Budget for the concatenated context in the assembled prompt,
    /// written as `{chars: N}` or `{tokens: N}`.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub context_budget: Budget,
}

/// Which embedder to use.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Sentence-transformer run in process with candle.
    Local,
    /// The `/embeddings` endpoint of the configured API.
    Api,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Hugging Face repo id for `local`, API model name for `api`.
    pub model: String,
    /// Texts per request for `api`.
    pub batch_size: usize,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of model calls in one agent session.
    pub max_steps: usize,
}

/// Settings for the scraping HTTP client.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GroundworkConfig {
    fn default() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            stop_words: Vec::new(),
            request_timeout_secs: 120,
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            agent: AgentConfig::default(),
            http: HttpConfig::default(),
            tools: Vec::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            metric: Metric::Cosine,
            context_budget: Budget::Chars(6000),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            batch_size: 64,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 8 }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("groundwork/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 20,
        }
    }
}

impl GroundworkConfig {
    /// Reject combinations the pipelines cannot honor.
    ///
    /// # Errors
    /// [`Error::Config`] when `chunk_size` is zero, `chunk_overlap >= chunk_size`,
    /// `top_k` or `max_steps` is zero, a budget is zero, or `temperature` is outside `[0, 2]`.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            )));
        }
        if r.top_k == 0 {
            return Err(Error::Config("top_k must be greater than zero".into()));
        }
        if r.context_budget.limit() == 0 {
            return Err(Error::Config("context_budget must be greater than zero".into()));
        }
        if self.agent.max_steps == 0 {
            return Err(Error::Config("agent.max_steps must be greater than zero".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature ({}) must be within [0, 2]",
                self.temperature
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file and validates it.
///
/// # Errors
/// I/O errors reading the file, YAML errors parsing it, and [`Error::Config`] from
/// [`GroundworkConfig::validate`].
///
/// # Examples
///
/// ```no_run
/// use groundwork::config::load_config;
///
/// match load_config("/path/to/config.yaml") {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: impl AsRef<Path>) -> Result<GroundworkConfig> {
    let file = file.as_ref();
    debug!("Loading config from: {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: GroundworkConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write the default `config.yaml` and the built-in templates into `dir`.
///
/// Existing files are left alone unless `force` is set. Returns the files written.
pub fn init_config_dir(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let templates = dir.join("templates");
    info!("Creating template config directory: {}", templates.display());
    fs::create_dir_all(&templates)?;

    let files = [
        (
            dir.join("config.yaml"),
            serde_yaml::to_string(&GroundworkConfig::default())?,
        ),
        (
            templates.join(format!("{QA_TEMPLATE}.yaml")),
            serde_yaml::to_string(&PromptTemplate::qa())?,
        ),
        (
            templates.join(format!("{AGENT_TEMPLATE}.yaml")),
            serde_yaml::to_string(&PromptTemplate::agent())?,
        ),
    ];

    let mut written = Vec::new();
    for (path, content) in files {
        if path.exists() && !force {
            info!("Keeping existing {}", path.display());
            continue;
        }
        info!("Creating {}", path.display());
        fs::write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}
