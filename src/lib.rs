//! # groundwork (library root)
//!
//! Grounds an OpenAI compatible chat model in external context, two ways:
//!
//! - **Retrieval-augmented Q&A**: a public-domain text is split into overlapping passages
//!   ([`splitter`]), embedded ([`embedding`]) into an in-process index ([`vector_store`]);
//!   the best passages for a question are packed into a bounded prompt ([`prompt`],
//!   [`template`]) and sent to the model ([`api`], [`qa`]).
//! - **Tool-augmented agent**: HTML scraping functions are registered as named tools and a
//!   bounded ReAct loop lets the model call them until it can answer ([`agent`]).
//!
//! Both pipelines read their knobs from [`config::GroundworkConfig`] and report failures as
//! [`error::Error`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use groundwork::{api::OpenAiChat, config::GroundworkConfig, embedding, prompt::PromptAssembler};
//! use groundwork::{qa::{QaPipeline, build_index}, template::PromptTemplate};
//!
//! # async fn demo() -> groundwork::error::Result<()> {
//! let config = GroundworkConfig::default();
//! let embedder: Arc<dyn embedding::Embedder> = Arc::from(embedding::from_config(&config, false)?);
//! let index = build_index(&config, "pg1342.txt", embedder.as_ref()).await?;
//! let assembler = PromptAssembler::new(PromptTemplate::qa(), config.retrieval.context_budget)?;
//! let qa = QaPipeline::new(index, embedder, assembler, Arc::new(OpenAiChat::new(&config)?), 4)?;
//! let answer = qa.ask("Whom does Elizabeth marry?").await?;
//! println!("{}", answer.text);
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod agent;
pub mod api;
pub mod commands;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod pretty;
pub mod prompt;
pub mod qa;
pub mod splitter;
pub mod template;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

/// Return the per-platform configuration directory used by groundwork.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "groundwork", "gw")`, e.g. `~/.config/gw` on Linux. The directory is **not**
/// created by this function; `gw init` creates it.
///
/// # Errors
/// [`Error::Config`] if the platform configuration directory cannot be determined
/// (rare, but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "groundwork", "gw")
        .ok_or_else(|| Error::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
