//! Main module for the groundwork CLI application (gw).
//!
//! Parses the command line, loads the configuration and runs the selected pipeline.
//!
//! # Examples
//!
//! Initializing the configuration and templates:
//!
//! ```sh
//! gw init
//! ```
//!
//! Asking a question about a Project Gutenberg book:
//!
//! ```sh
//! gw ask "Why does Ahab hunt the whale?" --source https://www.gutenberg.org/cache/epub/2701/pg2701.txt --show-sources
//! ```
//!
//! Letting the agent use the configured scraping tools:
//!
//! ```sh
//! gw agent "When did Twin Peaks first air?" --verbose
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{error::Error, io::stdout, path::Path, sync::Arc};
use tracing::{debug, info, warn};

use groundwork::{
    agent::{self, Agent, scrape::HttpFetcher},
    api::OpenAiChat,
    commands::{Cli, Commands},
    config::{self, GroundworkConfig},
    document, embedding,
    error::Error as GroundworkError,
    pretty,
    prompt::PromptAssembler,
    qa::{self, QaPipeline},
    splitter::TextSplitter,
    template,
    vector_store::VectorIndex,
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_max_level(cli.log_level)
            .with_writer(std::io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

/// Load the configuration named on the command line, or the per-user one.
///
/// A missing per-user file falls back to the defaults; a missing `--config` file is an error.
fn load_configuration(explicit: Option<&Path>) -> Result<GroundworkConfig, Box<dyn Error>> {
    if let Some(path) = explicit {
        return Ok(config::load_config(path)?);
    }
    let path = groundwork::config_dir()?.join("config.yaml");
    if path.exists() {
        Ok(config::load_config(&path)?)
    } else {
        warn!(
            "No config at {}, using defaults (run `gw init` to create one)",
            path.display()
        );
        Ok(GroundworkConfig::default())
    }
}

/// Write the default configuration and templates into the config directory.
fn init(force: bool) -> Result<(), Box<dyn Error>> {
    let dir = groundwork::config_dir()?;
    debug!("Initializing configuration in {}", dir.display());
    for path in config::init_config_dir(&dir, force)? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Main asynchronous function of the groundwork CLI application.
async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Init { force } => init(force),
        command => execute(command, load_configuration(cli.config.as_deref())?).await,
    }
}

async fn execute(command: Commands, config: GroundworkConfig) -> Result<(), Box<dyn Error>> {
    debug!("Config loaded: {:?}", config.retrieval);

    match command {
        Commands::Init { force } => init(force)?,
        Commands::Chunks {
            source,
            chunk_size,
            chunk_overlap,
        } => {
            let fetcher = HttpFetcher::from_config(&config.http)?;
            let document = document::load_source(&fetcher, &source).await?;
            let splitter = TextSplitter::new(
                chunk_size.unwrap_or(config.retrieval.chunk_size),
                chunk_overlap.unwrap_or(config.retrieval.chunk_overlap),
            )?;
            pretty::print_chunks(&mut stdout(), &splitter.split(&document))?;
        }
        Commands::Index { source, output } => {
            let embedder = embedding::from_config(&config, true)?;
            let index = qa::build_index(&config, &source, embedder.as_ref()).await?;
            index.save(&output)?;
            println!(
                "indexed {} chunks of {} into {}",
                index.len(),
                source,
                output.display()
            );
        }
        Commands::Ask {
            question,
            source,
            index,
            top_k,
            show_sources,
            template: template_name,
        } => {
            let embedder: Arc<dyn embedding::Embedder> =
                Arc::from(embedding::from_config(&config, true)?);
            let index = match (index, source) {
                (Some(path), _) => VectorIndex::load(path)?,
                (None, Some(source)) => {
                    qa::build_index(&config, &source, embedder.as_ref()).await?
                }
                (None, None) => return Err("either --source or --index is required".into()),
            };
            let assembler = PromptAssembler::new(
                template::load_template(&template_name)?,
                config.retrieval.context_budget,
            )?;
            let model = Arc::new(OpenAiChat::new(&config)?);
            let pipeline = QaPipeline::new(
                index,
                embedder,
                assembler,
                model,
                top_k.unwrap_or(config.retrieval.top_k),
            )?;

            let answer = pipeline.ask(&question).await?;
            pretty::print_answer(&mut stdout(), &answer, show_sources)?;
        }
        Commands::Agent {
            goal,
            verbose,
            template: template_name,
        } => {
            let registry = agent::registry_from_config(&config)?;
            info!("Agent tools: {}", registry.names().join(", "));
            let agent = Agent::new(
                Arc::new(OpenAiChat::new(&config)?),
                registry,
                template::load_template(&template_name)?,
                config.agent.max_steps,
            )?;

            match agent.run(&goal).await {
                Ok(run) => pretty::print_agent_run(&mut stdout(), &run, verbose)?,
                Err(GroundworkError::StepLimitExceeded { limit, steps }) => {
                    pretty::print_transcript(&mut std::io::stderr(), &steps)?;
                    return Err(format!("no final answer after {limit} steps").into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}
