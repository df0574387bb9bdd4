//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use groundwork::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, .. } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of `<config_dir>/config.yaml`.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Most verbose log level written to stderr.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write the default configuration and prompt templates.
    Init {
        /// Overwrite files that already exist.
        #[arg(long)]
        force: bool,
    },

    /// Show how a source is split into chunks.
    Chunks {
        /// File path or http(s) URL.
        source: String,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Embed a source and save the index for later questions.
    Index {
        /// File path or http(s) URL.
        source: String,

        /// Where to write the index snapshot.
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Answer a question from a source or a saved index.
    #[clap(name = "ask", alias = "a")]
    Ask {
        question: String,

        /// File path or http(s) URL to index before asking.
        #[arg(long, short = 's', conflicts_with = "index", required_unless_present = "index")]
        source: Option<String>,

        /// Index snapshot written by `gw index`.
        #[arg(long, short = 'i')]
        index: Option<PathBuf>,

        /// Passages to retrieve; defaults to `retrieval.top_k`.
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Print the passages the answer was grounded on.
        #[arg(long)]
        show_sources: bool,

        /// Template name under `<config_dir>/templates`.
        #[arg(long, short = 't', default_value = "qa")]
        template: String,
    },

    /// Let the model work on a goal with the configured tools.
    Agent {
        goal: String,

        /// Print every step of the session.
        #[arg(long, short = 'v')]
        verbose: bool,

        #[arg(long, short = 't', default_value = "agent")]
        template: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_with_index() {
        let cli = Cli::try_parse_from([
            "gw",
            "ask",
            "Who wins?",
            "--index",
            "book.idx",
            "-k",
            "3",
            "--show-sources",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                question,
                source,
                index,
                top_k,
                show_sources,
                template,
            } => {
                assert_eq!(question, "Who wins?");
                assert_eq!(source, None);
                assert_eq!(index, Some(PathBuf::from("book.idx")));
                assert_eq!(top_k, Some(3));
                assert!(show_sources);
                assert_eq!(template, "qa");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log_level, tracing::Level::WARN);
    }

    #[test]
    fn test_ask_needs_exactly_one_corpus() {
        assert!(Cli::try_parse_from(["gw", "ask", "q"]).is_err());
        assert!(
            Cli::try_parse_from(["gw", "ask", "q", "-s", "book.txt", "-i", "book.idx"]).is_err()
        );
        assert!(Cli::try_parse_from(["gw", "a", "q", "-s", "book.txt"]).is_ok());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["gw", "agent", "Find it", "--config", "/tmp/gw.yaml", "-v"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gw.yaml")));
        assert!(matches!(cli.command, Commands::Agent { verbose: true, .. }));
    }
}
