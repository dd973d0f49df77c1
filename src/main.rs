//! # pdfqa CLI
//!
//! Ask questions about a set of PDF files.
//!
//! ## Usage
//!
//! ```bash
//! pdfqa --config ./config/pdfqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfqa extract <file>` | Print a PDF's pages, text and images as JSON |
//! | `pdfqa chunks <paths>` | Print the chunks a build would index |
//! | `pdfqa search "<query>"` | Build a session and print scored matches |
//! | `pdfqa ask "<question>"` | Build a session and stream one answer |
//! | `pdfqa chat` | Build a session and answer questions from stdin |
//! | `pdfqa completions <shell>` | Print shell completions |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `pdfqa=info`).

use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use pdfqa::commands;
use pdfqa::config::{self, Config};

const DEFAULT_CONFIG: &str = "./config/pdfqa.toml";

/// Question answering over PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfqa",
    about = "Question answering over PDF documents",
    version,
    long_about = "pdfqa loads PDF files into per-page text and images, indexes token-bounded \
    chunks in an in-memory vector index, and answers questions with a streaming chat model \
    grounded in the retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdfqa.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a single PDF and print its pages as JSON.
    Extract {
        /// Path to the PDF file.
        file: PathBuf,

        /// Include base64-encoded image payloads in the output.
        #[arg(long)]
        include_image_data: bool,
    },

    /// Chunk PDFs and print the chunks as JSON.
    ///
    /// Directories are searched recursively for `*.pdf` files.
    Chunks {
        /// PDF files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Retrieve the passages most similar to a query.
    Search {
        /// The search query string.
        query: String,

        /// PDF files or directories to index.
        #[arg(long = "input", short = 'i', required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Answer one question, streaming the answer to stdout.
    Ask {
        /// The question.
        question: String,

        /// PDF files or directories to index.
        #[arg(long = "input", short = 'i', required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Interactive session: one question per line on stdin.
    Chat {
        /// PDF files or directories to index.
        #[arg(long = "input", short = 'i', required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfqa=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path.as_os_str() == DEFAULT_CONFIG {
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "pdfqa", &mut io::stdout());
        return Ok(());
    }

    init_tracing();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Extract {
            file,
            include_image_data,
        } => {
            commands::run_extract(&cfg, &file, include_image_data).await?;
        }
        Commands::Chunks { paths } => {
            commands::run_chunks(&cfg, &paths).await?;
        }
        Commands::Search { query, inputs } => {
            commands::run_search(&cfg, &query, &inputs).await?;
        }
        Commands::Ask { question, inputs } => {
            commands::run_ask(&cfg, &question, &inputs).await?;
        }
        Commands::Chat { inputs } => {
            commands::run_chat(&cfg, &inputs).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
