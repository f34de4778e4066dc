use clap::{Parser, Subcommand};
use docs_rag::commands::{ingest_documents, search_corpus, show_context, show_status};
use docs_rag::config::{BASE_DIR_ENV, Config, resolve_base_dir, run_interactive_config, show_config};
use docs_rag::{RagError, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Document ingestion and context retrieval over an exact vector index")]
#[command(version)]
struct Cli {
    /// Base directory holding config.toml, docs/ and the corpus store
    #[arg(long, global = true, env = BASE_DIR_ENV)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest every supported file of a directory into the corpus
    Ingest {
        /// Directory to ingest (defaults to <base-dir>/docs)
        dir: Option<PathBuf>,
    },
    /// Search the corpus for chunks related to a query
    Search {
        query: String,
        /// Number of results to return
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the merged context for a question, optionally about a document
    Context {
        question: String,
        /// Document (txt, pdf or docx) to search alongside the corpus
        #[arg(long, short)]
        document: Option<PathBuf>,
        /// Results taken from each source
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Show corpus and embedding backend status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = resolve_base_dir(cli.base_dir).map_err(|e| RagError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Ingest { dir } => {
            ingest_documents(Config::load(&base_dir)?, dir).await?;
        }
        Commands::Search { query, top_k, json } => {
            search_corpus(Config::load(&base_dir)?, query, top_k, json).await?;
        }
        Commands::Context {
            question,
            document,
            top_k,
        } => {
            show_context(Config::load(&base_dir)?, question, document, top_k).await?;
        }
        Commands::Status => {
            show_status(Config::load(&base_dir)?).await?;
        }
    }

    Ok(())
}
