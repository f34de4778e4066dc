use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingProvider};
use crate::embeddings::{OllamaClient, embedder_from_config};
use crate::extract::{ExtractorRegistry, extract_text};
use crate::index::persistence::read_manifest;
use crate::index::{
    CorpusStatus, CorpusStore, IndexError, SearchResult, persisted_state_exists,
};
use crate::ingest::{IngestionPipeline, IngestionStats};
use crate::retrieval::RetrievalService;
use crate::{RagError, Result};

/// Ingest a document directory into the corpus store
#[inline]
pub async fn ingest_documents(config: Config, dir: Option<PathBuf>) -> Result<IngestionStats> {
    let doc_dir = dir.unwrap_or_else(|| config.documents_dir());
    info!("Ingesting documents from {}", doc_dir.display());

    let stats = tokio::task::spawn_blocking(move || -> Result<IngestionStats> {
        let embedder = embedder_from_config(&config.embedding)?;
        let store = CorpusStore::open(config.corpus_store_path(), embedder.dimension())?;

        IngestionPipeline::new(
            embedder.as_ref(),
            config.chunking,
            ExtractorRegistry::default(),
        )
        .with_progress(true)
        .ingest_corpus(&doc_dir, &store)
    })
    .await
    .context("Ingestion task failed")??;

    println!("{}", style("✓ Ingestion complete").green().bold());
    println!("   📄 Files seen: {}", stats.files_seen);
    println!("   ✅ Processed: {}", stats.files_processed);
    if stats.files_skipped > 0 {
        println!("   ⏭️  Skipped (unsupported): {}", stats.files_skipped);
    }
    if stats.files_failed > 0 {
        println!(
            "   {} {}",
            style("❌ Failed:").red(),
            style(stats.files_failed).red()
        );
    }
    println!("   🧩 Chunks added: {}", stats.chunks_added);
    println!("   🗄️  Corpus entries: {}", stats.total_entries);

    Ok(stats)
}

/// Query the corpus and print ranked results
#[inline]
pub async fn search_corpus(
    config: Config,
    query: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let results = tokio::task::spawn_blocking(move || -> Result<Vec<SearchResult>> {
        let service = RetrievalService::from_config(&config)?;
        if service.corpus().is_empty() {
            warn!("Corpus is empty; run `docs-rag ingest` first");
        }
        service.search(&query, top_k)
    })
    .await
    .context("Search task failed")??;

    if json {
        let output =
            serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
        println!("{output}");
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let source = result.metadata.source.as_deref().unwrap_or("unknown");
        let chunk = result
            .metadata
            .chunk_index
            .map_or_else(String::new, |i| format!(" #{i}"));
        println!(
            "{}. {} {}",
            rank + 1,
            style(format!("{source}{chunk}")).cyan(),
            style(format!("(distance {:.4})", result.distance)).dim()
        );
        println!("   {}", preview(&result.metadata.text, 200));
        println!();
    }

    Ok(())
}

/// Print the merged context the prompt builder would receive
#[inline]
pub async fn show_context(
    config: Config,
    question: String,
    document: Option<PathBuf>,
    top_k: Option<usize>,
) -> Result<()> {
    let service_config = config.clone();
    let service_task =
        tokio::task::spawn_blocking(move || RetrievalService::from_config(&service_config));
    let document_task = tokio::task::spawn_blocking(move || {
        document
            .map(|path| extract_text(&path))
            .transpose()
            .map_err(RagError::from)
    });

    let (service, document_text) = tokio::try_join!(service_task, document_task)
        .context("Context task failed")?;
    let service = Arc::new(service?);
    let document_text = document_text?;

    let context = tokio::task::spawn_blocking(move || {
        service.context_for(&question, document_text.as_deref(), top_k)
    })
    .await
    .context("Context task failed")??;

    eprintln!(
        "{}",
        style(format!(
            "{} corpus chunks, {} document chunks",
            context.corpus_hits.len(),
            context.document_hits.len()
        ))
        .dim()
    );

    if context.combined.is_empty() {
        eprintln!("{}", style("No context available.").yellow());
    } else {
        println!("{}", context.combined);
    }

    Ok(())
}

/// Show corpus and embedding backend status
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    println!("📊 Docs-RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    let store_path = config.corpus_store_path();
    println!("🗄️  Corpus Store: {}", store_path.display());

    let dimension = config.embedding_dimension();
    match corpus_status(&store_path, dimension) {
        Ok((status, saved_at)) => {
            match status {
                CorpusStatus::Empty { dimension } => {
                    println!("   ⚠️  Corpus is empty (dimension {dimension})");
                }
                CorpusStatus::Loaded { entries, dimension } => {
                    println!("   ✅ {entries} entries (dimension {dimension})");
                }
            }
            if let Some(saved_at) = saved_at {
                println!("   🕒 Last saved: {}", saved_at.to_rfc3339());
            }
        }
        Err(e) => println!("   ❌ Failed to read corpus: {}", e),
    }

    println!();
    println!("🤖 Embedding Backend: {}", config.embedding.provider);
    match config.embedding.provider {
        EmbeddingProvider::Hashing => {
            println!("   ✅ Offline hashing embedder (dimension {dimension})");
        }
        EmbeddingProvider::Ollama => {
            let embedding = config.embedding.clone();
            let health = tokio::task::spawn_blocking(move || {
                OllamaClient::new(&embedding).and_then(|client| client.health_check())
            })
            .await
            .context("Status task failed")?;

            match health {
                Ok(()) => println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.embedding.host, config.embedding.port
                ),
                Err(e) => println!("   ❌ Ollama: {:#}", e),
            }
            println!("   📋 Model: {}", config.embedding.model);
            println!("   🔢 Batch Size: {}", config.embedding.batch_size);
        }
    }

    println!();
    println!(
        "✂️  Chunking: {} words, {} overlap",
        config.chunking.chunk_size, config.chunking.overlap
    );
    println!("🎯 Top K: {}", config.retrieval.top_k);

    Ok(())
}

/// Corpus size from the published manifest, without loading any vectors
fn corpus_status(
    store_path: &Path,
    dimension: usize,
) -> Result<(CorpusStatus, Option<DateTime<Utc>>)> {
    if !persisted_state_exists(store_path) {
        return Ok((CorpusStatus::Empty { dimension }, None));
    }

    let manifest = read_manifest(store_path)?;
    if manifest.dimension != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: manifest.dimension,
        }
        .into());
    }

    let status = if manifest.count == 0 {
        CorpusStatus::Empty {
            dimension: manifest.dimension,
        }
    } else {
        CorpusStatus::Loaded {
            entries: manifest.count,
            dimension: manifest.dimension,
        }
    };
    Ok((status, Some(manifest.saved_at)))
}

fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let truncated: String = flattened.chars().take(max_chars).collect();
    format!("{}…", truncated.trim_end())
}
