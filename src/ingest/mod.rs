
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::embeddings::{ChunkingConfig, Embedder, chunk_words};
use crate::extract::ExtractorRegistry;
use crate::index::{CorpusStore, IndexError, MetadataRecord, VectorIndex, check_finite};
use crate::{RagError, Result};

/// Statistics about one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub files_seen: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
    /// Entries in the index after the run, including earlier runs
    pub total_entries: usize,
}

/// Offline batch job: extract, chunk, embed and index every supported file
/// of a directory, then persist the index once
pub struct IngestionPipeline<'a> {
    embedder: &'a dyn Embedder,
    chunking: ChunkingConfig,
    extractors: ExtractorRegistry,
    show_progress: bool,
}

impl<'a> IngestionPipeline<'a> {
    #[inline]
    pub fn new(
        embedder: &'a dyn Embedder,
        chunking: ChunkingConfig,
        extractors: ExtractorRegistry,
    ) -> Self {
        Self {
            embedder,
            chunking,
            extractors,
            show_progress: false,
        }
    }

    /// Draw a progress bar on an attended terminal
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Ingest the files directly inside `doc_dir` into `index` and save it to
    /// `store_path`.
    ///
    /// Unsupported or failing files are logged and counted without stopping
    /// the run. Entries are appended to whatever `index` already holds, so
    /// ingesting the same file twice stores it twice.
    #[inline]
    pub fn ingest(
        &self,
        doc_dir: &Path,
        index: &mut VectorIndex,
        store_path: &Path,
    ) -> Result<IngestionStats> {
        self.chunking.validate()?;

        let files = list_files(doc_dir)?;
        if files.is_empty() {
            return Err(RagError::Ingestion(format!(
                "No files found in document directory {}",
                doc_dir.display()
            )));
        }

        info!(
            "Ingesting {} files from {}",
            files.len(),
            doc_dir.display()
        );

        let mut stats = IngestionStats {
            files_seen: files.len(),
            ..IngestionStats::default()
        };

        let bar = self.progress_bar(files.len());

        for path in &files {
            let file_name = display_name(path);
            bar.set_message(file_name.clone());

            if !self.extractors.supports_path(path) {
                warn!("Skipping unsupported file: {}", path.display());
                stats.files_skipped += 1;
                bar.inc(1);
                continue;
            }

            match self.ingest_file(path, &file_name, index) {
                Ok(chunks) => {
                    debug!("Added {} chunks from {}", chunks, path.display());
                    stats.files_processed += 1;
                    stats.chunks_added += chunks;
                }
                Err(e) => {
                    error!("Failed to ingest {}: {}", path.display(), e);
                    stats.files_failed += 1;
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();

        index.save(store_path)?;
        stats.total_entries = index.size();

        info!(
            "Ingestion complete: {} processed, {} skipped, {} failed, {} chunks added, {} total entries",
            stats.files_processed,
            stats.files_skipped,
            stats.files_failed,
            stats.chunks_added,
            stats.total_entries
        );

        Ok(stats)
    }

    /// Ingest into a shared corpus. Searches keep seeing the previous state
    /// until the run has been saved.
    #[inline]
    pub fn ingest_corpus(&self, doc_dir: &Path, store: &CorpusStore) -> Result<IngestionStats> {
        store.update(|index| self.ingest(doc_dir, index, store.path()))
    }

    fn ingest_file(&self, path: &Path, file_name: &str, index: &mut VectorIndex) -> Result<usize> {
        let text = self.extractors.extract(path)?;

        let chunks: Vec<_> = chunk_words(&text, &self.chunking)?.collect();
        if chunks.is_empty() {
            warn!("No text extracted from {}", path.display());
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        // Check every vector first so a bad file never leaves partial entries
        if let Some(bad) = vectors.iter().find(|v| v.len() != index.dimension()) {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension(),
                actual: bad.len(),
            }
            .into());
        }
        for vector in &vectors {
            check_finite(vector)?;
        }

        let source = path.display().to_string();
        let ingested_at = Utc::now().to_rfc3339();
        let added = chunks.len();

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let metadata = MetadataRecord::new(chunk.text)
                .with_source(source.as_str())
                .with_chunk_index(chunk.chunk_index)
                .with_extra("file_name", file_name)
                .with_extra("ingested_at", ingested_at.as_str());
            index.add(vector, metadata)?;
        }

        Ok(added)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        let bar = if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_position(0);
        bar
    }
}

/// Regular files directly inside `doc_dir`, sorted by path
fn list_files(doc_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(doc_dir).map_err(|e| {
        RagError::Ingestion(format!(
            "Cannot read document directory {}: {}",
            doc_dir.display(),
            e
        ))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| {
                RagError::Ingestion(format!(
                    "Cannot read document directory {}: {}",
                    doc_dir.display(),
                    e
                ))
            })?
            .path();
        if path.is_file() {
            files.push(path);
        } else {
            debug!("Not descending into {}", path.display());
        }
    }

    files.sort();
    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
