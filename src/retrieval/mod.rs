// Query-time retrieval: search the corpus and, when a document is attached,
// a request-scoped store built from it, then merge their texts into one
// context string for the prompt builder

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::embeddings::{ChunkingConfig, Embedder, embedder_from_config};
use crate::index::{CorpusStore, EphemeralStore, IndexError, SearchResult, VectorIndex};
use crate::{RagError, Result};

/// Placed between merged chunk texts
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Join the non-blank parts with a blank line
#[inline]
pub fn merge_contexts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut combined = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.trim().is_empty() {
            continue;
        }
        if !combined.is_empty() {
            combined.push_str(CONTEXT_SEPARATOR);
        }
        combined.push_str(part);
    }
    combined
}

/// Search both sources and return the merged context, corpus results first.
///
/// An empty corpus is skipped rather than searched, so it contributes
/// nothing instead of failing.
#[inline]
pub fn retrieve(
    query: &[f32],
    corpus: &VectorIndex,
    doc_store: Option<&VectorIndex>,
    top_k: usize,
) -> Result<String, IndexError> {
    let (corpus_hits, document_hits) = search_sources(query, corpus, doc_store, top_k)?;
    Ok(merge_hits(&corpus_hits, &document_hits))
}

fn search_sources(
    query: &[f32],
    corpus: &VectorIndex,
    doc_store: Option<&VectorIndex>,
    top_k: usize,
) -> Result<(Vec<SearchResult>, Vec<SearchResult>), IndexError> {
    let corpus_hits = if corpus.is_empty() {
        debug!("Corpus is empty, skipping corpus search");
        Vec::new()
    } else {
        corpus.search(query, top_k)?
    };

    let document_hits = doc_store
        .map(|store| store.search(query, top_k))
        .transpose()?
        .unwrap_or_default();

    Ok((corpus_hits, document_hits))
}

fn merge_hits(corpus_hits: &[SearchResult], document_hits: &[SearchResult]) -> String {
    merge_contexts(
        corpus_hits
            .iter()
            .chain(document_hits)
            .map(|hit| hit.metadata.text.as_str()),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub corpus_hits: Vec<SearchResult>,
    pub document_hits: Vec<SearchResult>,
    /// Text handed to the prompt builder
    pub combined: String,
}

/// Everything a request handler needs to retrieve context, constructed once
/// and passed around explicitly
#[derive(Clone)]
pub struct RetrievalService {
    corpus: Arc<CorpusStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    top_k: usize,
}

impl std::fmt::Debug for RetrievalService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("corpus", &self.corpus.path())
            .field("dimension", &self.embedder.dimension())
            .field("chunking", &self.chunking)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl RetrievalService {
    #[inline]
    pub fn new(
        corpus: Arc<CorpusStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        top_k: usize,
    ) -> Self {
        Self {
            corpus,
            embedder,
            chunking,
            top_k,
        }
    }

    /// Build the embedder and open the corpus named by the configuration
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(embedder_from_config(&config.embedding)?);
        let corpus = CorpusStore::open(config.corpus_store_path(), embedder.dimension())?;

        Ok(Self::new(
            Arc::new(corpus),
            embedder,
            config.chunking,
            config.retrieval.top_k,
        ))
    }

    #[inline]
    pub fn corpus(&self) -> &Arc<CorpusStore> {
        &self.corpus
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Corpus results for a free-text query, nearest first
    #[inline]
    pub fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchResult>> {
        let top_k = top_k.unwrap_or(self.top_k);
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(query)?;
        Ok(self.corpus.search(&query_vector, top_k)?)
    }

    /// Context for answering `question`, optionally about an uploaded
    /// document whose text is indexed just for this call
    #[inline]
    pub fn context_for(
        &self,
        question: &str,
        document_text: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<RetrievedContext> {
        let top_k = top_k.unwrap_or(self.top_k);
        let query_vector = self.embed_query(question)?;

        let document = document_text
            .map(|text| EphemeralStore::from_document(text, &self.chunking, self.embedder.as_ref()))
            .transpose()?;

        let (corpus_hits, document_hits) = self.corpus.with_index(|corpus| {
            search_sources(
                &query_vector,
                corpus,
                document.as_ref().map(EphemeralStore::index),
                top_k,
            )
        })?;

        debug!(
            "Retrieved {} corpus and {} document chunks",
            corpus_hits.len(),
            document_hits.len()
        );

        let combined = merge_hits(&corpus_hits, &document_hits);
        Ok(RetrievedContext {
            corpus_hits,
            document_hits,
            combined,
        })
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(text)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))
    }
}
