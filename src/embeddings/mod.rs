// Embeddings module
// Text chunking plus the embedding backends that turn chunks into vectors

pub mod chunking;
pub mod hashing;
pub mod ollama;


use anyhow::Result;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

pub use chunking::{
    Chunk, ChunkingConfig, ChunkingError, WordChunks, chunk, chunk_text, chunk_words,
};
pub use hashing::HashEmbedder;
pub use ollama::OllamaClient;

/// Maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a given model and input. Errors
/// from the backend are returned unchanged to the caller.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed a single piece of text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Build the embedder selected by the configuration
#[inline]
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaClient::new(config)?)),
        EmbeddingProvider::Hashing => Ok(Box::new(HashEmbedder::new(
            config.embedding_dimension as usize,
        ))),
    }
}
