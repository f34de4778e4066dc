
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error(
        "Invalid chunk configuration: chunk_size {chunk_size}, overlap {overlap} (need chunk_size > overlap >= 0 and chunk_size > 0)"
    )]
    InvalidChunkConfig { chunk_size: usize, overlap: usize },
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of words per chunk
    pub chunk_size: usize,
    /// Number of words shared between adjacent chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations whose window would never advance
    #[inline]
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(ChunkingError::InvalidChunkConfig {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// How far the window moves between chunks. Always positive for a valid config.
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// A contiguous word window cut from a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Words of the window joined with single spaces
    pub text: String,
    /// Position of this chunk within the document
    pub chunk_index: usize,
    /// Index of the first word (inclusive)
    pub start_word: usize,
    /// Index one past the last word
    pub end_word: usize,
}

impl Chunk {
    #[inline]
    pub fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }
}

/// Lazy iterator over the word windows of a document.
///
/// Cloning the iterator yields an independent cursor starting from the same
/// position, so a sequence can be replayed without re-splitting the text.
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: Vec<&'a str>,
    config: ChunkingConfig,
    offset: usize,
    next_index: usize,
    finished: bool,
}

impl<'a> WordChunks<'a> {
    fn new(text: &'a str, config: ChunkingConfig) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let finished = words.is_empty();
        Self {
            words,
            config,
            offset: 0,
            next_index: 0,
            finished,
        }
    }

    /// Total number of words in the source text
    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl Iterator for WordChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished || self.offset >= self.words.len() {
            self.finished = true;
            return None;
        }

        let start = self.offset;
        let end = (start + self.config.chunk_size).min(self.words.len());
        let chunk = Chunk {
            text: self.words[start..end].join(" "),
            chunk_index: self.next_index,
            start_word: start,
            end_word: end,
        };

        // Once a window reaches the last word, any later window would sit
        // entirely inside this one's overlap.
        if end == self.words.len() {
            self.finished = true;
        }
        self.offset += self.config.stride();
        self.next_index += 1;

        Some(chunk)
    }
}

/// Split text into overlapping word windows, lazily.
///
/// The configuration is validated before any work is done.
#[inline]
pub fn chunk_words<'a>(
    text: &'a str,
    config: &ChunkingConfig,
) -> Result<WordChunks<'a>, ChunkingError> {
    config.validate()?;
    Ok(WordChunks::new(text, *config))
}

/// Split text into overlapping word windows and collect their text
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, ChunkingError> {
    let chunks: Vec<String> = chunk_words(text, config)?.map(|c| c.text).collect();

    debug!(
        "Chunked {} words into {} chunks (size {}, overlap {})",
        text.split_whitespace().count(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}

/// Positional form of [`chunk_text`]
#[inline]
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ChunkingError> {
    chunk_text(text, &ChunkingConfig::new(chunk_size, overlap)?)
}
