// Named roles over VectorIndex: the shared, persisted corpus and the
// request-scoped in-memory store built from one uploaded document

#[cfg(test)]
mod tests;

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::persistence::persisted_state_exists;
use super::{IndexError, MetadataRecord, SearchResult, VectorIndex};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_words};
use crate::{RagError, Result};

/// Source recorded on chunks of an uploaded document
pub const UPLOAD_SOURCE: &str = "upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusStatus {
    Empty { dimension: usize },
    Loaded { entries: usize, dimension: usize },
}

impl fmt::Display for CorpusStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { dimension } => write!(f, "empty (dimension {dimension})"),
            Self::Loaded { entries, dimension } => {
                write!(f, "{entries} entries (dimension {dimension})")
            }
        }
    }
}

/// Long-lived corpus index shared by every request.
///
/// Searches take a read lock and run in parallel. Writers (`add`, `update`,
/// `save`, `reload`) are serialised by a separate mutex so a save never sits
/// on the write side of the `RwLock` while doing I/O.
#[derive(Debug)]
pub struct CorpusStore {
    path: PathBuf,
    index: RwLock<VectorIndex>,
    writer: Mutex<()>,
}

impl CorpusStore {
    /// Open the corpus persisted at `path`, or start empty if nothing has
    /// been saved there yet
    #[inline]
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self, IndexError> {
        let path = path.into();
        let index = load_or_empty(&path, dimension)?;

        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Mutex::new(()),
        })
    }

    /// In-memory corpus with no persisted state yet
    #[inline]
    pub fn empty(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            index: RwLock::new(VectorIndex::new(dimension)),
            writer: Mutex::new(()),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.read().dimension()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.index.read().size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    #[inline]
    pub fn status(&self) -> CorpusStatus {
        let index = self.index.read();
        if index.is_empty() {
            CorpusStatus::Empty {
                dimension: index.dimension(),
            }
        } else {
            CorpusStatus::Loaded {
                entries: index.size(),
                dimension: index.dimension(),
            }
        }
    }

    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, IndexError> {
        self.index.read().search(query, top_k)
    }

    /// Run `f` against the current index under a read lock
    #[inline]
    pub fn with_index<R>(&self, f: impl FnOnce(&VectorIndex) -> R) -> R {
        f(&self.index.read())
    }

    #[inline]
    pub fn add(&self, vector: Vec<f32>, metadata: MetadataRecord) -> Result<usize, IndexError> {
        let _writer = self.writer.lock();
        self.index.write().add(vector, metadata)
    }

    /// Apply a batch mutation to a private copy of the index, then swap it in.
    ///
    /// Searches keep seeing the previous state until `f` succeeds; if it
    /// fails the corpus is unchanged.
    ///
    /// The copy is a full clone, so peak memory while `f` runs is twice the
    /// corpus size (about 1.5 GB extra for a million 384-dimension vectors).
    /// Use [`CorpusStore::add`] followed by [`CorpusStore::save`] when that
    /// is too much and readers may observe entries one at a time.
    #[inline]
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut VectorIndex) -> Result<T, E>,
    {
        let _writer = self.writer.lock();
        let mut staged = self.index.read().clone();
        let output = f(&mut staged)?;
        *self.index.write() = staged;
        Ok(output)
    }

    /// Persist the current state to the store path
    #[inline]
    pub fn save(&self) -> Result<(), IndexError> {
        let _writer = self.writer.lock();
        self.index.read().save(&self.path)
    }

    /// Re-read the persisted state, discarding unsaved in-memory changes
    #[inline]
    pub fn reload(&self) -> Result<(), IndexError> {
        let _writer = self.writer.lock();
        let dimension = self.index.read().dimension();
        let index = load_or_empty(&self.path, dimension)?;
        *self.index.write() = index;
        Ok(())
    }
}

fn load_or_empty(path: &Path, dimension: usize) -> Result<VectorIndex, IndexError> {
    if !persisted_state_exists(path) {
        warn!(
            "No corpus index found at {}; starting with an empty corpus",
            path.display()
        );
        return Ok(VectorIndex::new(dimension));
    }

    let index = VectorIndex::load(path, dimension)?;
    if index.is_empty() {
        warn!("Corpus index at {} is empty", path.display());
    } else {
        info!(
            "Loaded corpus index with {} entries (dimension {}) from {}",
            index.size(),
            index.dimension(),
            path.display()
        );
    }
    Ok(index)
}

/// Request-scoped index built from one document and dropped afterwards.
///
/// Never touches the filesystem and is deliberately not `Clone` or shared.
#[derive(Debug)]
pub struct EphemeralStore {
    index: VectorIndex,
}

impl EphemeralStore {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
        }
    }

    /// Chunk `text`, embed the chunks in one batch and index them
    #[inline]
    pub fn from_document(
        text: &str,
        chunking: &ChunkingConfig,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let mut store = Self::new(embedder.dimension());
        let chunks: Vec<_> = chunk_words(text, chunking)?.collect();
        if chunks.is_empty() {
            debug!("Uploaded document produced no chunks");
            return Ok(store);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            let metadata = MetadataRecord::new(chunk.text)
                .with_source(UPLOAD_SOURCE)
                .with_chunk_index(chunk.chunk_index);
            store.index.add(vector, metadata)?;
        }

        debug!("Built ephemeral store with {} chunks", store.size());
        Ok(store)
    }

    #[inline]
    pub fn add(&mut self, vector: Vec<f32>, metadata: MetadataRecord) -> Result<usize, IndexError> {
        self.index.add(vector, metadata)
    }

    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, IndexError> {
        self.index.search(query, top_k)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.index.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn into_index(self) -> VectorIndex {
        self.index
    }
}
