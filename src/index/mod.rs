// Exact nearest-neighbour index over fixed-dimension vectors
//
// Entries are append-only: the i-th vector and the i-th metadata record
// always describe the same chunk, and ids are insertion positions.

pub mod persistence;
pub mod store;


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub use persistence::persisted_state_exists;
pub use store::{CorpusStatus, CorpusStore, EphemeralStore};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Non-finite value at component {component}")]
    NonFiniteVector { component: usize },

    #[error("Metadata extension key '{0}' collides with a record field")]
    ReservedMetadataKey(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys owned by the typed fields of [`MetadataRecord`]
pub const RESERVED_METADATA_KEYS: [&str; 3] = ["text", "source", "chunk_index"];

/// Record stored alongside each vector.
///
/// `text` is what retrieval hands back to the prompt builder. Provenance
/// lives in `source` and `chunk_index`; anything else goes in `extra` and is
/// passed through untouched. `extra` is serialized flat next to the typed
/// fields, so it may not use any of [`RESERVED_METADATA_KEYS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MetadataRecord {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            chunk_index: None,
            extra: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[inline]
    pub fn with_chunk_index(mut self, chunk_index: usize) -> Self {
        self.chunk_index = Some(chunk_index);
        self
    }

    /// Add an extension field. Reserved keys are rejected when the record
    /// is added to an index; see [`MetadataRecord::validate`].
    #[inline]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fails when an extension key would shadow a typed field on disk
    #[inline]
    pub fn validate(&self) -> Result<(), IndexError> {
        match RESERVED_METADATA_KEYS
            .iter()
            .find(|key| self.extra.contains_key(**key))
        {
            Some(key) => Err(IndexError::ReservedMetadataKey((*key).to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Insertion position of the matched entry
    pub id: usize,
    pub metadata: MetadataRecord,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Brute-force index: every search scans all stored vectors.
///
/// Vectors are kept in one contiguous buffer of `len * dimension` floats.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
    metadata: Vec<MetadataRecord>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Append a vector and its metadata, returning the assigned id
    #[inline]
    pub fn add(&mut self, vector: Vec<f32>, metadata: MetadataRecord) -> Result<usize, IndexError> {
        self.check_dimension(vector.len())?;
        check_finite(&vector)?;
        metadata.validate()?;

        let id = self.metadata.len();
        self.vectors.extend_from_slice(&vector);
        self.metadata.push(metadata);
        Ok(id)
    }

    /// The `top_k` nearest entries in ascending distance, ties by lower id
    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, IndexError> {
        self.check_dimension(query.len())?;
        check_finite(query)?;

        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors()
            .enumerate()
            .map(|(id, vector)| (squared_l2(query, vector), id))
            .collect();

        let by_distance_then_id =
            |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));

        if top_k < scored.len() {
            scored.select_nth_unstable_by(top_k - 1, by_distance_then_id);
            scored.truncate(top_k);
        }
        scored.sort_unstable_by(by_distance_then_id);

        debug!(
            "Searched {} vectors, returning {} results",
            self.size(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .filter_map(|(distance, id)| {
                self.metadata.get(id).map(|metadata| SearchResult {
                    id,
                    metadata: metadata.clone(),
                    distance,
                })
            })
            .collect())
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<(&[f32], &MetadataRecord)> {
        let metadata = self.metadata.get(id)?;
        let start = id.checked_mul(self.dimension)?;
        let vector = self.vectors.get(start..start + self.dimension)?;
        Some((vector, metadata))
    }

    /// Entries in insertion order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], &MetadataRecord)> {
        self.vectors().zip(self.metadata.iter())
    }

    fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        let dimension = self.dimension;
        (0..self.metadata.len()).filter_map(move |id| {
            let start = id * dimension;
            self.vectors.get(start..start + dimension)
        })
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub(crate) fn metadata(&self) -> &[MetadataRecord] {
        &self.metadata
    }

    /// Rebuild from parts read back from disk; callers validate counts first
    pub(crate) fn from_parts(
        dimension: usize,
        vectors: Vec<f32>,
        metadata: Vec<MetadataRecord>,
    ) -> Result<Self, IndexError> {
        if vectors.len() != metadata.len() * dimension {
            return Err(IndexError::CorruptIndex(format!(
                "{} floats cannot hold {} vectors of dimension {}",
                vectors.len(),
                metadata.len(),
                dimension
            )));
        }

        Ok(Self {
            dimension,
            vectors,
            metadata,
        })
    }
}

/// Infinite or NaN components would make distances NaN and break ordering
#[inline]
pub(crate) fn check_finite(vector: &[f32]) -> Result<(), IndexError> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(component) => Err(IndexError::NonFiniteVector { component }),
        None => Ok(()),
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
