
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IndexError, MetadataRecord, VectorIndex};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";
const VECTORS_PREFIX: &str = "vectors-";
const METADATA_PREFIX: &str = "metadata-";
const VECTORS_MAGIC: &[u8; 4] = b"DRVI";
pub const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Points at the generation of artifacts that is currently authoritative.
///
/// Publishing a save means atomically replacing this file; artifacts of any
/// other generation are ignored by `load` and removed by the next save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: String,
    pub dimension: usize,
    pub count: usize,
    pub vectors_file: String,
    pub metadata_file: String,
    pub saved_at: DateTime<Utc>,
}

/// True when a published index exists at `path`
#[inline]
pub fn persisted_state_exists(path: &Path) -> bool {
    path.join(MANIFEST_FILE).is_file()
}

/// Read the manifest of a published index
#[inline]
pub fn read_manifest(path: &Path) -> Result<Manifest, IndexError> {
    let manifest_path = path.join(MANIFEST_FILE);
    let content = match fs::read_to_string(&manifest_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(missing_manifest_error(path));
        }
        Err(e) => return Err(e.into()),
    };

    let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
        IndexError::CorruptIndex(format!(
            "unreadable manifest {}: {}",
            manifest_path.display(),
            e
        ))
    })?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::CorruptIndex(format!(
            "unsupported format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    for file_name in [&manifest.vectors_file, &manifest.metadata_file] {
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name.as_str()) {
            return Err(IndexError::CorruptIndex(format!(
                "manifest references a path outside the store: {}",
                file_name
            )));
        }
    }

    Ok(manifest)
}

impl VectorIndex {
    /// Persist the whole index under the directory `path`.
    ///
    /// Both artifacts are written and synced under a fresh generation before
    /// the manifest is swapped in with a rename, so readers observe either
    /// the previous save or this one.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(path)?;

        let generation = Uuid::new_v4().simple().to_string();
        let vectors_file = format!("{VECTORS_PREFIX}{generation}.bin");
        let metadata_file = format!("{METADATA_PREFIX}{generation}.json");

        self.write_vectors(&path.join(&vectors_file))?;
        write_synced(&path.join(&metadata_file), |writer| {
            serde_json::to_writer(writer, self.metadata()).map_err(std::io::Error::other)
        })?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            generation: generation.clone(),
            dimension: self.dimension(),
            count: self.size(),
            vectors_file,
            metadata_file,
            saved_at: Utc::now(),
        };

        let tmp_path = path.join(MANIFEST_TMP_FILE);
        write_synced(&tmp_path, |writer| {
            serde_json::to_writer_pretty(writer, &manifest).map_err(std::io::Error::other)
        })?;
        fs::rename(&tmp_path, path.join(MANIFEST_FILE))?;
        sync_dir(path);

        info!(
            "Saved index with {} entries (dimension {}) to {}",
            self.size(),
            self.dimension(),
            path.display()
        );

        remove_stale_generations(path, &generation);
        Ok(())
    }

    /// Load the index published at `path`, which must have `dimension`
    #[inline]
    pub fn load(path: &Path, dimension: usize) -> Result<Self, IndexError> {
        if !persisted_state_exists(path) {
            return Err(missing_manifest_error(path));
        }

        let manifest = read_manifest(path)?;

        if manifest.dimension != dimension {
            return Err(IndexError::CorruptIndex(format!(
                "stored dimension {} does not match configured dimension {}",
                manifest.dimension, dimension
            )));
        }

        let vectors = read_vectors(&path.join(&manifest.vectors_file), &manifest)?;
        let metadata = read_metadata(&path.join(&manifest.metadata_file))?;

        if metadata.len() != manifest.count {
            return Err(IndexError::CorruptIndex(format!(
                "metadata count {} does not match vector count {}",
                metadata.len(),
                manifest.count
            )));
        }

        debug!(
            "Loaded generation {} with {} entries from {}",
            manifest.generation,
            manifest.count,
            path.display()
        );

        Self::from_parts(dimension, vectors, metadata)
    }

    /// Replace the in-memory state with the index published at `path`.
    /// On error the current state is left untouched.
    #[inline]
    pub fn load_into(&mut self, path: &Path) -> Result<(), IndexError> {
        *self = Self::load(path, self.dimension())?;
        Ok(())
    }

    fn write_vectors(&self, file_path: &Path) -> Result<(), IndexError> {
        let dimension = u32::try_from(self.dimension()).map_err(|_| {
            IndexError::CorruptIndex(format!("dimension {} too large", self.dimension()))
        })?;

        write_synced(file_path, |writer| {
            writer.write_all(VECTORS_MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&dimension.to_le_bytes())?;
            writer.write_all(&(self.size() as u64).to_le_bytes())?;
            for value in self.raw_vectors() {
                writer.write_all(&value.to_le_bytes())?;
            }
            Ok(())
        })?;

        Ok(())
    }
}

fn missing_manifest_error(path: &Path) -> IndexError {
    if has_orphaned_artifacts(path) {
        IndexError::CorruptIndex(format!(
            "index artifacts in {} have no manifest",
            path.display()
        ))
    } else {
        IndexError::CorruptIndex(format!("no persisted index at {}", path.display()))
    }
}

fn has_orphaned_artifacts(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|entries| {
        entries.filter_map(|e| e.ok()).any(|entry| {
            entry.file_name().to_str().is_some_and(|name| {
                name.starts_with(VECTORS_PREFIX) || name.starts_with(METADATA_PREFIX)
            })
        })
    })
}

fn read_vectors(file_path: &Path, manifest: &Manifest) -> Result<Vec<f32>, IndexError> {
    let bytes = read_artifact(file_path)?;
    let mut reader = bytes.as_slice();

    let corrupt = |reason: &str| {
        IndexError::CorruptIndex(format!("{}: {}", file_path.display(), reason))
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt("truncated header"));
    }

    let mut magic = [0u8; 4];
    let mut word = [0u8; 4];
    let mut long = [0u8; 8];

    reader.read_exact(&mut magic)?;
    if &magic != VECTORS_MAGIC {
        return Err(corrupt("bad magic"));
    }

    reader.read_exact(&mut word)?;
    if u32::from_le_bytes(word) != FORMAT_VERSION {
        return Err(corrupt("unsupported format version"));
    }

    reader.read_exact(&mut word)?;
    let dimension = u32::from_le_bytes(word) as usize;
    if dimension != manifest.dimension {
        return Err(corrupt("header dimension disagrees with manifest"));
    }

    reader.read_exact(&mut long)?;
    let count = usize::try_from(u64::from_le_bytes(long)).map_err(|_| corrupt("count overflow"))?;
    if count != manifest.count {
        return Err(corrupt("header count disagrees with manifest"));
    }

    let expected_bytes = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("size overflow"))?;
    if reader.len() != expected_bytes {
        return Err(corrupt("vector data length disagrees with header"));
    }

    let vectors: Vec<f32> = reader
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if vectors.iter().any(|x| !x.is_finite()) {
        return Err(corrupt("non-finite vector component"));
    }

    Ok(vectors)
}

fn read_metadata(file_path: &Path) -> Result<Vec<MetadataRecord>, IndexError> {
    let bytes = read_artifact(file_path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        IndexError::CorruptIndex(format!("{}: {}", file_path.display(), e))
    })
}

fn read_artifact(file_path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(file_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IndexError::CorruptIndex(format!("missing artifact {}", file_path.display()))
        } else {
            IndexError::Io(e)
        }
    })
}

fn write_synced<F>(file_path: &Path, write: F) -> Result<(), IndexError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(file_path)?);
    write(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Err(e) = File::open(path).and_then(|dir| dir.sync_all()) {
        warn!("Failed to sync directory {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) {}

fn remove_stale_generations(path: &Path, current: &str) {
    let Ok(entries) = fs::read_dir(path) else {
        return;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };

        let is_artifact = name.starts_with(VECTORS_PREFIX) || name.starts_with(METADATA_PREFIX);
        if is_artifact && !name.contains(current) {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!("Removed stale index artifact {}", name),
                Err(e) => warn!("Failed to remove stale index artifact {}: {}", name, e),
            }
        }
    }
}
