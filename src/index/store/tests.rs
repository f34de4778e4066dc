use super::*;
use crate::embeddings::HashEmbedder;
use std::sync::Arc;
use tempfile::TempDir;

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("model unavailable"))
    }
}

struct ShortBatchEmbedder;

impl Embedder for ShortBatchEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0, 0.0])
    }

    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.0, 0.0]])
    }
}

fn unit(dimension: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[hot] = 1.0;
    v
}

#[test]
fn open_without_persisted_state_starts_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = CorpusStore::open(temp_dir.path().join("vectorstore"), 4).expect("should open");

    assert!(store.is_empty());
    assert_eq!(store.status(), CorpusStatus::Empty { dimension: 4 });
    assert!(
        store
            .search(&[0.0; 4], 5)
            .expect("should search")
            .is_empty()
    );
}

#[test]
fn save_then_open_restores_entries() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectorstore");

    let store = CorpusStore::open(&path, 3).expect("should open");
    store
        .add(unit(3, 0), MetadataRecord::new("x axis"))
        .expect("should add");
    store
        .add(unit(3, 1), MetadataRecord::new("y axis"))
        .expect("should add");
    store.save().expect("should save");

    let reopened = CorpusStore::open(&path, 3).expect("should reopen");
    assert_eq!(
        reopened.status(),
        CorpusStatus::Loaded {
            entries: 2,
            dimension: 3
        }
    );
    let results = reopened.search(&unit(3, 1), 1).expect("should search");
    assert_eq!(results[0].metadata.text, "y axis");
}

#[test]
fn open_with_mismatched_dimension_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = CorpusStore::open(temp_dir.path(), 3).expect("should open");
    store
        .add(unit(3, 2), MetadataRecord::new("z"))
        .expect("should add");
    store.save().expect("should save");

    let result = CorpusStore::open(temp_dir.path(), 5);
    assert!(matches!(result, Err(IndexError::CorruptIndex(_))));
}

#[test]
fn reload_discards_unsaved_changes() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = CorpusStore::open(temp_dir.path(), 2).expect("should open");
    store
        .add(vec![1.0, 0.0], MetadataRecord::new("saved"))
        .expect("should add");
    store.save().expect("should save");
    store
        .add(vec![0.0, 1.0], MetadataRecord::new("unsaved"))
        .expect("should add");
    assert_eq!(store.size(), 2);

    store.reload().expect("should reload");
    assert_eq!(store.size(), 1);
}

#[test]
fn failed_update_leaves_corpus_unchanged() {
    let store = CorpusStore::empty("/nonexistent/vectorstore", 2);
    store
        .add(vec![1.0, 1.0], MetadataRecord::new("kept"))
        .expect("should add");

    let result: Result<(), IndexError> = store.update(|index| {
        index.add(vec![2.0, 2.0], MetadataRecord::new("staged"))?;
        index.add(vec![3.0], MetadataRecord::new("bad"))?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(store.size(), 1);

    let added = store
        .update(|index| index.add(vec![2.0, 2.0], MetadataRecord::new("staged")))
        .expect("update should succeed");
    assert_eq!(added, 1);
    assert_eq!(store.size(), 2);
}

#[test]
fn concurrent_searches_run_alongside_writer() {
    let store = Arc::new(CorpusStore::empty("/nonexistent/vectorstore", 8));
    for i in 0..64 {
        store
            .add(unit(8, i % 8), MetadataRecord::new(format!("seed {i}")))
            .expect("should add");
    }

    std::thread::scope(|scope| {
        for reader in 0..4 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for _ in 0..200 {
                    let results = store
                        .search(&unit(8, reader), 3)
                        .expect("search should succeed");
                    assert_eq!(results.len(), 3);
                    assert_eq!(results[0].distance, 0.0);
                }
            });
        }

        let writer = Arc::clone(&store);
        scope.spawn(move || {
            for i in 0..100 {
                writer
                    .add(unit(8, i % 8), MetadataRecord::new(format!("late {i}")))
                    .expect("add should succeed");
            }
        });
    });

    assert_eq!(store.size(), 164);
}

#[test]
fn ephemeral_store_from_document() {
    let embedder = HashEmbedder::new(512);
    let text = "The tenant must give thirty days written notice before vacating. \
                Rent is due on the first day of every month.";
    let chunking = ChunkingConfig::new(8, 2).expect("valid config");

    let store = EphemeralStore::from_document(text, &chunking, &embedder).expect("should build");
    assert_eq!(store.size(), 3);

    let records: Vec<&MetadataRecord> = store.index().iter().map(|(_, meta)| meta).collect();
    assert!(
        records
            .iter()
            .all(|meta| meta.source.as_deref() == Some(UPLOAD_SOURCE))
    );
    assert_eq!(
        records.iter().map(|m| m.chunk_index).collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2)]
    );

    let query = embedder.embed("when is rent due").expect("should embed");
    let results = store.search(&query, 1).expect("should search");
    assert!(results[0].metadata.text.contains("Rent"));
}

#[test]
fn ephemeral_store_from_empty_document_is_empty() {
    let embedder = HashEmbedder::new(16);
    let store = EphemeralStore::from_document("   ", &ChunkingConfig::default(), &embedder)
        .expect("should build");
    assert!(store.is_empty());
    assert_eq!(store.into_index().dimension(), 16);
}

#[test]
fn ephemeral_store_surfaces_embedder_failures() {
    let result = EphemeralStore::from_document(
        "some document text",
        &ChunkingConfig::default(),
        &FailingEmbedder,
    );
    let error = result.expect_err("should fail");
    assert!(matches!(error, RagError::Embedding(_)));
    assert!(format!("{error}").contains("model unavailable"));

    let result = EphemeralStore::from_document(
        "one two three four five six",
        &ChunkingConfig::new(2, 0).expect("valid config"),
        &ShortBatchEmbedder,
    );
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[test]
fn ephemeral_store_rejects_invalid_chunking() {
    let embedder = HashEmbedder::new(16);
    let chunking = ChunkingConfig {
        chunk_size: 10,
        overlap: 10,
    };
    let result = EphemeralStore::from_document("text", &chunking, &embedder);
    assert!(matches!(result, Err(RagError::Chunking(_))));
}
