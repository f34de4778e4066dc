#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests: ingest a document directory, reopen the persisted
// corpus and retrieve merged context through the public API

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use docs_rag::config::{Config, EmbeddingConfig, EmbeddingProvider};
use docs_rag::embeddings::{ChunkingConfig, Embedder, HashEmbedder};
use docs_rag::extract::ExtractorRegistry;
use docs_rag::index::{CorpusStatus, CorpusStore, VectorIndex};
use docs_rag::ingest::IngestionPipeline;
use docs_rag::retrieval::{RetrievalService, retrieve};

const DIMENSION: usize = 1024;

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).expect("should create corpus dir");
    fs::write(
        dir.join("housing.txt"),
        "Tenants are entitled to the return of their security deposit within thirty days \
         of the end of the lease unless damage beyond normal wear is documented.",
    )
    .expect("should write housing doc");
    fs::write(
        dir.join("privacy.txt"),
        "Personal data may only be processed with explicit consent of the data subject \
         and must be deleted once the purpose of processing has lapsed.",
    )
    .expect("should write privacy doc");
    fs::write(dir.join("scan.tiff"), [0u8, 1, 2, 3]).expect("should write unsupported file");
}

fn hashing_config(base_dir: &Path) -> Config {
    Config {
        embedding: EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            embedding_dimension: DIMENSION as u32,
            ..EmbeddingConfig::default()
        },
        chunking: ChunkingConfig::new(20, 4).expect("valid chunking"),
        base_dir: base_dir.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn ingested_corpus_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = hashing_config(temp_dir.path());
    write_corpus(&config.documents_dir());

    let embedder = HashEmbedder::new(DIMENSION);
    {
        let store = CorpusStore::open(config.corpus_store_path(), DIMENSION)
            .expect("should open empty corpus");
        assert!(matches!(store.status(), CorpusStatus::Empty { .. }));

        let stats = IngestionPipeline::new(&embedder, config.chunking, ExtractorRegistry::default())
            .ingest_corpus(&config.documents_dir(), &store)
            .expect("ingestion should succeed");

        assert_eq!(stats.files_seen, 3);
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_skipped, 1);
        assert_eq!(stats.total_entries, store.size());
    }

    // Simulated process restart
    let service = RetrievalService::from_config(&config).expect("should build service");
    assert!(!service.corpus().is_empty());

    let results = service
        .search("tenants entitled to security deposit", Some(1))
        .expect("should search");
    assert_eq!(results.len(), 1);
    assert!(
        results[0]
            .metadata
            .source
            .as_deref()
            .is_some_and(|s| s.ends_with("housing.txt"))
    );
}

#[test]
fn ask_about_uploaded_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = hashing_config(temp_dir.path());
    write_corpus(&config.documents_dir());

    let embedder = HashEmbedder::new(DIMENSION);
    let store = Arc::new(
        CorpusStore::open(config.corpus_store_path(), DIMENSION).expect("should open corpus"),
    );
    IngestionPipeline::new(&embedder, config.chunking, ExtractorRegistry::default())
        .ingest_corpus(&config.documents_dir(), &store)
        .expect("ingestion should succeed");

    let service = RetrievalService::new(
        Arc::clone(&store),
        Arc::new(HashEmbedder::new(DIMENSION)),
        config.chunking,
        1,
    );

    let upload = "Clause 7: the landlord withholds the security deposit if rent is unpaid.";
    let context = service
        .context_for("security deposit", Some(upload), None)
        .expect("should build context");

    let parts: Vec<&str> = context.combined.split("\n\n").collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].contains("Tenants are entitled"));
    assert_eq!(parts[1], upload);
    assert_eq!(context.corpus_hits.len(), 1);
    assert_eq!(context.document_hits.len(), 1);
}

#[test]
fn merge_over_reloaded_index_matches_service() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = hashing_config(temp_dir.path());
    write_corpus(&config.documents_dir());

    let embedder = HashEmbedder::new(DIMENSION);
    let mut index = VectorIndex::new(DIMENSION);
    IngestionPipeline::new(&embedder, config.chunking, ExtractorRegistry::default())
        .ingest(&config.documents_dir(), &mut index, &config.corpus_store_path())
        .expect("ingestion should succeed");

    let reloaded =
        VectorIndex::load(&config.corpus_store_path(), DIMENSION).expect("should reload index");
    let query = embedder.embed("consent for personal data").expect("should embed");

    let direct = retrieve(&query, &reloaded, None, 2).expect("should retrieve");
    let service = RetrievalService::from_config(&config).expect("should build service");
    let via_service = service
        .context_for("consent for personal data", None, Some(2))
        .expect("should build context");

    assert_eq!(direct, via_service.combined);
    assert!(direct.starts_with("Personal data"));
}
