use super::*;
use crate::embeddings::HashEmbedder;
use crate::index::MetadataRecord;

fn index_with(points: &[(f32, &str)]) -> VectorIndex {
    let mut index = VectorIndex::new(1);
    for (x, text) in points {
        index
            .add(vec![*x], MetadataRecord::new(*text))
            .expect("should add");
    }
    index
}

const LEGAL_TEXTS: [&str; 4] = [
    "A landlord must return the security deposit within thirty days.",
    "Personal data may only be processed with explicit consent.",
    "An employment contract can be terminated with two weeks notice.",
    "Copyright protects original works of authorship.",
];

fn service_with_corpus(texts: &[&str]) -> RetrievalService {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(256));
    let corpus = CorpusStore::empty("/nonexistent/vectorstore", 256);
    for text in texts {
        let vector = embedder.embed(text).expect("should embed");
        corpus
            .add(vector, MetadataRecord::new(*text).with_source("corpus"))
            .expect("should add");
    }
    RetrievalService::new(
        Arc::new(corpus),
        embedder,
        ChunkingConfig::new(12, 2).expect("valid chunking"),
        2,
    )
}

#[test]
fn merge_skips_blank_parts() {
    assert_eq!(merge_contexts(["a", "", "  ", "b"]), "a\n\nb");
    assert_eq!(merge_contexts(Vec::<String>::new()), "");
    assert_eq!(merge_contexts(["", "only"]), "only");
}

#[test]
fn corpus_results_come_before_document_results() {
    let corpus = index_with(&[(5.0, "corpus far"), (1.0, "corpus near")]);
    let document = index_with(&[(0.5, "doc nearest"), (9.0, "doc far")]);

    let context = retrieve(&[0.0], &corpus, Some(&document), 2).expect("should retrieve");
    assert_eq!(
        context,
        "corpus near\n\ncorpus far\n\ndoc nearest\n\ndoc far"
    );
}

#[test]
fn absent_document_store_yields_only_corpus_context() {
    let corpus = index_with(&[(3.0, "nine"), (0.0, "zero"), (2.0, "four")]);

    let context = retrieve(&[0.0], &corpus, None, 2).expect("should retrieve");
    assert_eq!(context, "zero\n\nfour");

    let empty_document = VectorIndex::new(1);
    let context = retrieve(&[0.0], &corpus, Some(&empty_document), 2).expect("should retrieve");
    assert_eq!(context, "zero\n\nfour");
}

#[test]
fn empty_corpus_is_skipped() {
    let corpus = VectorIndex::new(3);
    let document = index_with(&[(1.0, "from the upload")]);

    // Wrong query dimension for the corpus is irrelevant when it is skipped
    let context = retrieve(&[0.0], &corpus, Some(&document), 3).expect("should retrieve");
    assert_eq!(context, "from the upload");

    let context = retrieve(&[0.0, 0.0, 0.0], &corpus, None, 3).expect("should retrieve");
    assert!(context.is_empty());
}

#[test]
fn dimension_mismatch_propagates() {
    let corpus = index_with(&[(1.0, "x")]);
    let result = retrieve(&[0.0, 1.0], &corpus, None, 1);
    assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
}

#[test]
fn service_search_ranks_relevant_corpus_chunk_first() {
    let service = service_with_corpus(&LEGAL_TEXTS);

    let results = service
        .search("when must the landlord return the security deposit", None)
        .expect("should search");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].metadata.text, LEGAL_TEXTS[0]);

    let all = service.search("deposit", Some(10)).expect("should search");
    assert_eq!(all.len(), 4);
}

#[test]
fn service_search_on_empty_corpus_returns_nothing() {
    let service = service_with_corpus(&[]);
    assert!(
        service
            .search("anything", None)
            .expect("should search")
            .is_empty()
    );
}

#[test]
fn context_for_merges_corpus_and_uploaded_document() {
    let service = service_with_corpus(&LEGAL_TEXTS);
    let document = "This rental agreement requires the tenant to pay a security deposit \
                    of two months rent. The deposit is held in a separate account.";

    let context = service
        .context_for("security deposit return", Some(document), Some(1))
        .expect("should build context");

    assert_eq!(context.corpus_hits.len(), 1);
    assert_eq!(context.corpus_hits[0].metadata.text, LEGAL_TEXTS[0]);
    assert_eq!(context.document_hits.len(), 1);
    assert_eq!(
        context.document_hits[0].metadata.source.as_deref(),
        Some("upload")
    );
    assert!(context.combined.starts_with(LEGAL_TEXTS[0]));
    assert_eq!(
        context.combined,
        format!(
            "{}\n\n{}",
            LEGAL_TEXTS[0], context.document_hits[0].metadata.text
        )
    );

    // The uploaded document never reaches the shared corpus
    assert_eq!(service.corpus().size(), 4);
}

#[test]
fn context_without_document_or_corpus_is_empty() {
    let service = service_with_corpus(&[]);
    let context = service
        .context_for("anything at all", None, None)
        .expect("should build context");

    assert!(context.corpus_hits.is_empty());
    assert!(context.document_hits.is_empty());
    assert_eq!(context.combined, "");
}

#[tokio::test]
async fn concurrent_requests_get_isolated_document_stores() {
    let service = Arc::new(service_with_corpus(&LEGAL_TEXTS));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::task::spawn_blocking(move || {
                let document = format!("request {i} uploaded a unique document marker{i}");
                let context = service
                    .context_for(&format!("marker{i}"), Some(&document), Some(1))
                    .expect("should build context");
                (i, context)
            })
        })
        .collect();

    for handle in handles {
        let (i, context) = handle.await.expect("task should join");
        assert_eq!(context.document_hits.len(), 1);
        assert!(
            context.document_hits[0]
                .metadata
                .text
                .contains(&format!("marker{i}"))
        );
    }
    assert_eq!(service.corpus().size(), 4);
}
