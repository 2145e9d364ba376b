mod common;

use std::sync::Arc;

use common::CountingEmbedder;
use localrag_core::config::ChunkingSettings;
use localrag_core::memory::InMemoryVectorStore;
use localrag_core::traits::{Embedder, VectorStore};
use localrag_core::Error;
use localrag_engine::Ingestor;
use tempfile::TempDir;

fn ingestor(store: Arc<InMemoryVectorStore>) -> Ingestor {
    Ingestor::new(Arc::new(CountingEmbedder::new()), store, &ChunkingSettings { chunk_size: 40, chunk_overlap: 5 })
        .expect("ingestor")
}

#[test]
fn overlap_not_below_chunk_size_is_rejected() {
    let bad = ChunkingSettings { chunk_size: 10, chunk_overlap: 10 };
    let err = Ingestor::new(Arc::new(CountingEmbedder::new()), Arc::new(InMemoryVectorStore::new()), &bad);
    assert!(matches!(err, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn text_is_chunked_with_source_metadata_and_unique_ids() {
    let store = Arc::new(InMemoryVectorStore::new());
    let ing = ingestor(store.clone());
    let text = "Beans go in after frost.\n\nTomatoes need staking.\n\nGarlic is planted in autumn.";
    let n = ing.ingest_text("garden.txt", text).await.expect("ingest");
    assert!(n >= 2);
    assert_eq!(store.count().await.expect("count"), n);

    let probe = CountingEmbedder::new().embed("Tomatoes need staking.").expect("embed");
    let hits = store.query(&probe, n, None).await.expect("query");
    assert_eq!(hits.len(), n);
    assert!(hits.iter().all(|h| h.metadata["source"] == "garden.txt"));
    assert!(hits.iter().all(|h| h.id.starts_with("garden.txt_chunk_")));
    let mut indices: Vec<usize> = hits.iter().map(|h| h.metadata["chunk_index"].parse().expect("index")).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..n).collect::<Vec<_>>());
}

#[tokio::test]
async fn reingesting_adds_rather_than_collides() {
    let store = Arc::new(InMemoryVectorStore::new());
    let ing = ingestor(store.clone());
    let first = ing.ingest_text("a.md", "Short note about bees.").await.expect("ingest");
    let second = ing.ingest_text("a.md", "Short note about bees.").await.expect("ingest");
    assert_eq!(first, 1);
    assert_eq!(store.count().await.expect("count"), first + second);
}

#[tokio::test]
async fn blank_text_ingests_nothing() {
    let store = Arc::new(InMemoryVectorStore::new());
    assert_eq!(ingestor(store.clone()).ingest_text("empty.txt", "  \n\n ").await.expect("ingest"), 0);
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let pdf = tmp.path().join("manual.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").expect("write");
    let err = ingestor(Arc::new(InMemoryVectorStore::new())).ingest_file(&pdf).await;
    assert!(matches!(err, Err(Error::Unsupported(_))));
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let tmp = TempDir::new().expect("tmp");
    let err = ingestor(Arc::new(InMemoryVectorStore::new())).ingest_file(&tmp.path().join("gone.md")).await;
    assert!(matches!(err, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn directory_walk_ingests_supported_files_in_order() {
    let tmp = TempDir::new().expect("tmp");
    let nested = tmp.path().join("sub");
    std::fs::create_dir_all(&nested).expect("mkdir");
    std::fs::write(tmp.path().join("b.md"), "Chickens roost at dusk.").expect("write");
    std::fs::write(nested.join("a.txt"), "Compost needs turning weekly.").expect("write");
    std::fs::write(tmp.path().join("skip.pdf"), b"binary").expect("write");
    // Invalid UTF-8 is decoded lossily instead of failing the walk.
    std::fs::write(tmp.path().join("c.txt"), b"Well pump \xff serviced.").expect("write");

    let store = Arc::new(InMemoryVectorStore::new());
    let counts = ingestor(store.clone()).ingest_directory(tmp.path()).await.expect("ingest dir");
    let names: Vec<String> = counts
        .iter()
        .map(|(p, _)| p.strip_prefix(tmp.path()).expect("prefix").display().to_string())
        .collect();
    assert_eq!(names, vec!["b.md", "c.txt", "sub/a.txt"]);
    assert!(counts.iter().all(|(_, n)| *n == 1));
    assert_eq!(store.count().await.expect("count"), 3);
}
