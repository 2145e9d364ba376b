mod common;

use std::sync::Arc;

use common::CountingEmbedder;
use localrag_core::memory::InMemoryVectorStore;
use localrag_core::traits::{Embedder, VectorStore};
use localrag_engine::SemanticCache;

fn cache() -> (SemanticCache, Arc<CountingEmbedder>, Arc<InMemoryVectorStore>) {
    let embedder = Arc::new(CountingEmbedder::new());
    let store = Arc::new(InMemoryVectorStore::new());
    (SemanticCache::new(embedder.clone(), store.clone(), 0.25), embedder, store)
}

#[tokio::test]
async fn miss_still_returns_the_query_embedding() {
    let (cache, embedder, _) = cache();
    let lookup = cache.lookup("how often to clean tanks", "m1").await.expect("lookup");
    assert!(lookup.hit.is_none());
    assert!(lookup.nearest.is_none());
    assert_eq!(lookup.embedding.len(), common::DIM);
    assert_eq!(embedder.embedded(), 1);
}

#[tokio::test]
async fn identical_query_hits_after_store() {
    let (cache, _, _) = cache();
    cache.store("how often to clean tanks", "every spring", "m1").await.expect("store");
    let lookup = cache.lookup("how often to clean tanks", "m1").await.expect("lookup");
    let hit = lookup.hit.expect("hit");
    assert_eq!(hit.response, "every spring");
    assert_eq!(hit.original_query, "how often to clean tanks");
    assert!(hit.distance < 1e-4);
}

#[tokio::test]
async fn entries_never_leak_across_models() {
    let (cache, _, _) = cache();
    cache.store("how often to clean tanks", "every spring", "A").await.expect("store");
    let lookup = cache.lookup("how often to clean tanks", "B").await.expect("lookup");
    assert!(lookup.hit.is_none());
    assert!(lookup.nearest.is_none());
}

#[tokio::test]
async fn same_query_and_model_overwrites() {
    let (cache, _, store) = cache();
    cache.store("q about goats", "first", "m1").await.expect("store");
    cache.store("q about goats", "second", "m1").await.expect("store");
    assert_eq!(store.count().await.expect("count"), 1);
    let hit = cache.lookup("q about goats", "m1").await.expect("lookup").hit.expect("hit");
    assert_eq!(hit.response, "second");
}

#[tokio::test]
async fn same_query_for_two_models_keeps_two_entries() {
    let (cache, _, store) = cache();
    cache.store("q about goats", "from a", "A").await.expect("store");
    cache.store("q about goats", "from b", "B").await.expect("store");
    assert_eq!(store.count().await.expect("count"), 2);
    let hit = cache.lookup("q about goats", "B").await.expect("lookup").hit.expect("hit");
    assert_eq!(hit.response, "from b");
}

#[tokio::test]
async fn unrelated_query_misses_with_a_distance() {
    let (cache, _, _) = cache();
    cache.store("solar panel output at noon", "high", "m1").await.expect("store");
    let lookup = cache.lookup("goat hay rations", "m1").await.expect("lookup");
    assert!(lookup.hit.is_none());
    assert!(lookup.nearest.expect("nearest") >= 0.25);
}

#[tokio::test]
async fn storing_with_lookup_embedding_does_not_re_embed() {
    let (cache, embedder, _) = cache();
    let lookup = cache.lookup("fence repair", "m1").await.expect("lookup");
    cache
        .store_with_embedding("fence repair", "use wire", "m1", lookup.embedding)
        .await
        .expect("store");
    assert_eq!(embedder.embedded(), 1);
    assert!(cache.lookup("fence repair", "m1").await.expect("lookup").hit.is_some());
}

#[tokio::test]
async fn clear_empties_the_cache() {
    let (cache, _, _) = cache();
    cache.store("a", "b", "m1").await.expect("store");
    cache.clear().await.expect("clear");
    assert_eq!(cache.len().await.expect("len"), 0);
}

#[tokio::test]
async fn entries_record_model_query_and_write_time() {
    let (cache, embedder, store) = cache();
    cache.store("when to shear", "late spring", "m2").await.expect("store");
    let probe = embedder.embed("when to shear").expect("embed");
    let rows = store.query(&probe, 1, None).await.expect("query");
    let meta = &rows[0].metadata;
    assert_eq!(meta["model_name"], "m2");
    assert_eq!(meta["original_query"], "when to shear");
    assert!(meta["created_at"].parse::<i64>().expect("millis") > 0);
}
