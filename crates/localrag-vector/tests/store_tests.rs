use std::collections::HashMap;

use localrag_core::traits::VectorStore;
use localrag_core::types::{Meta, VectorRecord};
use localrag_vector::{open_db, LanceVectorStore};
use tempfile::TempDir;

const DIM: usize = 8;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

fn record(id: &str, vector: Vec<f32>, source: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector,
        document: format!("text of {id}"),
        metadata: Meta::from([("source".to_string(), source.to_string())]),
    }
}

async fn store(tmp: &TempDir) -> LanceVectorStore {
    let conn = open_db(tmp.path().to_str().expect("utf8 path")).await.expect("connect");
    LanceVectorStore::open(conn, "docs", DIM, &["source"]).await.expect("open")
}

#[tokio::test]
async fn empty_table_returns_no_matches() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    assert_eq!(s.count().await.expect("count"), 0);
    assert!(s.query(&unit(0), 3, None).await.expect("query").is_empty());
}

#[tokio::test]
async fn query_orders_by_cosine_distance() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    let mut near = unit(0);
    near[1] = 0.2;
    s.upsert(vec![record("far", unit(3), "a"), record("exact", unit(0), "a"), record("near", near, "b")])
        .await
        .expect("upsert");

    let hits = s.query(&unit(0), 2, None).await.expect("query");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["exact", "near"]);
    assert!(hits[0].distance < 1e-4);
    assert!(hits[0].distance <= hits[1].distance);
    assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("a"));
    assert_eq!(hits[0].document, "text of exact");
}

#[tokio::test]
async fn upsert_overwrites_by_id() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    s.upsert(vec![record("x", unit(0), "old")]).await.expect("first");
    s.upsert(vec![record("x", unit(1), "new")]).await.expect("second");
    assert_eq!(s.count().await.expect("count"), 1);

    let hits = s.query(&unit(1), 1, None).await.expect("query");
    assert_eq!(hits[0].id, "x");
    assert_eq!(hits[0].metadata["source"], "new");
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_keep_the_last() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    s.upsert(vec![record("x", unit(0), "first"), record("x", unit(2), "second")]).await.expect("upsert");
    assert_eq!(s.count().await.expect("count"), 1);
    let hits = s.query(&unit(2), 1, None).await.expect("query");
    assert_eq!(hits[0].metadata["source"], "second");
}

#[tokio::test]
async fn filter_restricts_to_matching_rows() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    s.upsert(vec![record("a1", unit(0), "alpha"), record("b1", unit(1), "it's beta")]).await.expect("upsert");

    let filter = HashMap::from([("source".to_string(), "it's beta".to_string())]);
    let hits = s.query(&unit(0), 5, Some(&filter)).await.expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "b1");
}

#[tokio::test]
async fn filter_on_unpromoted_key_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    s.upsert(vec![record("a1", unit(0), "alpha")]).await.expect("upsert");
    let filter = HashMap::from([("chunk_index".to_string(), "0".to_string())]);
    assert!(s.query(&unit(0), 5, Some(&filter)).await.is_err());
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    assert!(s.upsert(vec![record("short", vec![1.0; DIM - 1], "a")]).await.is_err());
    assert!(s.query(&[1.0; 3], 1, None).await.is_err());
}

#[tokio::test]
async fn reopening_with_another_dimension_fails() {
    let tmp = TempDir::new().expect("tmp");
    drop(store(&tmp).await);
    let conn = open_db(tmp.path().to_str().expect("utf8 path")).await.expect("connect");
    assert!(LanceVectorStore::open(conn, "docs", DIM * 2, &["source"]).await.is_err());
}

#[tokio::test]
async fn reset_clears_rows_and_table_stays_usable() {
    let tmp = TempDir::new().expect("tmp");
    let s = store(&tmp).await;
    s.upsert(vec![record("a", unit(0), "s"), record("b", unit(1), "s")]).await.expect("upsert");
    s.reset().await.expect("reset");
    assert_eq!(s.count().await.expect("count"), 0);
    s.upsert(vec![record("c", unit(2), "s")]).await.expect("upsert after reset");
    assert_eq!(s.count().await.expect("count"), 1);
}
