//! Similarity-keyed answer cache over a dedicated vector collection.
//!
//! Entries are partitioned by model through the `model_name` metadata filter,
//! and each entry's id is derived from `(model, query)` so re-storing the same
//! question for the same model overwrites in place.
use chrono::Utc;
use std::sync::Arc;

use localrag_core::traits::{Embedder, VectorStore};
use localrag_core::types::{Embedding, Meta, MetadataFilter, VectorRecord, MODEL_NAME_KEY};
use localrag_core::Result;

pub const ORIGINAL_QUERY_KEY: &str = "original_query";
pub const QUERY_HASH_KEY: &str = "query_hash";
/// Unix milliseconds at which the entry was written.
pub const CREATED_AT_KEY: &str = "created_at";

#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnswer {
    pub response: String,
    pub original_query: String,
    pub distance: f32,
}

/// Result of a lookup. `embedding` is always populated so the caller can reuse
/// it for retrieval on a miss.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub hit: Option<CachedAnswer>,
    pub embedding: Embedding,
    /// Distance to the nearest entry for the model, if any exists.
    pub nearest: Option<f32>,
}

pub struct SemanticCache {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    threshold: f32,
}

impl SemanticCache {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, threshold: f32) -> Self {
        Self { embedder, store, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn lookup(&self, query: &str, model: &str) -> Result<CacheLookup> {
        let embedding = self.embedder.embed(query)?;
        let filter = MetadataFilter::from([(MODEL_NAME_KEY.to_string(), model.to_string())]);
        let nearest = self.store.query(&embedding, 1, Some(&filter)).await?.into_iter().next();

        let Some(best) = nearest else {
            tracing::debug!(model, "cache empty for model");
            return Ok(CacheLookup { hit: None, embedding, nearest: None });
        };
        tracing::info!(model, distance = best.distance, threshold = self.threshold, "cache check");

        let distance = best.distance;
        let hit = (distance < self.threshold).then(|| {
            tracing::info!(model, distance, "cache hit");
            CachedAnswer {
                original_query: best.metadata.get(ORIGINAL_QUERY_KEY).cloned().unwrap_or_default(),
                response: best.document,
                distance,
            }
        });
        Ok(CacheLookup { hit, embedding, nearest: Some(distance) })
    }

    pub async fn store(&self, query: &str, response: &str, model: &str) -> Result<()> {
        let embedding = self.embedder.embed(query)?;
        self.store_with_embedding(query, response, model, embedding).await
    }

    /// Store using the embedding a preceding [`lookup`](Self::lookup) already computed.
    pub async fn store_with_embedding(
        &self,
        query: &str,
        response: &str,
        model: &str,
        embedding: Embedding,
    ) -> Result<()> {
        let id = entry_id(model, query);
        let metadata = Meta::from([
            (MODEL_NAME_KEY.to_string(), model.to_string()),
            (ORIGINAL_QUERY_KEY.to_string(), query.to_string()),
            (QUERY_HASH_KEY.to_string(), id.clone()),
            (CREATED_AT_KEY.to_string(), Utc::now().timestamp_millis().to_string()),
        ]);
        self.store
            .upsert(vec![VectorRecord { id, vector: embedding, document: response.to_string(), metadata }])
            .await?;
        tracing::info!(model, "stored response in cache");
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.count().await?)
    }

    pub async fn clear(&self) -> Result<()> {
        Ok(self.store.reset().await?)
    }
}

/// Stable id for a `(model, query)` pair. The unit separator keeps
/// `("ab", "c")` and `("a", "bc")` apart.
pub fn entry_id(model: &str, query: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(query.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_separates_models_and_boundaries() {
        assert_eq!(entry_id("m", "q"), entry_id("m", "q"));
        assert_ne!(entry_id("a", "q"), entry_id("b", "q"));
        assert_ne!(entry_id("ab", "c"), entry_id("a", "bc"));
    }
}
