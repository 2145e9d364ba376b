use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{Embedding, GenerateRequest, MetadataFilter, VectorMatch, VectorRecord};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>>;

    fn embed(&self, text: &str) -> anyhow::Result<Embedding> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// A single named collection of vectors compared by cosine distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite rows by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> anyhow::Result<()>;
    /// Nearest rows in ascending distance, at most `top_k`, optionally restricted by metadata.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<VectorMatch>>;
    async fn count(&self) -> anyhow::Result<usize>;
    async fn reset(&self) -> anyhow::Result<()>;
}

pub type TextStream = BoxStream<'static, anyhow::Result<String>>;

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<String>;
    /// Text deltas in arrival order.
    async fn generate_stream(&self, request: &GenerateRequest) -> anyhow::Result<TextStream>;
    /// Never fails: an unreachable backend yields the configured fallback roster.
    async fn list_models(&self) -> Vec<String>;
}
