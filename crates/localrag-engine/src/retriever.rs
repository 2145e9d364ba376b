use std::sync::Arc;

use localrag_core::traits::{Embedder, VectorStore};
use localrag_core::types::{Meta, RetrievalResult};
use localrag_core::Result;

/// Top-k search over the knowledge-base collection.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self { embedder, store, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>> {
        let matches = self.store.query(embedding, top_k, None).await?;
        Ok(matches.into_iter().map(RetrievalResult::from).collect())
    }

    /// Embed `text` and search with the configured `top_k`.
    pub async fn search_text(&self, text: &str) -> Result<Vec<RetrievalResult>> {
        let embedding = self.embedder.embed(text)?;
        self.search(&embedding, self.top_k).await
    }
}

/// Chunks joined the way every prompt expects them.
pub fn format_context(results: &[RetrievalResult]) -> String {
    results.iter().map(|r| format!("---\n{}\n", r.text)).collect()
}

pub fn sources(results: &[RetrievalResult]) -> Vec<Meta> {
    results.iter().map(|r| r.metadata.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_separates_chunks() {
        let r = |t: &str| RetrievalResult { text: t.into(), metadata: Meta::new(), distance: 0.0 };
        assert_eq!(format_context(&[r("a"), r("b")]), "---\na\n---\nb\n");
        assert_eq!(format_context(&[]), "");
    }
}
