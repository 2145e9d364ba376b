//! Local embedding models behind the `localrag_core::traits::Embedder` port.
//!
//! `BgeM3Embedder` runs XLM-RoBERTa (BGE-M3) weights through candle;
//! `HashEmbedder` is a deterministic bag-of-tokens stand-in for tests and
//! offline development, selected by `APP_USE_FAKE_EMBEDDINGS=1` or
//! `embedding.use_fake = true`.

use anyhow::Result;
use std::sync::Arc;

use localrag_core::config::EmbeddingSettings;
use localrag_core::traits::Embedder;

pub mod device;
pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hashing::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

fn fake_requested_by_env() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if settings.use_fake || fake_requested_by_env() {
        tracing::info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    Ok(Arc::new(BgeM3Embedder::load(settings)?))
}
