//! LanceDB-backed implementation of the `VectorStore` port.
//!
//! One table per collection: the document knowledge base and the semantic
//! answer cache share the same row layout and differ only in which metadata
//! keys are promoted to filterable columns.
use anyhow::Result;

use localrag_core::config::DataSettings;
use localrag_core::types::{MODEL_NAME_KEY, SOURCE_KEY};

pub mod schema;
pub mod store;
pub mod table;

pub use store::LanceVectorStore;
pub use table::open_db;

/// Open the document and cache collections described by `data`.
pub async fn open_stores(data: &DataSettings, dim: usize) -> Result<(LanceVectorStore, LanceVectorStore)> {
    let conn = open_db(&data.vector_db_dir).await?;
    let documents = LanceVectorStore::open(conn.clone(), &data.documents_table, dim, &[SOURCE_KEY]).await?;
    let cache = LanceVectorStore::open(conn, &data.cache_table, dim, &[MODEL_NAME_KEY]).await?;
    Ok((documents, cache))
}
