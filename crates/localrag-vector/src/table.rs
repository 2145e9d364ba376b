//! LanceDB connection and table housekeeping.
use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::{ArrowError, Schema};
use lancedb::{connect, Connection};
use std::sync::Arc;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

/// Create `name` with zero rows unless it already exists.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    let batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
    let iter = RecordBatchIterator::new(batches.into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await?;
    tracing::info!(table = name, "created vector table");
    Ok(())
}
