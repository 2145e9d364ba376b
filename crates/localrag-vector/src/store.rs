use anyhow::{anyhow, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::sync::Arc;

use localrag_core::traits::VectorStore;
use localrag_core::types::{Meta, MetadataFilter, VectorMatch, VectorRecord};
use localrag_core::Error;

use crate::schema::{
    build_arrow_schema, is_valid_filter_key, vector_dim, DISTANCE_COL, DOCUMENT_COL, ID_COL, METADATA_COL,
};
use crate::table::ensure_table;

/// A LanceDB table of `VectorRecord`s compared by cosine distance.
///
/// Only keys listed in `filter_keys` can appear in a query filter; their values
/// are copied out of the metadata map into dedicated columns on write.
pub struct LanceVectorStore {
    table: Table,
    name: String,
    dim: i32,
    filter_keys: Vec<String>,
    schema: Arc<arrow_schema::Schema>,
}

impl LanceVectorStore {
    pub async fn open(conn: Connection, name: &str, dim: usize, filter_keys: &[&str]) -> Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("vector dim {dim} too large")))?;
        if dim <= 0 {
            return Err(Error::InvalidConfig("vector dim must be positive".into()).into());
        }
        let filter_keys: Vec<String> = filter_keys.iter().map(|k| (*k).to_string()).collect();
        if let Some(bad) = filter_keys.iter().find(|k| !is_valid_filter_key(k)) {
            return Err(Error::InvalidConfig(format!("'{bad}' cannot be used as a filter column")).into());
        }

        let schema = build_arrow_schema(dim, &filter_keys);
        ensure_table(&conn, name, schema.clone()).await?;
        let table = conn.open_table(name).execute().await?;

        let existing = table.schema().await?;
        match vector_dim(&existing) {
            Some(d) if d == dim => {}
            Some(d) => {
                return Err(Error::InvalidConfig(format!(
                    "table '{name}' stores {d}-dim vectors, embedder produces {dim}"
                ))
                .into())
            }
            None => return Err(Error::InvalidConfig(format!("table '{name}' has no vector column")).into()),
        }
        if let Some(missing) = filter_keys.iter().find(|k| existing.field_with_name(k).is_err()) {
            return Err(Error::InvalidConfig(format!("table '{name}' lacks filter column '{missing}'")).into());
        }

        tracing::debug!(table = name, dim, "opened vector store");
        Ok(Self { table, name: name.to_string(), dim, filter_keys, schema })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_dim(&self, len: usize) -> Result<()> {
        if len != self.dim as usize {
            return Err(Error::InvalidConfig(format!(
                "vector has {len} dims, table '{}' expects {}",
                self.name, self.dim
            ))
            .into());
        }
        Ok(())
    }

    fn to_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut metadata = Vec::with_capacity(records.len());
        let mut promoted: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(records.len()); self.filter_keys.len()];
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());

        for r in records {
            self.check_dim(r.vector.len())?;
            ids.push(r.id.clone());
            documents.push(r.document.clone());
            metadata.push(serde_json::to_string(&r.metadata)?);
            for (col, key) in promoted.iter_mut().zip(&self.filter_keys) {
                col.push(r.metadata.get(key).cloned());
            }
            vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(documents)),
            Arc::new(StringArray::from(metadata)),
        ];
        columns.extend(promoted.into_iter().map(|col| Arc::new(StringArray::from(col)) as ArrayRef));
        columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            vectors.into_iter(),
            self.dim,
        )));
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    fn predicate(&self, filter: &MetadataFilter) -> Result<Option<String>> {
        let mut clauses = Vec::with_capacity(filter.len());
        let mut keys: Vec<&String> = filter.keys().collect();
        keys.sort();
        for key in keys {
            if !self.filter_keys.contains(key) {
                return Err(Error::InvalidConfig(format!(
                    "table '{}' cannot filter on '{key}' (filterable: {})",
                    self.name,
                    self.filter_keys.join(", ")
                ))
                .into());
            }
            clauses.push(format!("{key} = '{}'", filter[key].replace('\'', "''")));
        }
        Ok((!clauses.is_empty()).then(|| clauses.join(" AND ")))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        // merge_insert rejects duplicate keys within one batch; last write wins.
        let mut latest: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            latest.insert(r.id.clone(), i);
        }
        let deduped: Vec<VectorRecord> = records
            .into_iter()
            .enumerate()
            .filter(|(i, r)| latest.get(&r.id) == Some(i))
            .map(|(_, r)| r)
            .collect();

        let batch = self.to_record_batch(&deduped)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), self.schema.clone()));
        let mut mi = self.table.merge_insert(&[ID_COL]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        tracing::debug!(table = %self.name, rows = deduped.len(), "upserted vectors");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<VectorMatch>> {
        self.check_dim(vector.len())?;
        let predicate = match filter {
            Some(f) => self.predicate(f)?,
            None => None,
        };
        if top_k == 0 || self.table.count_rows(None).await? == 0 {
            return Ok(Vec::new());
        }

        let mut query = self
            .table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(p) = predicate {
            query = query.only_if(p);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

        let mut out = Vec::new();
        for batch in &batches {
            let ids = string_col(batch, ID_COL)?;
            let docs = string_col(batch, DOCUMENT_COL)?;
            let metas = string_col(batch, METADATA_COL)?;
            let dists = batch
                .column_by_name(DISTANCE_COL)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("{DISTANCE_COL} column missing from search results"))?;
            for i in 0..batch.num_rows() {
                let metadata: Meta = serde_json::from_str(metas.value(i))?;
                out.push(VectorMatch {
                    id: ids.value(i).to_string(),
                    document: docs.value(i).to_string(),
                    metadata,
                    distance: dists.value(i),
                });
            }
        }
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        out.truncate(top_k);
        Ok(out)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.count_rows(None).await?)
    }

    async fn reset(&self) -> Result<()> {
        self.table.delete("true").await?;
        tracing::info!(table = %self.name, "vector table cleared");
        Ok(())
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .filter(|c| c.null_count() == 0)
        .ok_or_else(|| anyhow!("{name} column missing from search results"))
}
