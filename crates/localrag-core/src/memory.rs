//! Brute-force in-process vector store.
//!
//! Stands in for LanceDB where nothing should touch disk. Rows keep insertion
//! order; an upsert with an existing id replaces the row in place.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::traits::VectorStore;
use crate::types::{MetadataFilter, VectorMatch, VectorRecord};

#[derive(Default)]
pub struct InMemoryVectorStore {
    rows: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `1 - cos(a, b)`. Degenerate inputs (length mismatch, zero norm) are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 2.0;
    }
    (1.0 - dot / denom) as f32
}

fn matches(record: &VectorRecord, filter: Option<&MetadataFilter>) -> bool {
    filter.map_or(true, |f| f.iter().all(|(k, v)| record.metadata.get(k) == Some(v)))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> anyhow::Result<()> {
        let mut rows = self.rows.write().map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        for record in records {
            match rows.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => rows.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<VectorMatch>> {
        let rows = self.rows.read().map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?;
        let mut hits: Vec<VectorMatch> = rows
            .iter()
            .filter(|r| matches(r, filter))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(vector, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.rows.read().map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?.len())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.rows.write().map_err(|_| anyhow::anyhow!("vector store lock poisoned"))?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_direction_is_zero_distance() {
        assert!(cosine_distance(&[1.0, 2.0], &[2.0, 4.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
    }
}
