//! Vector-index contract (spec §6): `create_table`, `upsert`, `search`,
//! `count`, `drop`. The engine consumes an index rather than implementing
//! one (spec §1 Non-goals), so this is a thin trait plus an in-memory
//! reference implementation used by tests and small local runs.

use crate::error::VectorIndexError;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub id: String,
    pub payload: serde_json::Value,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn create_table(&self, table: &str, dimension: usize) -> Result<(), VectorIndexError>;
    async fn upsert(&self, table: &str, column: &str, rows: Vec<VectorRow>) -> Result<(), VectorIndexError>;
    async fn search(
        &self,
        table: &str,
        column: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRow>, VectorIndexError>;
    async fn count(&self, table: &str) -> Result<usize, VectorIndexError>;
    async fn drop_table(&self, table: &str) -> Result<(), VectorIndexError>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}

/// In-process, cosine-similarity index. Columns are independent vector
/// spaces within a table (spec §4.B: three columns for functions, two for
/// files), so rows are keyed by `(table, column)`.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    tables: dashmap::DashMap<String, dashmap::DashMap<String, Vec<VectorRow>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn create_table(&self, table: &str, _dimension: usize) -> Result<(), VectorIndexError> {
        self.tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, table: &str, column: &str, rows: Vec<VectorRow>) -> Result<(), VectorIndexError> {
        let columns = self.tables.entry(table.to_string()).or_default();
        let mut existing = columns.entry(column.to_string()).or_default();
        for row in rows {
            if let Some(slot) = existing.iter_mut().find(|r| r.id == row.id) {
                *slot = row;
            } else {
                existing.push(row);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        table: &str,
        column: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRow>, VectorIndexError> {
        let columns = self.tables.get(table).ok_or_else(|| VectorIndexError::TableNotFound(table.to_string()))?;
        let rows = match columns.get(column) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };
        let mut scored: Vec<ScoredRow> = rows
            .iter()
            .map(|r| ScoredRow { id: r.id.clone(), payload: r.payload.clone(), score: cosine_similarity(query_vector, &r.vector) })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, table: &str) -> Result<usize, VectorIndexError> {
        let columns = self.tables.get(table).ok_or_else(|| VectorIndexError::TableNotFound(table.to_string()))?;
        Ok(columns.iter().map(|c| c.value().len()).max().unwrap_or(0))
    }

    async fn drop_table(&self, table: &str) -> Result<(), VectorIndexError> {
        self.tables.remove(table);
        Ok(())
    }
}
