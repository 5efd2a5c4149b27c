//! In-memory [`VectorStore`] for tests and dry runs.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`; search is brute-force
//! cosine similarity through [`rank`].

use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{embed_all, embed_query, Embedder};
use crate::models::Chunk;

use super::{rank, Candidate, DocumentPresence, SearchMode, StoredVector, VectorStore};

pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    rows: RwLock<Vec<StoredVector>>,
    writes: RwLock<usize>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            rows: RwLock::new(Vec::new()),
            writes: RwLock::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `add_batch` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.read().map(|w| *w).unwrap_or(0)
    }

    /// Snapshot of the stored chunks in insertion order.
    pub fn chunks(&self) -> Vec<(String, Chunk)> {
        self.rows
            .read()
            .map(|rows| rows.iter().map(|r| (r.id.clone(), r.chunk.clone())).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_batch(&self, chunks: Vec<Chunk>, ids: &[String]) -> Result<()> {
        if chunks.len() != ids.len() {
            bail!("{} chunks but {} ids", chunks.len(), ids.len());
        }
        if let Ok(mut writes) = self.writes.write() {
            *writes += 1;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), &texts, texts.len()).await?;

        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        for ((chunk, id), vector) in chunks.into_iter().zip(ids).zip(vectors) {
            rows.push(StoredVector {
                id: id.clone(),
                chunk,
                vector,
            });
        }
        Ok(())
    }

    async fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<Candidate>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let rows = self
            .rows
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?
            .clone();
        Ok(rank(&query_vec, rows, k, mode))
    }

    async fn probe(&self) -> Result<DocumentPresence> {
        let count = self.len();
        Ok(DocumentPresence {
            exists: count > 0,
            approx_count: count,
        })
    }
}
