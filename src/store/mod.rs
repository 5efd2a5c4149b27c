//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the contract the ingestion pipeline and the
//! retrieval engine rely on. Stores own their [`Embedder`](crate::embedding::Embedder)
//! and embed text on write and on search, so callers only handle chunks and
//! query strings.
//!
//! Backends:
//! - [`SqliteVectorStore`]: one SQLite file under the configured store
//!   directory, brute-force cosine ranking.
//! - [`InMemoryVectorStore`]: same ranking over a `Vec` behind an `RwLock`.
//!
//! Both rank with [`rank`], which implements plain similarity ordering and
//! maximal-marginal-relevance re-ranking.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkMetadata};

/// How [`VectorStore::search`] orders its results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    Similarity,
    /// Maximal marginal relevance; `lambda` = 1.0 is pure relevance.
    Diversity { lambda: f32 },
}

impl SearchMode {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.mode.as_str() {
            "mmr" => SearchMode::Diversity {
                lambda: config.mmr_lambda,
            },
            _ => SearchMode::Similarity,
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Result of the cheap existence check.
///
/// `approx_count` is a placeholder (`1`) when it comes from the on-disk
/// index signal; it is not a document count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentPresence {
    pub exists: bool,
    pub approx_count: usize,
}

impl DocumentPresence {
    pub const ABSENT: DocumentPresence = DocumentPresence {
        exists: false,
        approx_count: 0,
    };
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and persist `chunks` under the given ids (same length, same order).
    async fn add_batch(&self, chunks: Vec<Chunk>, ids: &[String]) -> Result<()>;

    /// Top `k` chunks for `query`.
    async fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<Candidate>>;

    /// Fast, best-effort check for indexed documents.
    async fn probe(&self) -> Result<DocumentPresence>;
}

/// File-system presence signal: the index file exists and is non-empty.
///
/// Never opens the database, so it cannot block on locks.
pub fn index_file_presence(index_file: &Path) -> DocumentPresence {
    match std::fs::metadata(index_file) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => DocumentPresence {
            exists: true,
            approx_count: 1,
        },
        _ => DocumentPresence::ABSENT,
    }
}

/// A stored chunk together with its embedding, as fed to [`rank`].
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub id: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Rank `rows` against `query` and keep the best `k`.
pub fn rank(query: &[f32], rows: Vec<StoredVector>, k: usize, mode: SearchMode) -> Vec<Candidate> {
    let mut scored: Vec<(f32, StoredVector)> = rows
        .into_iter()
        .map(|row| (cosine_similarity(query, &row.vector), row))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let picked = match mode {
        SearchMode::Similarity => {
            scored.truncate(k);
            scored
        }
        SearchMode::Diversity { lambda } => {
            scored.truncate((k * 4).max(20));
            mmr_select(scored, k, lambda)
        }
    };

    picked
        .into_iter()
        .map(|(score, row)| Candidate {
            id: row.id,
            content: row.chunk.content,
            metadata: row.chunk.metadata,
            score,
        })
        .collect()
}

/// Greedy MMR over a relevance-sorted pool.
fn mmr_select(pool: Vec<(f32, StoredVector)>, k: usize, lambda: f32) -> Vec<(f32, StoredVector)> {
    let mut remaining = pool;
    let mut selected: Vec<(f32, StoredVector)> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, (relevance, row)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|(_, s)| cosine_similarity(&row.vector, &s.vector))
                .fold(0.0f32, f32::max);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Topic};

    fn row(id: &str, vector: Vec<f32>) -> StoredVector {
        StoredVector {
            id: id.to_string(),
            chunk: Chunk {
                content: id.to_string(),
                metadata: ChunkMetadata {
                    source_file: format!("{}.md", id),
                    category: Category::General,
                    topics: [Topic::General].into_iter().collect(),
                    headers: Default::default(),
                },
            },
            vector,
        }
    }

    #[test]
    fn similarity_orders_by_cosine() {
        let rows = vec![
            row("far", vec![0.0, 1.0]),
            row("near", vec![1.0, 0.1]),
            row("exact", vec![1.0, 0.0]),
        ];
        let out = rank(&[1.0, 0.0], rows, 2, SearchMode::Similarity);
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!(out[0].score >= out[1].score);
    }

    #[test]
    fn diversity_skips_near_duplicates() {
        let rows = vec![
            row("a", vec![1.0, 0.0]),
            row("a-dup", vec![0.999, 0.01]),
            row("b", vec![0.7, 0.7]),
        ];
        let out = rank(&[1.0, 0.0], rows, 2, SearchMode::Diversity { lambda: 0.3 });
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn diversity_with_lambda_one_is_similarity() {
        let rows = vec![
            row("a", vec![1.0, 0.0]),
            row("a-dup", vec![0.999, 0.01]),
            row("b", vec![0.7, 0.7]),
        ];
        let out = rank(&[1.0, 0.0], rows, 2, SearchMode::Diversity { lambda: 1.0 });
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a-dup"]);
    }

    #[test]
    fn presence_requires_non_empty_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("index.sqlite");
        assert_eq!(index_file_presence(&file), DocumentPresence::ABSENT);

        std::fs::write(&file, b"").unwrap();
        assert!(!index_file_presence(&file).exists);

        std::fs::write(&file, b"SQLite format 3").unwrap();
        assert_eq!(
            index_file_presence(&file),
            DocumentPresence {
                exists: true,
                approx_count: 1
            }
        );
    }

    #[test]
    fn mode_from_config() {
        let mut config = RetrievalConfig::default();
        assert_eq!(SearchMode::from_config(&config), SearchMode::Similarity);
        config.mode = "mmr".to_string();
        assert_eq!(
            SearchMode::from_config(&config),
            SearchMode::Diversity { lambda: 0.5 }
        );
    }
}
