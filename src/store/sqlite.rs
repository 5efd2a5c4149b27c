//! SQLite-backed [`VectorStore`].
//!
//! The index file is opened lazily and only created by the first write, so
//! an empty store leaves nothing on disk and [`index_file_presence`] stays a
//! meaningful signal. Reads against a store that was never written return
//! no candidates instead of creating the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, embed_all, embed_query, vec_to_blob, Embedder};
use crate::migrate;
use crate::models::{Chunk, ChunkMetadata};

use super::{
    index_file_presence, rank, Candidate, DocumentPresence, SearchMode, StoredVector, VectorStore,
};

pub struct SqliteVectorStore {
    index_file: PathBuf,
    collection: String,
    embedder: Arc<dyn Embedder>,
    embed_batch: usize,
    pool: OnceCell<SqlitePool>,
}

impl SqliteVectorStore {
    pub fn new(
        index_file: PathBuf,
        collection: String,
        embedder: Arc<dyn Embedder>,
        embed_batch: usize,
    ) -> Self {
        Self {
            index_file,
            collection,
            embedder,
            embed_batch,
            pool: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            config.store.index_file(),
            config.store.collection.clone(),
            embedder,
            config.embedding.batch_size,
        )
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    async fn open(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                tracing::debug!(path = %self.index_file.display(), "opening index");
                let pool = db::connect(&self.index_file).await?;
                migrate::run_migrations(&pool).await?;
                Ok::<_, anyhow::Error>(pool)
            })
            .await
    }

    /// Pool for reads, or `None` if no index has been written yet.
    async fn open_existing(&self) -> Result<Option<&SqlitePool>> {
        if let Some(pool) = self.pool.get() {
            return Ok(Some(pool));
        }
        if !index_file_presence(&self.index_file).exists {
            return Ok(None);
        }
        self.open().await.map(Some)
    }

    /// Exact number of stored chunks. Opens the database, unlike [`VectorStore::probe`].
    pub async fn count(&self) -> Result<usize> {
        let pool = match self.open_existing().await? {
            Some(pool) => pool,
            None => return Ok(0),
        };
        count_in(pool, &self.collection).await
    }
}

/// Exact chunk count read straight from an index file, without an embedder.
pub async fn count_indexed(index_file: &Path, collection: &str) -> Result<usize> {
    if !index_file_presence(index_file).exists {
        return Ok(0);
    }
    let pool = db::connect(index_file).await?;
    migrate::run_migrations(&pool).await?;
    let count = count_in(&pool, collection).await;
    pool.close().await;
    count
}

async fn count_in(pool: &SqlitePool, collection: &str) -> Result<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
        .bind(collection)
        .fetch_one(pool)
        .await?;
    Ok(count as usize)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_batch(&self, chunks: Vec<Chunk>, ids: &[String]) -> Result<()> {
        if chunks.len() != ids.len() {
            bail!("{} chunks but {} ids", chunks.len(), ids.len());
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_all(self.embedder.as_ref(), &texts, self.embed_batch).await?;

        let pool = self.open().await?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;
        for ((chunk, id), vector) in chunks.iter().zip(ids).zip(&vectors) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, content, source_file, category,
                                    metadata_json, embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&self.collection)
            .bind(&chunk.content)
            .bind(&chunk.metadata.source_file)
            .bind(chunk.metadata.category.as_str())
            .bind(metadata_json)
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<Vec<Candidate>> {
        let pool = match self.open_existing().await? {
            Some(pool) => pool,
            None => return Ok(Vec::new()),
        };
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM chunks WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(pool)
        .await?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = match serde_json::from_str(&metadata_json) {
                Ok(m) => m,
                Err(e) => {
                    let id: String = row.get("id");
                    tracing::warn!(id = %id, error = %e, "skipping chunk with unreadable metadata");
                    continue;
                }
            };
            let blob: Vec<u8> = row.get("embedding");
            stored.push(StoredVector {
                id: row.get("id"),
                chunk: Chunk {
                    content: row.get("content"),
                    metadata,
                },
                vector: blob_to_vec(&blob),
            });
        }

        Ok(rank(&query_vec, stored, k, mode))
    }

    async fn probe(&self) -> Result<DocumentPresence> {
        Ok(index_file_presence(&self.index_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Topic};

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("rust") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn chunk(content: &str, category: Category) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_file: "work_experience.md".to_string(),
                category,
                topics: [Topic::General].into_iter().collect(),
                headers: Default::default(),
            },
        }
    }

    fn store(dir: &Path) -> SqliteVectorStore {
        SqliteVectorStore::new(
            dir.join("index").join("index.sqlite"),
            "career".to_string(),
            Arc::new(AxisEmbedder),
            8,
        )
    }

    #[tokio::test]
    async fn reads_do_not_create_the_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        assert!(store
            .search("rust", 4, SearchMode::Similarity)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!store.probe().await.unwrap().exists);
        assert!(!store.index_file().exists());
    }

    #[tokio::test]
    async fn written_chunks_are_searchable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        store
            .add_batch(
                vec![
                    chunk("wrote rust services", Category::Work),
                    chunk("plays jazz piano", Category::Hobbies),
                ],
                &["a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();

        assert!(store.probe().await.unwrap().exists);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(count_indexed(store.index_file(), "career").await.unwrap(), 2);
        assert_eq!(count_indexed(store.index_file(), "other").await.unwrap(), 0);

        let hits = store.search("rust", 1, SearchMode::Similarity).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].metadata.category, Category::Work);
    }

    #[tokio::test]
    async fn mismatched_ids_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        let err = store
            .add_batch(vec![chunk("x", Category::General)], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 chunks but 0 ids"));
    }
}
