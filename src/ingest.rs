//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: load every format → split → tag → write to
//! the vector store in fixed-size batches. Runs under one overall timeout.
//! Writes are not transactional; batches that landed before a timeout or
//! a failed batch stay in the store, and every run mints fresh chunk ids so
//! re-running only adds.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::chunk::{split_document, RecursiveSplitter};
use crate::config::Config;
use crate::error::IngestError;
use crate::loader::load_corpus;
use crate::models::{Chunk, SourceFormat};
use crate::store::VectorStore;
use crate::tagger::tag;
use crate::workers::WorkerPool;

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub batches: usize,
    /// Formats whose loading phase failed or timed out.
    pub failed_formats: Vec<SourceFormat>,
}

pub async fn ingest(
    store: Arc<dyn VectorStore>,
    workers: &WorkerPool,
    config: &Config,
    root: &Path,
) -> Result<IngestReport, IngestError> {
    let limit = config.ingest.timeout();
    match tokio::time::timeout(limit, run_ingest(store, workers, config, root)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(?limit, "ingestion timed out; batches already written are kept");
            Err(IngestError::IngestionTimeout(limit))
        }
    }
}

async fn run_ingest(
    store: Arc<dyn VectorStore>,
    workers: &WorkerPool,
    config: &Config,
    root: &Path,
) -> Result<IngestReport, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::CorpusNotFound(root.to_path_buf()));
    }

    let corpus = load_corpus(root, workers, config.ingest.load_timeout()).await;
    let failed_formats: Vec<SourceFormat> = corpus.failures.iter().map(|(f, _)| *f).collect();
    if corpus.is_empty() {
        return Err(IngestError::NoDocumentsFound);
    }
    let documents = corpus.documents.len();

    let splitter = RecursiveSplitter::from_config(&config.chunking);
    let mut chunks: Vec<Chunk> = Vec::new();
    for doc in &corpus.documents {
        let splits = split_document(doc, &splitter);
        tracing::debug!(source = %doc.source_file, chunks = splits.len(), "split document");
        chunks.extend(tag(splits, &doc.source_file));
    }
    tracing::info!(documents, chunks = chunks.len(), "documents split and tagged");

    let batch_size = config.ingest.batch_size.max(1);
    let total = chunks.len().div_ceil(batch_size);
    let pause = config.ingest.batch_pause();
    let chunk_count = chunks.len();

    let mut remaining = chunks.into_iter();
    for batch in 1..=total {
        let batch_chunks: Vec<Chunk> = remaining.by_ref().take(batch_size).collect();
        let ids: Vec<String> = batch_chunks
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        let len = batch_chunks.len();

        store
            .add_batch(batch_chunks, &ids)
            .await
            .map_err(|e| IngestError::BatchWrite {
                batch,
                total,
                reason: format!("{:#}", e),
            })?;
        tracing::info!(batch, total, chunks = len, "wrote batch");

        if batch < total && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    Ok(IngestReport {
        documents,
        chunks: chunk_count,
        batches: total,
        failed_formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::store::{Candidate, DocumentPresence, InMemoryVectorStore, SearchMode};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Takes a while per batch and counts the batches that landed.
    struct SlowStore {
        written: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for SlowStore {
        async fn add_batch(&self, _chunks: Vec<Chunk>, _ids: &[String]) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(400)).await;
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn search(&self, _query: &str, _k: usize, _mode: SearchMode) -> Result<Vec<Candidate>> {
            Ok(Vec::new())
        }
        async fn probe(&self) -> Result<DocumentPresence> {
            Ok(DocumentPresence {
                exists: self.written.load(Ordering::SeqCst) > 0,
                approx_count: 1,
            })
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.ingest.batch_pause_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_missing_root_is_reported() {
        let store = Arc::new(InMemoryVectorStore::new(Arc::new(ConstEmbedder)));
        let err = ingest(
            store.clone(),
            &WorkerPool::with_capacity(2),
            &fast_config(),
            Path::new("/nonexistent/corpus"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::CorpusNotFound(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_batches_are_fixed_size() {
        let tmp = tempfile::tempdir().unwrap();
        let body: String = (0..30)
            .map(|i| format!("Paragraph {} about shipping reliable systems.\n\n", i))
            .collect();
        std::fs::write(tmp.path().join("projects.txt"), body).unwrap();

        let mut config = fast_config();
        config.chunking.chunk_size = 60;
        config.chunking.chunk_overlap = 0;
        config.ingest.batch_size = 7;

        let store = Arc::new(InMemoryVectorStore::new(Arc::new(ConstEmbedder)));
        let report = ingest(store.clone(), &WorkerPool::with_capacity(2), &config, tmp.path())
            .await
            .unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 30);
        assert_eq!(report.batches, 5);
        assert_eq!(store.write_count(), 5);
        assert_eq!(store.len(), 30);
    }

    #[tokio::test]
    async fn test_timeout_keeps_written_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let body: String = (0..30)
            .map(|i| format!("Paragraph {} about shipping reliable systems.\n\n", i))
            .collect();
        std::fs::write(tmp.path().join("projects.txt"), body).unwrap();

        let mut config = fast_config();
        config.chunking.chunk_size = 60;
        config.chunking.chunk_overlap = 0;
        config.ingest.batch_size = 7;
        config.ingest.timeout_secs = 1;

        let store = Arc::new(SlowStore {
            written: AtomicUsize::new(0),
        });
        let err = ingest(store.clone(), &WorkerPool::with_capacity(2), &config, tmp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::IngestionTimeout(d) if d == Duration::from_secs(1)));
        let written = store.written.load(Ordering::SeqCst);
        assert!(written > 0 && written < 5, "{} batches written", written);
        assert!(store.probe().await.unwrap().exists);
    }
}
