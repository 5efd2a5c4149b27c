//! Corpus loading, one loader per source format.
//!
//! Each format is loaded independently and time-bounded on the worker pool.
//! A loader that errors or runs past its bound contributes zero documents;
//! the [`LoadedCorpus`] reducer records the failure, logs it, and moves on
//! so one bad format never aborts the others.
//!
//! Files are discovered with `walkdir` and matched against the format's glob
//! relative to the corpus root. A single unreadable file or directory entry
//! is skipped with a warning rather than failing its whole format.

use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

use crate::extract::extract_file;
use crate::models::{SourceDocument, SourceFormat};
use crate::workers::WorkerPool;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("corpus root not found: {}", .0.display())]
    RootMissing(PathBuf),
    #[error("invalid glob '{glob}': {reason}")]
    Glob { glob: String, reason: String },
    #[error("loading timed out after {0:?}")]
    TimedOut(Duration),
    #[error("loader crashed: {0}")]
    Worker(String),
}

/// Outcome of one per-format loading phase.
#[derive(Debug)]
pub struct FormatLoad {
    pub format: SourceFormat,
    pub result: Result<Vec<SourceDocument>, LoadError>,
}

/// Documents gathered across all formats plus the formats that failed.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<(SourceFormat, LoadError)>,
}

impl LoadedCorpus {
    /// Fold one format's outcome into the corpus; failures are logged and kept.
    pub fn absorb(mut self, load: FormatLoad) -> Self {
        match load.result {
            Ok(docs) => {
                tracing::info!(format = %load.format, documents = docs.len(), "loaded documents");
                self.documents.extend(docs);
            }
            Err(e) => {
                tracing::warn!(format = %load.format, error = %e, "skipping format");
                self.failures.push((load.format, e));
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn count(&self, format: SourceFormat) -> usize {
        self.documents.iter().filter(|d| d.format == format).count()
    }
}

/// Load every file of one format under `root`, sorted by relative path.
pub fn load_format(root: &Path, format: SourceFormat) -> Result<Vec<SourceDocument>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::RootMissing(root.to_path_buf()));
    }
    let matcher = build_matcher(format.glob())?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(format = %format, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative_label(relative);
        if !matcher.is_match(&rel_str) {
            continue;
        }

        match extract_file(path, format) {
            Ok(text) => docs.push(SourceDocument {
                source_file: rel_str,
                format,
                text,
            }),
            Err(e) => tracing::warn!(file = %rel_str, error = %e, "skipping unreadable file"),
        }
    }

    docs.sort_by(|a, b| a.source_file.cmp(&b.source_file));
    Ok(docs)
}

/// Signature shared by per-format loaders.
pub type FormatLoader = fn(&Path, SourceFormat) -> Result<Vec<SourceDocument>, LoadError>;

/// Load all formats, each bounded by `timeout` on the worker pool.
pub async fn load_corpus(root: &Path, workers: &WorkerPool, timeout: Duration) -> LoadedCorpus {
    load_corpus_with(root, workers, timeout, load_format).await
}

/// [`load_corpus`] with a caller-supplied loader.
pub async fn load_corpus_with(
    root: &Path,
    workers: &WorkerPool,
    timeout: Duration,
    loader: FormatLoader,
) -> LoadedCorpus {
    let mut corpus = LoadedCorpus::default();
    for format in SourceFormat::ALL {
        let dir = root.to_path_buf();
        let label = format!("load {}", format);
        let result = match workers
            .run_blocking(&label, timeout, move || Ok(loader(&dir, format)))
            .await
        {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) => Err(LoadError::Worker(e.to_string())),
            Err(timed_out) => Err(LoadError::TimedOut(timed_out.after)),
        };
        corpus = corpus.absorb(FormatLoad { format, result });
    }
    corpus
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher, LoadError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| LoadError::Glob {
            glob: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn relative_label(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
