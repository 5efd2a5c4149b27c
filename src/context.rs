//! Application context and supervised initialization.
//!
//! [`AppContext`] is built once at startup and shared by reference with
//! every handler: configuration, readiness, rate limiter, worker pool, and
//! (once bring-up succeeds) the [`Core`] collaborators. Nothing is global.
//!
//! [`spawn_initialization`] runs bring-up as a background task so the
//! server can accept connections immediately. Every await point races a
//! [`CancellationToken`]; cancelling abandons the in-flight step.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::budget::TokenBudget;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::NotReady;
use crate::llm::{create_language_model, LanguageModel};
use crate::rate_limit::RateLimiter;
use crate::readiness::Readiness;
use crate::store::{SqliteVectorStore, VectorStore};
use crate::tokenizer::{create_tokenizer, Tokenizer};
use crate::workers::WorkerPool;

/// Shown when the engine came up without an index.
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents found in the index. \
     Run `scout ingest` to ingest documents first. \
     Chat will not work until documents are ingested.";

/// Collaborators that must exist before chat or ingestion can run.
pub struct Core {
    pub budget: TokenBudget,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LanguageModel>,
}

impl Core {
    /// Construct every collaborator from configuration.
    ///
    /// Blocking: a local embedding model may be downloaded here. Fails on
    /// missing credentials or unknown providers.
    pub fn bring_up(config: &Config) -> Result<Core> {
        let tokenizer: Arc<dyn Tokenizer> = Arc::from(create_tokenizer(&config.budget)?);
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::from_config(config, embedder.clone()));
        let llm: Arc<dyn LanguageModel> = Arc::from(create_language_model(&config.generation)?);

        tracing::info!(
            tokenizer = tokenizer.name(),
            embedding_model = embedder.model_name(),
            llm_model = llm.model_name(),
            "core components constructed"
        );

        Ok(Core {
            budget: TokenBudget::new(tokenizer, &config.budget),
            embedder,
            store,
            llm,
        })
    }
}

pub struct AppContext {
    pub config: Arc<Config>,
    pub readiness: Readiness,
    pub rate_limiter: RateLimiter,
    pub workers: WorkerPool,
    core: OnceLock<Arc<Core>>,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        Self {
            readiness: Readiness::new(),
            rate_limiter: RateLimiter::new(&config.rate_limit),
            workers: WorkerPool::new(&config.workers),
            config: Arc::new(config),
            core: OnceLock::new(),
        }
    }

    /// Install the core collaborators. The first install wins.
    pub fn install_core(&self, core: Core) -> Arc<Core> {
        self.core.get_or_init(|| Arc::new(core)).clone()
    }

    /// Core collaborators, whatever the readiness status.
    pub fn core(&self) -> Option<Arc<Core>> {
        self.core.get().cloned()
    }

    /// Core collaborators, only when the engine is fully ready.
    pub fn ready_core(&self) -> Result<Arc<Core>, NotReady> {
        if let Some(reason) = self.readiness.snapshot().not_ready_reason() {
            return Err(reason);
        }
        self.core().ok_or(NotReady::CoreUnavailable)
    }
}

/// Launch the initialization routine.
///
/// 1. Mark started.
/// 2. Run `bring_up` on the blocking pool with no timeout; an error marks
///    the engine failed and ends the task.
/// 3. Probe the store for existing documents, bounded by the probe timeout.
///    Documents present marks them ready; absent, errored, or timed out
///    marks the engine failed with a hint to run ingestion.
pub fn spawn_initialization<F>(
    ctx: Arc<AppContext>,
    bring_up: F,
    token: CancellationToken,
) -> JoinHandle<()>
where
    F: FnOnce() -> Result<Core> + Send + 'static,
{
    tokio::spawn(async move {
        ctx.readiness.start();

        tracing::info!("bringing up core components");
        let joined = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("initialization cancelled during core bring-up");
                return;
            }
            joined = tokio::task::spawn_blocking(bring_up) => joined,
        };
        let core = match joined {
            Ok(Ok(core)) => core,
            Ok(Err(e)) => {
                ctx.readiness
                    .mark_failed(format!("Core initialization failed: {:#}", e));
                return;
            }
            Err(e) => {
                ctx.readiness
                    .mark_failed(format!("Core initialization crashed: {}", e));
                return;
            }
        };
        let core = ctx.install_core(core);
        ctx.readiness.mark_core_ready();

        tracing::info!("checking for indexed documents");
        let store = core.store.clone();
        let probe = ctx.workers.run(
            "document probe",
            ctx.config.retrieval.probe_timeout(),
            async move { store.probe().await },
        );
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("initialization cancelled during document probe");
                return;
            }
            outcome = probe => outcome,
        };

        match outcome {
            Ok(Ok(presence)) if presence.exists => {
                tracing::info!(approx_count = presence.approx_count, "indexed documents found");
                ctx.readiness.mark_documents_ready();
            }
            Ok(Ok(_)) => ctx.readiness.mark_failed(NO_DOCUMENTS_MESSAGE),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "document probe failed");
                ctx.readiness.mark_failed(NO_DOCUMENTS_MESSAGE);
            }
            Err(timed_out) => {
                tracing::warn!(after = ?timed_out.after, "document probe timed out");
                ctx.readiness.mark_failed(NO_DOCUMENTS_MESSAGE);
            }
        }
    })
}
