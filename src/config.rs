//! TOML configuration.
//!
//! Every section is optional and falls back to the constants the service
//! was tuned with; [`load_config`] parses the file and rejects values that
//! would break the pipeline (zero chunk sizes, inverted budgets, unknown
//! providers). Secrets are never read from the file: providers pull their
//! API keys from the environment during core bring-up.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::QueryIntent;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the on-disk index.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

impl StoreConfig {
    /// The index file whose presence and size back the fast existence probe.
    pub fn index_file(&self) -> PathBuf {
        self.path.join("index.sqlite")
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./index")
}
fn default_collection() -> String {
    "career".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    175
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates requested from the store before category filtering.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// Candidates kept for the knowledge block.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
    /// Below this many filtered candidates the filter is discarded.
    #[serde(default = "default_min_filtered")]
    pub min_filtered: usize,
    /// `similarity` or `mmr`.
    #[serde(default = "default_search_mode")]
    pub mode: String,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_k: default_fetch_k(),
            final_k: default_final_k(),
            min_filtered: default_min_filtered(),
            mode: default_search_mode(),
            mmr_lambda: default_mmr_lambda(),
            timeout_secs: default_retrieval_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_fetch_k() -> usize {
    10
}
fn default_final_k() -> usize {
    4
}
fn default_min_filtered() -> usize {
    4
}
fn default_search_mode() -> String {
    "similarity".to_string()
}
fn default_mmr_lambda() -> f32 {
    0.5
}
fn default_retrieval_timeout() -> u64 {
    20
}
fn default_probe_timeout() -> u64 {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BudgetConfig {
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    /// `lexical` or `huggingface`.
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    #[serde(default)]
    pub tokenizer_file: Option<PathBuf>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: default_max_input_tokens(),
            max_context_tokens: default_max_context_tokens(),
            max_output_tokens: default_max_output_tokens(),
            tokenizer: default_tokenizer(),
            tokenizer_file: None,
        }
    }
}

fn default_max_input_tokens() -> usize {
    1500
}
fn default_max_context_tokens() -> usize {
    3000
}
fn default_max_output_tokens() -> usize {
    500
}
fn default_tokenizer() -> String {
    "lexical".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Override for OpenAI-compatible servers.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: TemperatureTable,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: None,
            top_p: default_top_p(),
            frequency_penalty: default_frequency_penalty(),
            timeout_secs: default_generation_timeout(),
            temperature: TemperatureTable::default(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_top_p() -> f32 {
    0.9
}
fn default_frequency_penalty() -> f32 {
    0.3
}
fn default_generation_timeout() -> u64 {
    60
}

/// Sampling temperature per query intent.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TemperatureTable {
    #[serde(default = "default_factual_temperature")]
    pub factual: f32,
    #[serde(default = "default_conversational_temperature")]
    pub conversational: f32,
    #[serde(default = "default_creative_temperature")]
    pub creative: f32,
}

impl Default for TemperatureTable {
    fn default() -> Self {
        Self {
            factual: default_factual_temperature(),
            conversational: default_conversational_temperature(),
            creative: default_creative_temperature(),
        }
    }
}

impl TemperatureTable {
    pub fn for_intent(&self, intent: QueryIntent) -> f32 {
        match intent {
            QueryIntent::Factual => self.factual,
            QueryIntent::Conversational => self.conversational,
            QueryIntent::Creative => self.creative,
        }
    }
}

fn default_factual_temperature() -> f32 {
    0.0
}
fn default_conversational_temperature() -> f32 {
    0.3
}
fn default_creative_temperature() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    /// Chunks written to the store per request.
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Upper bound for each per-format loading phase.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
    /// Upper bound for the whole ingestion run.
    #[serde(default = "default_ingest_timeout")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            load_timeout_secs: default_load_timeout(),
            timeout_secs: default_ingest_timeout(),
        }
    }
}

impl IngestConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_ingest_batch_size() -> usize {
    40
}
fn default_batch_pause_ms() -> u64 {
    200
}
fn default_load_timeout() -> u64 {
    60
}
fn default_ingest_timeout() -> u64 {
    900
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub max_requests: usize,
    pub window_minutes: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_block_minutes")]
    pub block_minutes: i64,
    #[serde(default = "default_chat_rule")]
    pub chat: RateRule,
    #[serde(default = "default_ingest_rule")]
    pub ingest: RateRule,
    /// Identifiers idle for longer than this are dropped from memory.
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_minutes: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            block_minutes: default_block_minutes(),
            chat: default_chat_rule(),
            ingest: default_ingest_rule(),
            idle_eviction_minutes: default_idle_eviction(),
        }
    }
}

fn default_block_minutes() -> i64 {
    5
}
fn default_chat_rule() -> RateRule {
    RateRule {
        max_requests: 20,
        window_minutes: 1,
    }
}
fn default_ingest_rule() -> RateRule {
    RateRule {
        max_requests: 5,
        window_minutes: 5,
    }
}
fn default_idle_eviction() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    /// Concurrent collaborator calls allowed in flight.
    #[serde(default = "default_max_blocking")]
    pub max_blocking: usize,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_blocking: default_max_blocking(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_max_blocking() -> usize {
    8
}
fn default_shutdown_grace() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    /// Whose career the assistant represents.
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
        }
    }
}

fn default_subject() -> String {
    "the candidate".to_string()
}

/// Snapshot of the tuning constants served by the configuration read surface.
#[derive(Debug, Clone, Serialize)]
pub struct Introspection {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub budget: BudgetConfig,
    pub temperature: TemperatureTable,
    pub llm_model: String,
    pub embedding_model: String,
}

impl Config {
    pub fn introspect(&self) -> Introspection {
        Introspection {
            chunking: self.chunking.clone(),
            retrieval: self.retrieval.clone(),
            budget: self.budget.clone(),
            temperature: self.generation.temperature.clone(),
            llm_model: self.generation.model.clone(),
            embedding_model: self.embedding.model.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    let retrieval = &config.retrieval;
    if retrieval.final_k < 1 {
        bail!("retrieval.final_k must be >= 1");
    }
    if retrieval.fetch_k < retrieval.final_k {
        bail!("retrieval.fetch_k must be >= retrieval.final_k");
    }
    if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
        bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
    }
    match retrieval.mode.as_str() {
        "similarity" | "mmr" => {}
        other => bail!(
            "Unknown retrieval mode: '{}'. Must be similarity or mmr.",
            other
        ),
    }

    // Budgets
    let budget = &config.budget;
    if budget.max_input_tokens == 0 || budget.max_context_tokens == 0 || budget.max_output_tokens == 0
    {
        bail!("budget token limits must all be > 0");
    }
    match budget.tokenizer.as_str() {
        "lexical" => {}
        "huggingface" => {
            if budget.tokenizer_file.is_none() {
                bail!("budget.tokenizer_file must be set when tokenizer is 'huggingface'");
            }
        }
        other => bail!(
            "Unknown tokenizer: '{}'. Must be lexical or huggingface.",
            other
        ),
    }

    // Generation
    let temps = &config.generation.temperature;
    for (name, t) in [
        ("factual", temps.factual),
        ("conversational", temps.conversational),
        ("creative", temps.creative),
    ] {
        if !(0.0..=2.0).contains(&t) {
            bail!("generation.temperature.{} must be in [0.0, 2.0]", name);
        }
    }
    if !(0.0..=1.0).contains(&config.generation.top_p) {
        bail!("generation.top_p must be in [0.0, 1.0]");
    }
    match config.generation.provider.as_str() {
        "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Ingestion
    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be > 0");
    }

    // Rate limits
    let rl = &config.rate_limit;
    for (name, rule) in [("chat", rl.chat), ("ingest", rl.ingest)] {
        if rule.max_requests == 0 || rule.window_minutes <= 0 {
            bail!(
                "rate_limit.{} needs max_requests > 0 and window_minutes > 0",
                name
            );
        }
    }
    if rl.block_minutes <= 0 {
        bail!("rate_limit.block_minutes must be > 0");
    }
    let longest_window = rl.chat.window_minutes.max(rl.ingest.window_minutes);
    if rl.idle_eviction_minutes < longest_window {
        bail!(
            "rate_limit.idle_eviction_minutes ({}) must be >= the longest window_minutes ({})",
            rl.idle_eviction_minutes,
            longest_window
        );
    }

    if config.workers.max_blocking == 0 {
        bail!("workers.max_blocking must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_tuned_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 175);
        assert_eq!(config.retrieval.fetch_k, 10);
        assert_eq!(config.retrieval.final_k, 4);
        assert_eq!(config.budget.max_input_tokens, 1500);
        assert_eq!(config.budget.max_context_tokens, 3000);
        assert_eq!(config.budget.max_output_tokens, 500);
        assert_eq!(config.ingest.batch_size, 40);
        assert_eq!(config.rate_limit.chat.max_requests, 20);
        assert_eq!(config.rate_limit.ingest.window_minutes, 5);
        assert_eq!(config.generation.temperature.factual, 0.0);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 400

            [rate_limit.chat]
            max_requests = 3
            window_minutes = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 175);
        assert_eq!(config.rate_limit.chat.max_requests, 3);
        assert_eq!(config.rate_limit.ingest.max_requests, 5);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let config: Config = toml::from_str("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_mode_rejected() {
        let config: Config = toml::from_str("[retrieval]\nmode = \"bm25\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn huggingface_tokenizer_requires_file() {
        let config: Config = toml::from_str("[budget]\ntokenizer = \"huggingface\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn idle_eviction_shorter_than_window_rejected() {
        let config: Config =
            toml::from_str("[rate_limit]\nidle_eviction_minutes = 1\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("idle_eviction_minutes (1)"));
        assert!(err.to_string().contains("(5)"));

        let config: Config =
            toml::from_str("[rate_limit]\nidle_eviction_minutes = 5\n").unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn temperature_table_lookup() {
        let table = TemperatureTable::default();
        assert_eq!(table.for_intent(QueryIntent::Factual), 0.0);
        assert_eq!(table.for_intent(QueryIntent::Conversational), 0.3);
        assert_eq!(table.for_intent(QueryIntent::Creative), 0.5);
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/scout.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
