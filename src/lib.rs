//! # Career Scout
//!
//! A retrieval-augmented Q&A engine that answers questions about one
//! person's career from a small, curated document corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │   Corpus    │──▶│  Ingestion        │──▶│  SQLite   │
//! │ PDF/TXT/MD  │   │ Split+Tag+Embed   │   │  vectors  │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!   question ──▶ rate limit ──▶ budget ──▶ readiness ──▶ classify
//!                                               │
//!                        retrieve + filter ◀────┘
//!                               │
//!                   truncate ──▶ prompt ──▶ LLM ──▶ {answer, sources}
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout ingest                          # index ./data
//! scout ask "Where did she work last?"  # one-off question
//! scout serve                           # HTTP API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Documents, chunks, categories, intents |
//! | [`error`] | Typed error taxonomy and boundary classes |
//! | [`tokenizer`] | Token counting backends |
//! | [`budget`] | Input validation and context truncation |
//! | [`rate_limit`] | Sliding-window per-client limiter |
//! | [`workers`] | Bounded dispatch with per-call timeouts |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`loader`] | Per-format corpus loading |
//! | [`chunk`] | Header-aware overlapping splitter |
//! | [`tagger`] | Category and topic tagging |
//! | [`embedding`] | Embedding providers |
//! | [`store`] | Vector stores and ranking |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |
//! | [`llm`] | Language-model providers |
//! | [`ingest`] | Ingestion pipeline |
//! | [`readiness`] | Initialization state machine |
//! | [`context`] | Application context and background initialization |
//! | [`classify`] | Query intent classification |
//! | [`prompt`] | Persona, guardrails, prompt assembly |
//! | [`retrieval`] | Filtered retrieval with fallback |
//! | [`chat`] | Request-time orchestration |
//! | [`server`] | HTTP surface |

pub mod budget;
pub mod chat;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod readiness;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod tagger;
pub mod tokenizer;
pub mod workers;
