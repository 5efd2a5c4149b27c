//! Retrieval and prompt assembly.
//!
//! One over-fetching search, a category filter for the question's intent,
//! and a fallback to the raw ranking when the filter leaves too little.
//! Which path was taken is part of the result ([`Retrieved`]) so callers
//! and tests can tell them apart.

use serde::Serialize;
use std::sync::Arc;

use crate::budget::TokenBudget;
use crate::classify::classify;
use crate::config::Config;
use crate::error::ChatError;
use crate::models::{Category, QueryIntent};
use crate::prompt::build_prompt;
use crate::store::{Candidate, SearchMode, VectorStore};
use crate::workers::WorkerPool;

/// Which retrieval path produced the final candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalPath {
    Filtered,
    Fallback,
}

#[derive(Debug, Clone)]
pub enum Retrieved {
    /// Enough candidates matched the intent's categories.
    Filtered(Vec<Candidate>),
    /// The filter was discarded; these are the top raw candidates.
    Fallback(Vec<Candidate>),
}

impl Retrieved {
    pub fn path(&self) -> RetrievalPath {
        match self {
            Retrieved::Filtered(_) => RetrievalPath::Filtered,
            Retrieved::Fallback(_) => RetrievalPath::Fallback,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Retrieved::Filtered(c) | Retrieved::Fallback(c) => c,
        }
    }
}

/// Apply the category filter with fallback.
pub fn select_candidates(
    raw: Vec<Candidate>,
    eligible: &[Category],
    min_filtered: usize,
    final_k: usize,
) -> Retrieved {
    let filtered: Vec<Candidate> = raw
        .iter()
        .filter(|c| eligible.contains(&c.metadata.category))
        .cloned()
        .collect();

    if filtered.len() < min_filtered {
        Retrieved::Fallback(raw.into_iter().take(final_k).collect())
    } else {
        Retrieved::Filtered(filtered.into_iter().take(final_k).collect())
    }
}

/// Concatenated content (each followed by a blank line) and distinct
/// source labels in first-seen order.
pub fn assemble_knowledge(candidates: &[Candidate]) -> (String, Vec<String>) {
    let mut knowledge = String::new();
    let mut sources: Vec<String> = Vec::new();
    for c in candidates {
        knowledge.push_str(&c.content);
        knowledge.push_str("\n\n");
        if !sources.contains(&c.metadata.source_file) {
            sources.push(c.metadata.source_file.clone());
        }
    }
    (knowledge, sources)
}

/// Everything the generation step needs.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub prompt: String,
    pub sources: Vec<String>,
    pub intent: QueryIntent,
    pub temperature: f32,
    pub path: RetrievalPath,
}

/// Classify, search, filter, assemble, and truncate.
///
/// The store call is dispatched through `workers` under the retrieval
/// timeout. An empty candidate list means the index has nothing to offer.
pub async fn retrieve_and_assemble(
    question: &str,
    store: Arc<dyn VectorStore>,
    budget: &TokenBudget,
    workers: &WorkerPool,
    config: &Config,
) -> Result<AssembledPrompt, ChatError> {
    let intent = classify(question);
    let retrieval = &config.retrieval;

    let query = question.to_string();
    let (k, mode) = (retrieval.fetch_k, SearchMode::from_config(retrieval));
    let raw = match workers
        .run("retrieval", retrieval.timeout(), async move {
            store.search(&query, k, mode).await
        })
        .await
    {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return Err(ChatError::Retrieval(format!("{:#}", e))),
        Err(timed_out) => return Err(ChatError::RetrievalTimeout(timed_out.after)),
    };
    tracing::debug!(intent = %intent, candidates = raw.len(), "retrieved candidates");
    if raw.is_empty() {
        return Err(ChatError::NoDocumentsRetrieved);
    }

    let retrieved = select_candidates(
        raw,
        intent.eligible_categories(),
        retrieval.min_filtered,
        retrieval.final_k,
    );
    if retrieved.path() == RetrievalPath::Fallback {
        tracing::debug!(intent = %intent, "category filter starved results, using raw ranking");
    }

    let (knowledge, sources) = assemble_knowledge(retrieved.candidates());
    let knowledge = budget.truncate_to_context_budget(&knowledge);

    Ok(AssembledPrompt {
        prompt: build_prompt(&config.persona.subject, intent, question, &knowledge),
        sources,
        intent,
        temperature: config.generation.temperature.for_intent(intent),
        path: retrieved.path(),
    })
}
