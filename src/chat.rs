//! Chat orchestration.
//!
//! Checks run cheapest first and stop at the first failure: empty message,
//! rate limit, input budget, readiness. The budget needs the core's
//! tokenizer, so it is checked whenever the core is installed, even if the
//! engine later failed. Only then does the request touch the store and the
//! model.

use serde::Serialize;

use crate::context::AppContext;
use crate::error::{ChatError, IngestError};
use crate::llm::GenerationParams;
use crate::models::QueryIntent;
use crate::rate_limit::Decision;
use crate::retrieval::{retrieve_and_assemble, RetrievalPath};

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub intent: QueryIntent,
    pub path: RetrievalPath,
}

pub async fn answer(ctx: &AppContext, client_id: &str, question: &str) -> Result<ChatAnswer, ChatError> {
    if question.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    if let Decision::Denied {
        reason,
        retry_after,
    } = ctx.rate_limiter.check(client_id, ctx.config.rate_limit.chat)
    {
        return Err(ChatError::RateLimited {
            message: reason,
            retry_after,
        });
    }

    if let Some(core) = ctx.core() {
        core.budget.validate_input(question)?;
    }
    let core = ctx.ready_core()?;

    let assembled = retrieve_and_assemble(
        question,
        core.store.clone(),
        &core.budget,
        &ctx.workers,
        &ctx.config,
    )
    .await?;

    let generation = &ctx.config.generation;
    let params = GenerationParams {
        temperature: assembled.temperature,
        max_output_tokens: core.budget.max_output,
        top_p: generation.top_p,
        frequency_penalty: generation.frequency_penalty,
    };

    let llm = core.llm.clone();
    let prompt = assembled.prompt;
    let response = match ctx
        .workers
        .run("generation", generation.timeout(), async move {
            llm.generate(&prompt, &params).await
        })
        .await
    {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(ChatError::Generation(format!("{:#}", e))),
        Err(timed_out) => return Err(ChatError::GenerationTimeout(timed_out.after)),
    };

    tracing::info!(
        client = %client_id,
        intent = %assembled.intent,
        path = ?assembled.path,
        sources = assembled.sources.len(),
        "answered chat message"
    );

    Ok(ChatAnswer {
        answer: response,
        sources: assembled.sources,
        intent: assembled.intent,
        path: assembled.path,
    })
}

/// Admission check for an ingestion request from `client_id`.
pub fn admit_ingest(ctx: &AppContext, client_id: &str) -> Result<(), IngestError> {
    match ctx.rate_limiter.check(client_id, ctx.config.rate_limit.ingest) {
        Decision::Allowed => Ok(()),
        Decision::Denied {
            reason,
            retry_after,
        } => Err(IngestError::RateLimited {
            message: reason,
            retry_after,
        }),
    }
}
