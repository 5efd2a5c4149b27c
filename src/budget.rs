//! Token budget gate.
//!
//! Three caps apply to every chat turn: the user input (rejected when over),
//! the assembled knowledge block (truncated to a prefix), and the model
//! output (passed to the model as `max_tokens`).

use std::sync::Arc;

use crate::config::BudgetConfig;
use crate::error::ExceedsLimit;
use crate::tokenizer::Tokenizer;

#[derive(Clone)]
pub struct TokenBudget {
    tokenizer: Arc<dyn Tokenizer>,
    pub max_input: usize,
    pub max_context: usize,
    pub max_output: usize,
}

impl TokenBudget {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: &BudgetConfig) -> Self {
        Self {
            tokenizer,
            max_input: config.max_input_tokens,
            max_context: config.max_context_tokens,
            max_output: config.max_output_tokens,
        }
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Accepts input of up to `max_input` tokens inclusive.
    pub fn validate_input(&self, text: &str) -> Result<(), ExceedsLimit> {
        let count = self.count_tokens(text);
        if count > self.max_input {
            return Err(ExceedsLimit {
                count,
                limit: self.max_input,
            });
        }
        Ok(())
    }

    /// Longest token prefix of `text` that fits `max_context`.
    ///
    /// Text already within budget is returned unchanged, so applying this
    /// twice gives the same result as applying it once.
    pub fn truncate_to_context_budget(&self, text: &str) -> String {
        truncate_to(self.tokenizer.as_ref(), text, self.max_context)
    }
}

fn truncate_to(tokenizer: &dyn Tokenizer, text: &str, limit: usize) -> String {
    let spans = tokenizer.encode(text);
    if spans.len() <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }

    // Re-tokenizing a prefix can merge pieces differently at the cut, so
    // step back until the prefix itself counts within the limit.
    let mut keep = limit;
    loop {
        let prefix = &text[..spans[keep - 1].end];
        if tokenizer.count(prefix) <= limit || keep == 1 {
            return prefix.to_string();
        }
        keep -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexicalTokenizer;

    fn budget(input: usize, context: usize) -> TokenBudget {
        TokenBudget::new(
            Arc::new(LexicalTokenizer),
            &BudgetConfig {
                max_input_tokens: input,
                max_context_tokens: context,
                ..BudgetConfig::default()
            },
        )
    }

    #[test]
    fn input_at_cap_is_accepted() {
        let b = budget(3, 10);
        assert_eq!(b.count_tokens("I like Rust"), 3);
        assert!(b.validate_input("I like Rust").is_ok());
    }

    #[test]
    fn input_over_cap_reports_count_and_limit() {
        let b = budget(2, 10);
        let err = b.validate_input("I like Rust").unwrap_err();
        assert_eq!(err, ExceedsLimit { count: 3, limit: 2 });
    }

    #[test]
    fn empty_input_is_valid() {
        assert!(budget(1, 1).validate_input("").is_ok());
    }

    #[test]
    fn short_context_is_unchanged() {
        let b = budget(10, 10);
        assert_eq!(b.truncate_to_context_budget("I like Rust"), "I like Rust");
    }

    #[test]
    fn long_context_keeps_token_prefix() {
        let b = budget(10, 2);
        let out = b.truncate_to_context_budget("I like Rust");
        assert_eq!(out, "I like");
        assert!(b.count_tokens(&out) <= 2);
    }

    #[test]
    fn truncation_is_idempotent() {
        let b = budget(10, 7);
        let text = "Led the platform team at a fintech startup. Shipped a RAG service.";
        let once = b.truncate_to_context_budget(text);
        let twice = b.truncate_to_context_budget(&once);
        assert_eq!(once, twice);
        assert!(text.starts_with(&once));
    }
}
