//! Token counting for the budget gate.
//!
//! A [`Tokenizer`] reports the byte span of every token in a string. Spans
//! are what make prefix truncation possible without a decode step: cutting
//! the text at the end of token *n* yields exactly the first *n* tokens.
//!
//! Two backends exist:
//! - [`LexicalTokenizer`]: regex pre-tokenization in the style of the
//!   cl100k family (contractions, letter runs with an optional leading
//!   space, short digit runs, punctuation runs, whitespace runs), with long
//!   runs split into 4-character pieces. Offline and deterministic; counts
//!   track model tokenizers closely for English prose.
//! - `HfTokenizer` (feature `hf-tokenizer`): exact counts from a
//!   `tokenizer.json` via the `tokenizers` crate.

use anyhow::{bail, Result};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::config::BudgetConfig;

/// Approximate characters per token for long pre-tokens.
const CHARS_PER_TOKEN: usize = 4;

const PRE_TOKEN_PATTERN: &str =
    r"(?i:'s|'t|'re|'ve|'m|'ll|'d)| ?\p{L}+| ?\p{N}{1,3}| ?[^\s\p{L}\p{N}]+|\s+";

pub trait Tokenizer: Send + Sync {
    /// Short identifier for logs and introspection.
    fn name(&self) -> &str;

    /// Byte spans of each token, in order, covering the tokenized text.
    fn encode(&self, text: &str) -> Vec<Range<usize>>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

fn pre_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PRE_TOKEN_PATTERN).expect("pre-token pattern is valid"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalTokenizer;

impl LexicalTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for LexicalTokenizer {
    fn name(&self) -> &str {
        "lexical"
    }

    fn encode(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        for m in pre_token_regex().find_iter(text) {
            let piece = m.as_str();
            let base = m.start();
            // A leading space rides along with the first piece.
            let lead = usize::from(piece.len() > 1 && piece.starts_with(' '));
            let mut start = 0;
            let mut chars = 0;
            for (idx, _) in piece[lead..].char_indices() {
                let idx = idx + lead;
                if chars == CHARS_PER_TOKEN {
                    spans.push(base + start..base + idx);
                    start = idx;
                    chars = 0;
                }
                chars += 1;
            }
            if start < piece.len() {
                spans.push(base + start..base + piece.len());
            }
        }
        spans
    }
}

#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenizer {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn encode(&self, text: &str) -> Vec<Range<usize>> {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding
                .get_offsets()
                .iter()
                .filter(|(start, end)| end > start)
                .map(|&(start, end)| start..end)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "tokenizer failed, falling back to lexical spans");
                LexicalTokenizer.encode(text)
            }
        }
    }
}

/// Build the tokenizer named in `[budget]`.
pub fn create_tokenizer(config: &BudgetConfig) -> Result<Box<dyn Tokenizer>> {
    match config.tokenizer.as_str() {
        "lexical" => Ok(Box::new(LexicalTokenizer::new())),
        #[cfg(feature = "hf-tokenizer")]
        "huggingface" => {
            let path = config
                .tokenizer_file
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("budget.tokenizer_file required"))?;
            Ok(Box::new(HfTokenizer::from_file(path)?))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        "huggingface" => bail!("Hugging Face tokenizer requires --features hf-tokenizer"),
        other => bail!("Unknown tokenizer: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces<'a>(text: &'a str) -> Vec<&'a str> {
        LexicalTokenizer
            .encode(text)
            .into_iter()
            .map(|r| &text[r])
            .collect()
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(LexicalTokenizer.count(""), 0);
    }

    #[test]
    fn words_keep_leading_space() {
        assert_eq!(pieces("I like Rust"), vec!["I", " like", " Rust"]);
    }

    #[test]
    fn long_words_split_into_pieces() {
        assert_eq!(pieces("engineering"), vec!["engi", "neer", "ing"]);
    }

    #[test]
    fn digits_grouped_by_three() {
        assert_eq!(pieces("20245"), vec!["202", "45"]);
    }

    #[test]
    fn contractions_are_separate_tokens() {
        assert_eq!(pieces("it's"), vec!["it", "'s"]);
    }

    #[test]
    fn spans_are_contiguous_for_prose() {
        let text = "Built a RAG service in 2023, shipped to 1,000 users!\n\nThen more.";
        let spans = LexicalTokenizer.encode(text);
        let mut end = 0;
        for s in &spans {
            assert_eq!(s.start, end);
            end = s.end;
        }
        assert_eq!(end, text.len());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "naïveté résumé";
        for span in LexicalTokenizer.encode(text) {
            assert!(text.is_char_boundary(span.start));
            assert!(text.is_char_boundary(span.end));
        }
    }

    #[test]
    fn create_lexical_from_default_config() {
        let tok = create_tokenizer(&BudgetConfig::default()).unwrap();
        assert_eq!(tok.name(), "lexical");
    }
}
