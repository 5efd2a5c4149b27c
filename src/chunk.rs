//! Structure-aware text splitting.
//!
//! Markdown documents are first cut at level 1–3 headers (header lines stay
//! in their section, and each section remembers its enclosing headers). Every
//! section, and every plain document, is then cut into overlapping windows by
//! [`RecursiveSplitter`], which tries paragraph breaks first, then line
//! breaks, sentence ends, spaces, and finally single characters.
//!
//! Window sizes are measured in characters, not bytes.

use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::ChunkingConfig;
use crate::models::SourceDocument;

/// Separators in priority order; the empty separator splits into characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("unterminated code fence opened on line {line}")]
    UnterminatedFence { line: usize },
}

/// A header-delimited piece of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub text: String,
    pub headers: BTreeMap<String, String>,
}

/// One window of text ready for tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplit {
    pub content: String,
    pub headers: BTreeMap<String, String>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,3})\s+(.+?)\s*$").expect("header pattern is valid"))
}

fn header_key(level: usize) -> String {
    format!("Header {}", level)
}

/// Split markdown at level 1–3 headers, outside code fences.
pub fn split_headers(text: &str) -> Result<Vec<Section>, SplitError> {
    let mut sections = Vec::new();
    let mut active: BTreeMap<usize, String> = BTreeMap::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_headers: BTreeMap<String, String> = BTreeMap::new();
    let mut fence_opened: Option<usize> = None;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence_opened = match fence_opened {
                Some(_) => None,
                None => Some(idx + 1),
            };
            current.push(line);
            continue;
        }

        if fence_opened.is_none() {
            if let Some(caps) = header_regex().captures(line) {
                flush_section(&mut sections, &mut current, &current_headers);

                let level = caps[1].len();
                active.retain(|&l, _| l < level);
                active.insert(level, caps[2].to_string());
                current_headers = active
                    .iter()
                    .map(|(l, name)| (header_key(*l), name.clone()))
                    .collect();
            }
        }
        current.push(line);
    }

    if let Some(line) = fence_opened {
        return Err(SplitError::UnterminatedFence { line });
    }
    flush_section(&mut sections, &mut current, &current_headers);
    Ok(sections)
}

fn flush_section(
    sections: &mut Vec<Section>,
    lines: &mut Vec<&str>,
    headers: &BTreeMap<String, String>,
) {
    let text = lines.join("\n");
    lines.clear();
    let text = text.trim();
    if !text.is_empty() {
        sections.push(Section {
            text: text.to_string(),
            headers: headers.clone(),
        });
    }
}

/// Separator-priority splitter producing overlapping windows.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, &self.separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str], out: &mut Vec<String>) {
        let (separator, remaining) = pick_separator(text, separators);

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_start(text, separator) {
            if piece.chars().count() < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge(&good, out);
                good.clear();
            }
            if remaining.is_empty() {
                push_trimmed(out, piece);
            } else {
                self.split_recursive(piece, remaining, out);
            }
        }
        if !good.is_empty() {
            self.merge(&good, out);
        }
    }

    /// Greedily pack pieces into windows, carrying up to `overlap`
    /// characters of the previous window into the next.
    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = piece.chars().count();
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(out, &concat(&window));
                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_trimmed(out, &concat(&window));
    }
}

fn pick_separator<'s>(
    text: &str,
    separators: &'s [&'static str],
) -> (&'static str, &'s [&'static str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split on `sep`, keeping each separator at the start of the piece after it.
fn split_keep_start<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn concat(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(s, _)| *s).collect()
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

/// Split one document into windows.
///
/// Markdown goes through the header splitter first; if that fails for this
/// document, the whole document is split uniformly instead.
pub fn split_document(doc: &SourceDocument, splitter: &RecursiveSplitter) -> Vec<TextSplit> {
    if !doc.format.is_structured() {
        return uniform(&doc.text, splitter);
    }

    match split_headers(&doc.text) {
        Ok(sections) => sections
            .into_iter()
            .flat_map(|section| {
                splitter
                    .split_text(&section.text)
                    .into_iter()
                    .map(move |content| TextSplit {
                        content,
                        headers: section.headers.clone(),
                    })
            })
            .collect(),
        Err(e) => {
            tracing::warn!(file = %doc.source_file, error = %e, "header split failed, using uniform split");
            uniform(&doc.text, splitter)
        }
    }
}

fn uniform(text: &str, splitter: &RecursiveSplitter) -> Vec<TextSplit> {
    splitter
        .split_text(text)
        .into_iter()
        .map(|content| TextSplit {
            content,
            headers: BTreeMap::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceFormat;

    fn doc(format: SourceFormat, text: &str) -> SourceDocument {
        SourceDocument {
            source_file: "work_experience.md".to_string(),
            format,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = RecursiveSplitter::new(100, 10);
        assert_eq!(splitter.split_text("Hello, world!"), vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = RecursiveSplitter::new(100, 10);
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraph_breaks_preferred() {
        let splitter = RecursiveSplitter::new(12, 0);
        let chunks = splitter.split_text("para one.\n\npara two.");
        assert_eq!(chunks, vec!["para one.", "para two."]);
    }

    #[test]
    fn test_windows_respect_size_and_overlap() {
        let text = (0..60)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = RecursiveSplitter::new(50, 10);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {:?}", c);
        }
        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(pair[0].contains(first_word), "no overlap between {:?}", pair);
        }
    }

    #[test]
    fn test_unbroken_text_falls_through_to_characters() {
        let splitter = RecursiveSplitter::new(10, 0);
        let chunks = splitter.split_text(&"x".repeat(25));
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let splitter = RecursiveSplitter::new(5, 0);
        let chunks = splitter.split_text("ééééééé");
        assert_eq!(chunks, vec!["ééééé", "éé"]);
    }

    #[test]
    fn test_header_sections_track_nesting() {
        let text = "# Career\nintro\n## Acme\nbuilt things\n### Stack\nRust\n## Initech\nreports";
        let sections = split_headers(text).unwrap();
        assert_eq!(sections.len(), 4);

        assert_eq!(sections[0].text, "# Career\nintro");
        assert_eq!(sections[0].headers["Header 1"], "Career");

        assert_eq!(sections[2].headers.len(), 3);
        assert_eq!(sections[2].headers["Header 3"], "Stack");

        let last = &sections[3];
        assert!(last.text.starts_with("## Initech"));
        assert_eq!(last.headers["Header 2"], "Initech");
        assert!(!last.headers.contains_key("Header 3"));
    }

    #[test]
    fn test_preamble_before_first_header_has_no_headers() {
        let sections = split_headers("About me\n\n# Work\nAcme").unwrap();
        assert_eq!(sections[0].text, "About me");
        assert!(sections[0].headers.is_empty());
    }

    #[test]
    fn test_headers_inside_code_fence_ignored() {
        let text = "# Notes\n```\n# not a header\n```\nafter";
        let sections = split_headers(text).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("# not a header"));
    }

    #[test]
    fn test_level_four_is_not_a_split_point() {
        let sections = split_headers("# A\n#### detail\ntext").unwrap();
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_unterminated_fence_is_error() {
        let err = split_headers("# A\n```rust\nfn main() {}").unwrap_err();
        assert_eq!(err, SplitError::UnterminatedFence { line: 2 });
    }

    #[test]
    fn test_markdown_split_carries_headers() {
        let splitter = RecursiveSplitter::new(1000, 175);
        let splits = split_document(
            &doc(SourceFormat::Markdown, "# Work\n## Acme\nShipped a RAG service."),
            &splitter,
        );
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1].headers["Header 2"], "Acme");
    }

    #[test]
    fn test_markdown_fallback_on_split_failure() {
        let splitter = RecursiveSplitter::new(1000, 175);
        let splits = split_document(
            &doc(SourceFormat::Markdown, "# Work\n```\nunclosed"),
            &splitter,
        );
        assert_eq!(splits.len(), 1);
        assert!(splits[0].headers.is_empty());
        assert!(splits[0].content.contains("unclosed"));
    }

    #[test]
    fn test_plain_text_skips_header_split() {
        let splitter = RecursiveSplitter::new(1000, 175);
        let splits = split_document(&doc(SourceFormat::Text, "# not parsed\nbody"), &splitter);
        assert_eq!(splits.len(), 1);
        assert!(splits[0].headers.is_empty());
    }
}
