//! Core data models used throughout the engine.
//!
//! These types represent the documents, chunks, and labels that flow
//! through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Source format of a corpus file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Text,
    Markdown,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 3] = [SourceFormat::Pdf, SourceFormat::Text, SourceFormat::Markdown];

    pub fn label(self) -> &'static str {
        match self {
            SourceFormat::Pdf => "pdf",
            SourceFormat::Text => "text",
            SourceFormat::Markdown => "markdown",
        }
    }

    /// Glob matched against paths relative to the corpus root.
    pub fn glob(self) -> &'static str {
        match self {
            SourceFormat::Pdf => "**/*.pdf",
            SourceFormat::Text => "**/*.txt",
            SourceFormat::Markdown => "**/*.md",
        }
    }

    /// Whether documents of this format go through header splitting first.
    pub fn is_structured(self) -> bool {
        matches!(self, SourceFormat::Markdown)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A corpus file after text extraction, before splitting.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the corpus root, with `/` separators.
    pub source_file: String,
    pub format: SourceFormat,
    pub text: String,
}

/// Document category, derived from the source file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Summary,
    Work,
    Projects,
    Education,
    Goals,
    Challenges,
    Hobbies,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Summary => "summary",
            Category::Work => "work",
            Category::Projects => "projects",
            Category::Education => "education",
            Category::Goals => "goals",
            Category::Challenges => "challenges",
            Category::Hobbies => "hobbies",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic label derived from chunk content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    TechnicalSkills,
    AiMl,
    Projects,
    Creative,
    General,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::TechnicalSkills => "technical_skills",
            Topic::AiMl => "ai_ml",
            Topic::Projects => "projects",
            Topic::Creative => "creative",
            Topic::General => "general",
        }
    }
}

/// Metadata attached to every chunk and persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub category: Category,
    pub topics: BTreeSet<Topic>,
    /// Enclosing markdown headers, keyed `"Header 1"`..`"Header 3"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// A bounded span of source text plus metadata; the unit of indexing.
///
/// Chunks are built once by the tagger and moved into the vector store on
/// ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Intent of a user question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Factual,
    Conversational,
    Creative,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::Factual => "factual",
            QueryIntent::Conversational => "conversational",
            QueryIntent::Creative => "creative",
        }
    }

    /// Categories whose chunks are preferred when answering this intent.
    pub fn eligible_categories(self) -> &'static [Category] {
        match self {
            QueryIntent::Factual => &[
                Category::Work,
                Category::Education,
                Category::Projects,
                Category::Summary,
            ],
            QueryIntent::Creative => &[Category::Hobbies],
            QueryIntent::Conversational => &[
                Category::General,
                Category::Summary,
                Category::Goals,
                Category::Challenges,
            ],
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factual_eligible_set() {
        let set: BTreeSet<Category> = QueryIntent::Factual
            .eligible_categories()
            .iter()
            .copied()
            .collect();
        let expected: BTreeSet<Category> = [
            Category::Work,
            Category::Education,
            Category::Projects,
            Category::Summary,
        ]
        .into_iter()
        .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn metadata_serializes_with_snake_case_labels() {
        let meta = ChunkMetadata {
            source_file: "work_experience.md".to_string(),
            category: Category::Work,
            topics: [Topic::AiMl, Topic::TechnicalSkills].into_iter().collect(),
            headers: BTreeMap::new(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["category"], "work");
        assert_eq!(json["topics"], serde_json::json!(["technical_skills", "ai_ml"]));
        assert!(json.get("headers").is_none());
    }
}
