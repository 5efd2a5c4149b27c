//! Category and topic tagging.
//!
//! Both labels are pure functions of their input: the category comes from
//! the source file path, the topics from the chunk content. Matching is
//! case-insensitive substring containment.

use std::collections::BTreeSet;

use crate::chunk::TextSplit;
use crate::models::{Category, Chunk, ChunkMetadata, Topic};

/// Checked in order against the lowercased source path; first match wins.
const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("professional_summary", Category::Summary),
    ("work_experience", Category::Work),
    ("projects", Category::Projects),
    ("education_awards", Category::Education),
    ("goals_vision", Category::Goals),
    ("challenges", Category::Challenges),
    ("hobbies", Category::Hobbies),
];

const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::TechnicalSkills,
        &["python", "javascript", "java", "react", "fastapi"],
    ),
    (Topic::AiMl, &["ai", "agent", "llm", "langchain", "rag"]),
    (Topic::Projects, &["project", "built", "developed", "created"]),
    (Topic::Creative, &["music", "film", "creative", "artistic"]),
];

pub fn categorize(source_file: &str) -> Category {
    let lower = source_file.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(Category::General)
}

pub fn topics(content: &str) -> BTreeSet<Topic> {
    let lower = content.to_lowercase();
    let mut found: BTreeSet<Topic> = TOPIC_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(topic, _)| *topic)
        .collect();
    if found.is_empty() {
        found.insert(Topic::General);
    }
    found
}

/// Turn one document's splits into tagged chunks.
pub fn tag(splits: Vec<TextSplit>, source_file: &str) -> Vec<Chunk> {
    let category = categorize(source_file);
    splits
        .into_iter()
        .map(|split| Chunk {
            metadata: ChunkMetadata {
                source_file: source_file.to_string(),
                category,
                topics: topics(&split.content),
                headers: split.headers,
            },
            content: split.content,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn work_file_is_work_regardless_of_content() {
        assert_eq!(categorize("work_experience.md"), Category::Work);
        assert_eq!(categorize("Career/WORK_EXPERIENCE_2024.pdf"), Category::Work);
    }

    #[test]
    fn unknown_file_is_general() {
        assert_eq!(categorize("misc_notes.txt"), Category::General);
    }

    #[test]
    fn first_keyword_wins() {
        // Mentions both "projects" and "hobbies"; projects comes first.
        assert_eq!(categorize("projects_and_hobbies.md"), Category::Projects);
    }

    #[test]
    fn topics_can_overlap() {
        let t = topics("Built an LLM agent in Python");
        let expected: BTreeSet<Topic> = [Topic::TechnicalSkills, Topic::AiMl, Topic::Projects]
            .into_iter()
            .collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn no_topic_falls_back_to_general() {
        let t = topics("Enjoys long walks.");
        assert_eq!(t.into_iter().collect::<Vec<_>>(), vec![Topic::General]);
    }

    #[test]
    fn tag_propagates_source_and_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Header 1".to_string(), "Hobbies".to_string());
        let chunks = tag(
            vec![TextSplit {
                content: "Analog film and jazz music".to_string(),
                headers: headers.clone(),
            }],
            "hobbies.md",
        );
        assert_eq!(chunks.len(), 1);
        let meta = &chunks[0].metadata;
        assert_eq!(meta.source_file, "hobbies.md");
        assert_eq!(meta.category, Category::Hobbies);
        assert!(meta.topics.contains(&Topic::Creative));
        assert_eq!(meta.headers, headers);
    }
}
