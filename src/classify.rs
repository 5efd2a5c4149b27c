//! Query intent classification.
//!
//! Case-insensitive substring match against two keyword lists, factual
//! first. Anything matching neither is conversational.

use crate::models::QueryIntent;

const FACTUAL_KEYWORDS: &[&str] = &[
    "what",
    "where",
    "when",
    "which",
    "how many",
    "list",
    "experience",
    "education",
    "skills",
    "technologies",
    "projects",
    "work",
    "role",
    "position",
    "degree",
    "gpa",
    "company",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "hobbies",
    "interests",
    "music",
    "film",
    "personality",
    "creative",
    "artistic",
    "passion",
    "enjoy",
    "like",
];

pub fn classify(question: &str) -> QueryIntent {
    let lower = question.to_lowercase();
    if FACTUAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        QueryIntent::Factual
    } else if CREATIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        QueryIntent::Creative
    } else {
        QueryIntent::Conversational
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemperatureTable;
    use crate::models::Category;

    #[test]
    fn what_question_is_factual() {
        let intent = classify("What did she ship at Acme?");
        assert_eq!(intent, QueryIntent::Factual);
        assert_eq!(
            intent.eligible_categories(),
            &[
                Category::Work,
                Category::Education,
                Category::Projects,
                Category::Summary
            ]
        );
        assert_eq!(TemperatureTable::default().for_intent(intent), 0.0);
    }

    #[test]
    fn factual_wins_over_creative() {
        assert_eq!(classify("Which music does he enjoy?"), QueryIntent::Factual);
    }

    #[test]
    fn creative_keywords() {
        assert_eq!(classify("Tell me about your hobbies"), QueryIntent::Creative);
        assert_eq!(classify("Do you ENJOY film?"), QueryIntent::Creative);
    }

    #[test]
    fn default_is_conversational() {
        assert_eq!(classify("Hi there!"), QueryIntent::Conversational);
        assert_eq!(classify(""), QueryIntent::Conversational);
    }
}
