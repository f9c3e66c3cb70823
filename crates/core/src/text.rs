//! Cheap statistics recorded in report metadata after extraction.

const SPANISH_STOPWORDS: [&str; 12] = [
    "el", "la", "los", "las", "de", "del", "que", "y", "en", "para", "con", "una",
];
const ENGLISH_STOPWORDS: [&str; 12] = [
    "the", "of", "and", "to", "in", "for", "with", "that", "is", "on", "are", "this",
];

pub const DEFAULT_LANGUAGE: &str = "es";

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Returns `"en"` when English stopwords outnumber Spanish ones, otherwise `"es"`.
pub fn detect_language(text: &str) -> &'static str {
    let mut spanish = 0usize;
    let mut english = 0usize;

    for token in text.split_whitespace() {
        let token = token
            .trim_matches(|ch: char| !ch.is_alphabetic())
            .to_lowercase();
        if SPANISH_STOPWORDS.contains(&token.as_str()) {
            spanish += 1;
        }
        if ENGLISH_STOPWORDS.contains(&token.as_str()) {
            english += 1;
        }
    }

    if english > spanish {
        "en"
    } else {
        DEFAULT_LANGUAGE
    }
}
