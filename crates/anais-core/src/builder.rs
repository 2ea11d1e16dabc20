//! Promotion of merged records to validated [`Article`]s.

use thiserror::Error;

use crate::model::{Article, RecordConvert};
use crate::record::{MergedRecord, fields};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("titleOrig is empty")]
    EmptyTitle,
    #[error("record does not map onto an article: {0}")]
    Malformed(String),
}

/// Convert a merged (and completed) record into an [`Article`].
///
/// Rejects records without `titleOrig`. Every other field is normalized to an
/// explicit value: missing scalars become empty strings, a language that is
/// not a two-letter code becomes `default_language`, and references without a
/// description are dropped.
pub fn build(record: &MergedRecord, default_language: &str) -> Result<Article, ValidationError> {
    if record.is_blank(fields::TITLE_ORIG) {
        return Err(ValidationError::EmptyTitle);
    }

    let mut article =
        Article::from_record(record).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    article.language = normalize_language(&article.language).unwrap_or_else(|| {
        if !article.language.is_empty() {
            tracing::debug!(
                article = %article.id,
                language = %article.language,
                "unrecognized language, using default"
            );
        }
        default_language.to_string()
    });

    let before = article.references.len();
    article.references.retain(|r| !r.description.is_empty());
    let dropped = before - article.references.len();
    if dropped > 0 {
        tracing::warn!(
            article = %article.id,
            dropped,
            "dropped references without description"
        );
    }

    Ok(article)
}

/// Two-letter lowercase language code, accepting regional tags like `pt-BR`.
fn normalize_language(value: &str) -> Option<String> {
    let lower = value.trim().to_ascii_lowercase();
    let code = lower.split(['-', '_']).next().unwrap_or("");
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
        return Some(code.to_string());
    }
    match lower.as_str() {
        "portuguese" | "português" | "portugues" => Some("pt".into()),
        "english" | "inglês" | "ingles" => Some("en".into()),
        "spanish" | "español" | "espanhol" => Some("es".into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> MergedRecord {
        MergedRecord::from_value(value).unwrap()
    }

    #[test]
    fn empty_title_is_rejected() {
        for title in [json!(null), json!(""), json!("   ")] {
            let r = record(json!({"titleOrig": title, "titleEn": "Only English"}));
            assert_eq!(build(&r, "pt"), Err(ValidationError::EmptyTitle));
        }
        let r = record(json!({"abstractOrig": "x"}));
        assert_eq!(build(&r, "pt"), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn missing_fields_become_empty_strings() {
        let article = build(&record(json!({"titleOrig": "Título"})), "pt").unwrap();
        assert_eq!(article.title_orig, "Título");
        assert_eq!(article.title_en, "");
        assert_eq!(article.doi, "");
        assert!(article.authors.is_empty());
        assert!(article.references.is_empty());
    }

    #[test]
    fn language_is_normalized() {
        let cases = [
            ("pt-BR", "pt"),
            ("EN", "en"),
            ("Portuguese", "pt"),
            ("", "pt"),
            ("klingon", "pt"),
        ];
        for (input, expected) in cases {
            let article = build(&record(json!({"titleOrig": "T", "language": input})), "pt").unwrap();
            assert_eq!(article.language, expected, "input {input:?}");
        }
    }

    #[test]
    fn references_without_description_are_dropped() {
        let r = record(json!({
            "titleOrig": "T",
            "references": [
                {"description": "Silva, J. (2020). Um estudo.", "doi": "10.1/a"},
                {"description": "", "link": "http://x"},
                {"doi": "10.1/b"}
            ]
        }));
        let article = build(&r, "pt").unwrap();
        assert_eq!(article.references.len(), 1);
        assert_eq!(article.references[0].doi, "10.1/a");
    }

    #[test]
    fn author_order_is_preserved() {
        let r = record(json!({
            "titleOrig": "T",
            "authors": [
                {"authorFirstName": "Ana"},
                {"authorFirstName": "Bruno"},
                {"authorFirstName": "Carla"}
            ]
        }));
        let names: Vec<_> = build(&r, "pt")
            .unwrap()
            .authors
            .into_iter()
            .map(|a| a.author_first_name)
            .collect();
        assert_eq!(names, ["Ana", "Bruno", "Carla"]);
    }
}
