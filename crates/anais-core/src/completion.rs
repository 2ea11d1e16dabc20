//! Field completion: fills translatable fields the extraction left empty.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::ai::{AiClient, AiError, AiTask};
use crate::record::{MergedRecord, fields};

/// Fields eligible for completion, each with the fields it may be derived from.
const DERIVATIONS: [(&str, &[&str]); 5] = [
    (fields::TITLE_EN, &[fields::TITLE_ORIG]),
    (fields::ABSTRACT_ORIG, &[fields::ABSTRACT_EN]),
    (fields::ABSTRACT_EN, &[fields::ABSTRACT_ORIG]),
    (fields::KEYWORDS_ORIG, &[fields::ABSTRACT_ORIG]),
    (fields::KEYWORDS_EN, &[fields::KEYWORDS_ORIG]),
];

/// Empty fields whose source is populated, directly or through another
/// fillable field (an empty `abstractOrig` filled from `abstractEn` can in
/// turn seed `keywordsOrig`).
pub fn fillable_fields(record: &MergedRecord) -> Vec<&'static str> {
    let mut available: Vec<&str> = DERIVATIONS
        .iter()
        .flat_map(|(target, sources)| std::iter::once(*target).chain(sources.iter().copied()))
        .filter(|f| !record.is_blank(f))
        .collect();
    let mut fillable: Vec<&'static str> = Vec::new();

    loop {
        let before = fillable.len();
        for (target, sources) in DERIVATIONS {
            if fillable.contains(&target) || !record.is_blank(target) {
                continue;
            }
            if sources.iter().any(|s| available.contains(s)) {
                fillable.push(target);
                available.push(target);
            }
        }
        if fillable.len() == before {
            break;
        }
    }

    // Keep the canonical order regardless of discovery order.
    DERIVATIONS
        .iter()
        .map(|(target, _)| *target)
        .filter(|t| fillable.contains(t))
        .collect()
}

/// Result of one completion pass.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub record: MergedRecord,
    /// Fields that received a value.
    pub filled: Vec<&'static str>,
    /// Set when the completion call failed; the record is then unchanged.
    pub failure: Option<AiError>,
}

pub struct FieldCompleter {
    ai: Arc<AiClient>,
}

impl FieldCompleter {
    pub fn new(ai: Arc<AiClient>) -> Self {
        Self { ai }
    }

    /// Fill missing fields with a single request carrying the whole record.
    ///
    /// Fields already populated are never touched, so a complete record costs
    /// no AI call and passes through unchanged.
    pub async fn complete(&self, mut record: MergedRecord) -> CompletionOutcome {
        let targets = fillable_fields(&record);
        if targets.is_empty() {
            return CompletionOutcome {
                record,
                filled: Vec::new(),
                failure: None,
            };
        }

        let request = json!({
            "article": record.as_map(),
            "fieldsToComplete": targets,
        });
        let article = record.text(fields::ID);

        match self
            .ai
            .invoke(AiTask::FieldCompletion, &request.to_string())
            .await
        {
            Ok(response) => {
                let filled = apply_completion(&mut record, &targets, &response);
                if filled.len() < targets.len() {
                    tracing::debug!(
                        article = %article,
                        requested = targets.len(),
                        filled = filled.len(),
                        "completion left fields empty"
                    );
                }
                CompletionOutcome {
                    record,
                    filled,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(article = %article, error = %e, "field completion failed");
                CompletionOutcome {
                    record,
                    filled: Vec::new(),
                    failure: Some(e),
                }
            }
        }
    }
}

/// Copy completed values for `targets` into `record`, skipping any field that
/// is already populated. Returns the fields written.
pub fn apply_completion(
    record: &mut MergedRecord,
    targets: &[&'static str],
    response: &Value,
) -> Vec<&'static str> {
    let source = match response.get("article") {
        Some(inner) if inner.is_object() => inner,
        _ => response,
    };

    let mut filled = Vec::new();
    for &field in targets {
        if !record.is_blank(field) {
            continue;
        }
        let value = match source.get(field) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            _ => String::new(),
        };
        if !value.is_empty() {
            record.set(field, value);
            filled.push(field);
        }
    }
    filled
}
