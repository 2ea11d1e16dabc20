//! Per-article extraction: head and tail windows through the AI capability,
//! merged with the table-of-contents partial record.

use std::sync::Arc;

use anais_parsing::{WindowConfig, clean_text, has_encoding_damage, select_windows};
use serde_json::Value;
use thiserror::Error;

use crate::Config;
use crate::ai::{AiClient, AiError, AiTask};
use crate::record::{MergedRecord, fields};
use crate::source::{ArticleSource, HtmlPartial};

/// Head-window failure: the article cannot proceed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("article has no extractable text")]
    NoText,
    #[error("metadata extraction failed: {0}")]
    Ai(AiError),
}

impl ExtractionFailure {
    /// The unparseable model output, kept for manual review.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractionFailure::Ai(e) => e.raw_response(),
            ExtractionFailure::NoText => None,
        }
    }
}

/// A successfully merged record plus the non-fatal references outcome.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub record: MergedRecord,
    /// Set when the tail-window call failed; the record then has `references = []`.
    pub references_failure: Option<AiError>,
}

/// Drives the two extraction calls for one article and merges the results.
pub struct ExtractionOrchestrator {
    ai: Arc<AiClient>,
    windows: WindowConfig,
    repair_encoding: bool,
    skip_references_sections: Vec<String>,
    doi_prefix: Option<String>,
    year: Option<String>,
}

impl ExtractionOrchestrator {
    pub fn new(ai: Arc<AiClient>, config: &Config) -> Self {
        Self {
            ai,
            windows: WindowConfig {
                head_pages: config.head_pages,
                tail_pages: config.tail_pages,
            },
            repair_encoding: config.repair_encoding,
            skip_references_sections: config.skip_references_sections.clone(),
            doi_prefix: config.doi_prefix.clone(),
            year: config.year.clone(),
        }
    }

    pub async fn extract(
        &self,
        source: &ArticleSource,
    ) -> Result<ExtractionOutcome, ExtractionFailure> {
        let windows = select_windows(&source.pages, &self.windows);
        let head = self.prepare_text(&source.id, &windows.head).await;
        if head.is_empty() {
            return Err(ExtractionFailure::NoText);
        }

        let ai_record = self
            .ai
            .invoke_validated(AiTask::ArticleExtraction, &head, metadata_record)
            .await
            .map_err(ExtractionFailure::Ai)?;

        let mut record = merge_partial(ai_record, &source.html);
        record.set(fields::ID, source.id.clone());
        self.apply_derived(&mut record, source.pages.len());

        let section = record.text(fields::SECTION);
        let references_failure = if self.skips_references(&section) {
            tracing::debug!(article = %source.id, section = %section, "section has no bibliography");
            record.set(fields::REFERENCES, Value::Array(Vec::new()));
            None
        } else {
            let tail = self.prepare_text(&source.id, &windows.tail).await;
            match self.extract_references(&tail).await {
                Ok(references) => {
                    record.set(fields::REFERENCES, Value::Array(references));
                    None
                }
                Err(e) => {
                    tracing::warn!(article = %source.id, error = %e, "references extraction failed");
                    record.set(fields::REFERENCES, Value::Array(Vec::new()));
                    Some(e)
                }
            }
        };

        Ok(ExtractionOutcome {
            record,
            references_failure,
        })
    }

    fn skips_references(&self, section: &str) -> bool {
        section_listed(&self.skip_references_sections, section)
    }

    async fn extract_references(&self, tail: &str) -> Result<Vec<Value>, AiError> {
        if tail.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.ai.invoke(AiTask::ReferencesExtraction, tail).await?;
        Ok(reference_entries(response))
    }

    /// Clean window text, repairing split diacritics through the AI when enabled.
    async fn prepare_text(&self, article: &str, text: &str) -> String {
        let cleaned = clean_text(text);
        if !self.repair_encoding || !has_encoding_damage(&cleaned) {
            return cleaned;
        }
        match self.ai.invoke_text(AiTask::TextProcessing, &cleaned).await {
            Ok(repaired) if !repaired.trim().is_empty() => clean_text(&repaired),
            Ok(_) => {
                tracing::warn!(article = %article, "encoding repair returned nothing, using cleaned text");
                cleaned
            }
            Err(e) => {
                tracing::warn!(article = %article, error = %e, "encoding repair failed, using cleaned text");
                cleaned
            }
        }
    }

    /// Page end from the page count, and the DOI from the configured prefix.
    fn apply_derived(&self, record: &mut MergedRecord, page_count: usize) {
        let page_from = record.text(fields::PAGE_FROM).parse::<u32>().ok();
        if let Some(from) = page_from
            && record.is_blank(fields::PAGE_TO)
        {
            match derive_page_to(from, page_count) {
                Some(to) => record.set(fields::PAGE_TO, to.to_string()),
                None => tracing::debug!(page_from = from, page_count, "page end not derivable"),
            }
        }

        if let (Some(prefix), Some(year), Some(from)) = (&self.doi_prefix, &self.year, page_from) {
            record.set(fields::DOI, format!("{}{}.{}", prefix, year, from));
        }
    }
}

/// Case-insensitive section abbreviation match.
pub(crate) fn section_listed(sections: &[String], section: &str) -> bool {
    sections.iter().any(|s| s.trim().eq_ignore_ascii_case(section.trim()))
}

/// Last page of an article starting at `from` that spans `page_count` pages.
///
/// `None` for an empty article or a range past `u32::MAX`.
fn derive_page_to(from: u32, page_count: usize) -> Option<u32> {
    let span = u32::try_from(page_count).ok()?.checked_sub(1)?;
    from.checked_add(span)
}

/// Merge the AI record over the HTML partial.
///
/// Non-empty AI values win for overlapping fields (title, section); page
/// ranges come from the HTML partial unchanged.
pub fn merge_partial(mut ai: MergedRecord, html: &HtmlPartial) -> MergedRecord {
    if ai.is_blank(fields::TITLE_ORIG) && !html.title.trim().is_empty() {
        ai.set(fields::TITLE_ORIG, html.title.trim());
    }
    if ai.is_blank(fields::SECTION) && !html.section.is_empty() {
        ai.set(fields::SECTION, html.section.clone());
    }
    if let Some(from) = html.page_from {
        ai.set(fields::PAGE_FROM, from.to_string());
    }
    if let Some(to) = html.page_to {
        ai.set(fields::PAGE_TO, to.to_string());
    }
    ai
}

/// Accept `{...}`, `{"article": {...}}` or `[{...}]` from the metadata task.
fn metadata_record(response: Value) -> Result<MergedRecord, AiError> {
    let raw = response.to_string();
    let candidate = match response {
        Value::Object(mut map) if map.len() == 1 && map.get("article").is_some_and(Value::is_object) => {
            map.remove("article").unwrap_or_default()
        }
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => items.remove(0),
        other => other,
    };
    MergedRecord::from_value(candidate)
        .ok_or_else(|| AiError::malformed("metadata response is not a JSON object", raw))
}

/// Reference entries from `[...]` or `{"references": [...]}`; anything else is
/// an empty bibliography.
fn reference_entries(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(fields::REFERENCES) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
