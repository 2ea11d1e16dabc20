//! Corpus-wide affiliation normalization.
//!
//! Distinct `(authorAffiliation, authorAffiliationEn)` pairs are collected
//! from every author, corrected in chunks, and the resulting lookup is applied
//! back to all authors. Responses are correlated by the original affiliation
//! value, never by position.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};

use crate::ProgressEvent;
use crate::ai::{AiClient, AiError, AiTask};
use crate::model::Article;

/// An affiliation as written on an author record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AffiliationPair {
    #[serde(rename = "authorAffiliation")]
    pub affiliation: String,
    #[serde(rename = "authorAffiliationEn")]
    pub affiliation_en: String,
}

impl AffiliationPair {
    pub fn new(affiliation: impl Into<String>, affiliation_en: impl Into<String>) -> Self {
        Self {
            affiliation: affiliation.into(),
            affiliation_en: affiliation_en.into(),
        }
    }

    fn is_empty(&self) -> bool {
        self.affiliation.trim().is_empty() && self.affiliation_en.trim().is_empty()
    }
}

/// Distinct non-empty pairs across all authors, in first-seen order.
pub fn distinct_pairs(articles: &[Article]) -> Vec<AffiliationPair> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for author in articles.iter().flat_map(|a| &a.authors) {
        let pair = AffiliationPair::new(
            author.author_affiliation.clone(),
            author.author_affiliation_en.clone(),
        );
        if !pair.is_empty() && seen.insert(pair.clone()) {
            pairs.push(pair);
        }
    }
    pairs
}

/// Original pair → normalized pair. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct AffiliationLookup {
    map: HashMap<AffiliationPair, AffiliationPair>,
}

impl AffiliationLookup {
    pub fn get(&self, original: &AffiliationPair) -> Option<&AffiliationPair> {
        self.map.get(original)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rewrite every author whose original pair has a correction. Returns the
    /// number of authors updated. Order and membership are untouched.
    pub fn apply(&self, articles: &mut [Article]) -> usize {
        let mut updated = 0;
        for author in articles.iter_mut().flat_map(|a| a.authors.iter_mut()) {
            let original = AffiliationPair::new(
                author.author_affiliation.clone(),
                author.author_affiliation_en.clone(),
            );
            if let Some(fixed) = self.map.get(&original) {
                author.author_affiliation = fixed.affiliation.clone();
                author.author_affiliation_en = fixed.affiliation_en.clone();
                updated += 1;
            }
        }
        updated
    }
}

impl FromIterator<(AffiliationPair, AffiliationPair)> for AffiliationLookup {
    fn from_iter<I: IntoIterator<Item = (AffiliationPair, AffiliationPair)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Correlated answer for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkCorrection {
    pub corrected: Vec<(AffiliationPair, AffiliationPair)>,
    /// Requested pairs the response did not cover; they stay unchanged.
    pub dropped: Vec<AffiliationPair>,
    /// Response entries matching no requested pair; ignored.
    pub extras: Vec<String>,
}

/// Response entries from `[...]` or an object holding one list.
fn response_entries(response: &Value) -> Option<&Vec<Value>> {
    match response {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["affiliations", "universidades", "items"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array)),
        _ => None,
    }
}

fn entry_text<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str).map(str::trim)
}

/// Match a chunk response back to the requested pairs by original value.
pub fn correlate(chunk: &[AffiliationPair], response: &Value) -> Result<ChunkCorrection, AiError> {
    let entries = response_entries(response).ok_or_else(|| {
        AiError::malformed("affiliation response holds no list", response.to_string())
    })?;

    let mut resolved: HashMap<&AffiliationPair, AffiliationPair> = HashMap::new();
    let mut extras = Vec::new();

    for entry in entries {
        let Some(original) = entry_text(entry, "originalAuthorAffiliation") else {
            extras.push(entry.to_string());
            continue;
        };
        let original_en = entry_text(entry, "originalAuthorAffiliationEn");

        // An entry names its pair by the original affiliation; the English
        // original narrows it when several pairs share that affiliation.
        let candidates: Vec<&AffiliationPair> = chunk
            .iter()
            .filter(|p| {
                let by_orig = p.affiliation.trim() == original
                    || (p.affiliation.trim().is_empty() && p.affiliation_en.trim() == original);
                by_orig && original_en.is_none_or(|en| p.affiliation_en.trim() == en)
            })
            .collect();
        if candidates.is_empty() {
            extras.push(original.to_string());
            continue;
        }

        let normalized = entry_text(entry, "authorAffiliation").unwrap_or("");
        let normalized_en = entry_text(entry, "authorAffiliationEn").unwrap_or("");
        if normalized.is_empty() && normalized_en.is_empty() {
            continue;
        }

        for pair in candidates {
            if resolved.contains_key(pair) {
                continue;
            }
            // A side the model left empty keeps its original value.
            let fixed = AffiliationPair::new(
                if normalized.is_empty() { pair.affiliation.clone() } else { normalized.to_string() },
                if normalized_en.is_empty() { pair.affiliation_en.clone() } else { normalized_en.to_string() },
            );
            resolved.insert(pair, fixed);
        }
    }

    let mut correction = ChunkCorrection {
        extras,
        ..Default::default()
    };
    for pair in chunk {
        match resolved.remove(pair) {
            Some(fixed) => correction.corrected.push((pair.clone(), fixed)),
            None => correction.dropped.push(pair.clone()),
        }
    }
    Ok(correction)
}

/// A chunk whose correction failed after retries.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub pairs: Vec<AffiliationPair>,
    pub error: String,
}

/// Audit summary of one correction run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AffiliationReport {
    pub distinct_pairs: usize,
    pub chunks: usize,
    pub corrected_pairs: usize,
    pub authors_updated: usize,
    pub dropped: Vec<AffiliationPair>,
    pub extra_entries: Vec<String>,
    pub failed_chunks: Vec<ChunkFailure>,
}

pub struct AffiliationCorrector {
    ai: Arc<AiClient>,
    chunk_size: usize,
    concurrency: usize,
}

impl AffiliationCorrector {
    pub fn new(ai: Arc<AiClient>, chunk_size: usize, concurrency: usize) -> Self {
        Self {
            ai,
            chunk_size: chunk_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Correct affiliations across the whole corpus in place.
    ///
    /// The lookup is built from a snapshot of all authors before anything is
    /// rewritten; failed chunks leave their affiliations as they were.
    pub async fn correct(
        &self,
        articles: &mut [Article],
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> AffiliationReport {
        let pairs = distinct_pairs(articles);
        let (lookup, mut report) = self.build_lookup(&pairs, progress).await;
        report.authors_updated = lookup.apply(articles);
        tracing::info!(
            pairs = report.distinct_pairs,
            corrected = report.corrected_pairs,
            authors = report.authors_updated,
            failed_chunks = report.failed_chunks.len(),
            "affiliation correction finished"
        );
        report
    }

    /// Correct `pairs` chunk by chunk and assemble the lookup.
    pub async fn build_lookup(
        &self,
        pairs: &[AffiliationPair],
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> (AffiliationLookup, AffiliationReport) {
        let chunks: Vec<&[AffiliationPair]> = pairs.chunks(self.chunk_size).collect();
        let total = chunks.len();
        let mut report = AffiliationReport {
            distinct_pairs: pairs.len(),
            chunks: total,
            ..Default::default()
        };
        if total == 0 {
            return (AffiliationLookup::default(), report);
        }
        progress(ProgressEvent::AffiliationStarted {
            pairs: pairs.len(),
            chunks: total,
        });

        let results: Vec<(usize, Result<ChunkCorrection, AiError>)> =
            futures_util::stream::iter(chunks.iter().enumerate())
                .map(|(i, chunk)| async move { (i, self.correct_chunk(chunk).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut ordered: Vec<Option<Result<ChunkCorrection, AiError>>> = vec![None; total];
        for (i, result) in results {
            ordered[i] = Some(result);
        }

        let mut entries = Vec::new();
        for (i, result) in ordered.into_iter().enumerate() {
            match result {
                Some(Ok(correction)) => {
                    for pair in &correction.dropped {
                        tracing::warn!(
                            chunk = i,
                            affiliation = %pair.affiliation,
                            "affiliation missing from correction response, keeping original"
                        );
                    }
                    for extra in &correction.extras {
                        tracing::warn!(chunk = i, entry = %extra, "ignoring unrequested affiliation entry");
                    }
                    progress(ProgressEvent::ChunkFinished {
                        index: i,
                        total,
                        corrected: correction.corrected.len(),
                        dropped: correction.dropped.len(),
                    });
                    report.corrected_pairs += correction.corrected.len();
                    report.dropped.extend(correction.dropped);
                    report.extra_entries.extend(correction.extras);
                    entries.extend(correction.corrected);
                }
                Some(Err(e)) => {
                    tracing::warn!(chunk = i, error = %e, "affiliation chunk left uncorrected");
                    progress(ProgressEvent::ChunkFailed {
                        index: i,
                        total,
                        error: e.to_string(),
                    });
                    report.failed_chunks.push(ChunkFailure {
                        chunk: i,
                        pairs: chunks[i].to_vec(),
                        error: e.to_string(),
                    });
                }
                None => {}
            }
        }

        (entries.into_iter().collect(), report)
    }

    async fn correct_chunk(&self, chunk: &[AffiliationPair]) -> Result<ChunkCorrection, AiError> {
        let input = json!(chunk).to_string();
        self.ai
            .invoke_validated(AiTask::AuthorAffiliationCorrection, &input, |response| {
                correlate(chunk, &response)
            })
            .await
    }
}
