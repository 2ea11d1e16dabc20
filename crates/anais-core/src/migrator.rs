//! Run-level orchestration: per-article pipeline on a worker pool, then one
//! corpus-wide affiliation correction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::affiliation::{AffiliationCorrector, AffiliationReport};
use crate::ai::AiClient;
use crate::builder::build;
use crate::completion::FieldCompleter;
use crate::extractor::ExtractionOrchestrator;
use crate::model::Article;
use crate::pool::{ArticleJob, MigrationPool};
use crate::record::fields;
use crate::source::ArticleSource;
use crate::{Config, ProgressEvent};

/// Why an article is missing from the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ExtractionFailure,
    ValidationError,
    Timeout,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExtractionFailure => "ExtractionFailure",
            FailureKind::ValidationError => "ValidationError",
            FailureKind::Timeout => "Timeout",
            FailureKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the run-level failure log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub article_id: String,
    /// 1-based position in the run.
    pub seq: usize,
    pub kind: FailureKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Non-fatal problems on articles that still reached the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoteKind {
    ReferencesFailure,
    CompletionFailure,
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteKind::ReferencesFailure => f.write_str("ReferencesFailure"),
            NoteKind::CompletionFailure => f.write_str("CompletionFailure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleNote {
    pub article_id: String,
    pub kind: NoteKind,
    pub message: String,
}

/// An article that passed validation.
#[derive(Debug, Clone)]
pub struct MigratedArticle {
    pub article: Article,
    pub completed_fields: Vec<&'static str>,
}

/// Result of running one article through extraction, completion and building.
#[derive(Debug, Clone)]
pub struct ArticleOutcome {
    pub result: Result<MigratedArticle, FailureRecord>,
    pub notes: Vec<ArticleNote>,
}

impl ArticleOutcome {
    fn failed(
        source: &ArticleSource,
        index: usize,
        kind: FailureKind,
        reason: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            result: Err(FailureRecord {
                article_id: source.id.clone(),
                seq: index + 1,
                kind,
                reason: reason.into(),
                raw_response,
            }),
            notes: Vec::new(),
        }
    }

    pub(crate) fn cancelled(source: &ArticleSource, index: usize) -> Self {
        Self::failed(source, index, FailureKind::Cancelled, "run cancelled", None)
    }

    /// The pipeline panicked on this article.
    pub(crate) fn crashed(source: &ArticleSource, index: usize, message: &str) -> Self {
        Self::failed(
            source,
            index,
            FailureKind::ExtractionFailure,
            format!("article processing panicked: {}", message),
            None,
        )
    }
}

/// Everything a run produced, for export and audit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Validated articles in source order, after affiliation correction.
    pub articles: Vec<Article>,
    /// The same articles before affiliation correction.
    pub snapshot: Vec<Article>,
    pub failures: Vec<FailureRecord>,
    pub notes: Vec<ArticleNote>,
    /// `None` when the run was cancelled before correction.
    pub affiliation: Option<AffiliationReport>,
    pub cancelled: bool,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.articles.len() + self.failures.len()
    }
}

/// Extraction, completion and building for a single article.
pub struct ArticlePipeline {
    extractor: ExtractionOrchestrator,
    completer: FieldCompleter,
    default_language: String,
    article_timeout: Duration,
}

impl ArticlePipeline {
    pub fn new(ai: Arc<AiClient>, config: &Config) -> Self {
        Self {
            extractor: ExtractionOrchestrator::new(ai.clone(), config),
            completer: FieldCompleter::new(ai),
            default_language: config.default_language.clone(),
            article_timeout: Duration::from_secs(config.article_timeout_secs.max(1)),
        }
    }

    /// Run one article under the per-article timeout, emitting progress.
    pub async fn run(
        &self,
        source: &ArticleSource,
        index: usize,
        total: usize,
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
        cancel: &CancellationToken,
    ) -> ArticleOutcome {
        progress(ProgressEvent::ArticleStarted {
            index,
            total,
            id: source.id.clone(),
            title: source.label().to_string(),
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => ArticleOutcome::cancelled(source, index),
            result = tokio::time::timeout(self.article_timeout, self.process(source, index)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(
                            article = %source.id,
                            timeout_secs = self.article_timeout.as_secs(),
                            "article timed out"
                        );
                        ArticleOutcome::failed(
                            source,
                            index,
                            FailureKind::Timeout,
                            format!("no result after {}s", self.article_timeout.as_secs()),
                            None,
                        )
                    }
                }
            }
        };

        for note in &outcome.notes {
            progress(ProgressEvent::ArticleNote {
                id: note.article_id.clone(),
                kind: note.kind,
                message: note.message.clone(),
            });
        }
        match &outcome.result {
            Ok(migrated) => progress(ProgressEvent::ArticleFinished {
                index,
                total,
                id: source.id.clone(),
                title: migrated.article.title_orig.clone(),
                authors: migrated.article.authors.len(),
                references: migrated.article.references.len(),
                completed_fields: migrated.completed_fields.clone(),
            }),
            Err(failure) => progress(ProgressEvent::ArticleFailed {
                index,
                total,
                id: source.id.clone(),
                kind: failure.kind,
                reason: failure.reason.clone(),
            }),
        }
        outcome
    }

    async fn process(&self, source: &ArticleSource, index: usize) -> ArticleOutcome {
        let extracted = match self.extractor.extract(source).await {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(article = %source.id, error = %e, "article excluded");
                return ArticleOutcome::failed(
                    source,
                    index,
                    FailureKind::ExtractionFailure,
                    e.to_string(),
                    e.raw_response().map(str::to_string),
                );
            }
        };

        let mut notes = Vec::new();
        if let Some(e) = extracted.references_failure {
            notes.push(ArticleNote {
                article_id: source.id.clone(),
                kind: NoteKind::ReferencesFailure,
                message: e.to_string(),
            });
        }

        let completed = self.completer.complete(extracted.record).await;
        if let Some(e) = completed.failure {
            notes.push(ArticleNote {
                article_id: source.id.clone(),
                kind: NoteKind::CompletionFailure,
                message: e.to_string(),
            });
        }

        let result = match build(&completed.record, &self.default_language) {
            Ok(mut article) => {
                article.seq = index + 1;
                tracing::debug!(
                    article = %source.id,
                    title = %completed.record.text(fields::TITLE_ORIG),
                    completed = ?completed.filled,
                    "article built"
                );
                Ok(MigratedArticle {
                    article,
                    completed_fields: completed.filled,
                })
            }
            Err(e) => {
                tracing::warn!(article = %source.id, error = %e, "article rejected");
                Err(FailureRecord {
                    article_id: source.id.clone(),
                    seq: index + 1,
                    kind: FailureKind::ValidationError,
                    reason: e.to_string(),
                    raw_response: None,
                })
            }
        };

        ArticleOutcome { result, notes }
    }
}

enum Slot {
    Submitted(oneshot::Receiver<ArticleOutcome>, String),
    Done(ArticleOutcome),
}

/// Drives a whole migration run.
pub struct Migrator {
    pipeline: Arc<ArticlePipeline>,
    corrector: AffiliationCorrector,
    num_workers: usize,
}

impl Migrator {
    pub fn new(config: Config, ai: Arc<AiClient>) -> Self {
        Self {
            pipeline: Arc::new(ArticlePipeline::new(ai.clone(), &config)),
            corrector: AffiliationCorrector::new(
                ai,
                config.affiliation_chunk_size,
                config.affiliation_concurrency,
            ),
            num_workers: config.num_workers.max(1),
        }
    }

    /// Process every source, then correct affiliations across the results.
    ///
    /// Per-article failures are recorded, never propagated. Once `cancel`
    /// fires, unsubmitted and in-flight articles are logged as cancelled and
    /// affiliation correction is skipped.
    pub async fn run(
        &self,
        sources: Vec<ArticleSource>,
        progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
        cancel: CancellationToken,
    ) -> MigrationReport {
        let total = sources.len();
        let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
        tracing::info!(articles = total, workers = self.num_workers, "migration started");

        let pool = MigrationPool::new(self.pipeline.clone(), cancel.clone(), self.num_workers);

        let mut slots = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            if cancel.is_cancelled() {
                slots.push(Slot::Done(ArticleOutcome::cancelled(&source, index)));
                continue;
            }
            let (result_tx, result_rx) = oneshot::channel();
            let id = source.id.clone();
            pool.submit(ArticleJob {
                source,
                result_tx,
                index,
                total,
                progress: progress.clone(),
            })
            .await;
            slots.push(Slot::Submitted(result_rx, id));
        }

        let mut report = MigrationReport::default();
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Submitted(rx, id) => match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => ArticleOutcome {
                        result: Err(FailureRecord {
                            article_id: id,
                            seq: index + 1,
                            kind: FailureKind::Cancelled,
                            reason: "worker exited without a result".into(),
                            raw_response: None,
                        }),
                        notes: Vec::new(),
                    },
                },
            };
            report.notes.extend(outcome.notes);
            match outcome.result {
                Ok(migrated) => report.articles.push(migrated.article),
                Err(failure) => report.failures.push(failure),
            }
        }

        pool.shutdown().await;

        report.snapshot = report.articles.clone();
        report.cancelled = cancel.is_cancelled();
        if report.cancelled {
            tracing::warn!("run cancelled, skipping affiliation correction");
        } else {
            report.affiliation = Some(
                self.corrector
                    .correct(&mut report.articles, progress.as_ref())
                    .await,
            );
        }

        tracing::info!(
            migrated = report.articles.len(),
            failed = report.failures.len(),
            notes = report.notes.len(),
            "migration finished"
        );
        report
    }
}
