//! End-to-end runs of the [`Migrator`] against a scripted AI backend.
//!
//! The head-window handler keys its answer off an `ID:<name>` marker on the
//! first page of each synthetic article, so one mock can serve a whole corpus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anais_core::ai::mock::{MockAi, MockResponse};
use anais_core::{
    AiClient, AiTask, ArticleSource, Config, FailureKind, HtmlPartial, Migrator, NoteKind,
    ProgressEvent, RetryPolicy,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const UFSC_RAW: &str = "Laboratório X – Universidade Federal de Santa Catarina (UFSC)";
const UFSC: &str = "Universidade Federal de Santa Catarina (UFSC)";

fn source(id: &str, section: &str, with_bibliography: bool) -> ArticleSource {
    let mut pages = vec![
        format!("ID:{id} Resumo do artigo. 1. Introdução Texto inicial."),
        "Desenvolvimento do trabalho.".to_string(),
    ];
    if with_bibliography {
        pages.push("Referências Silva, J. (2020). Um estudo sobre jogos.".to_string());
    }
    ArticleSource::new(
        id,
        pages,
        HtmlPartial {
            title: format!("Sumário {id}"),
            section: section.into(),
            page_from: Some(10),
            page_to: None,
        },
    )
}

fn author(first: &str, affiliation: &str) -> Value {
    json!({
        "authorFirstName": first,
        "authorLastName": "Souza",
        "authorAffiliation": affiliation,
        "authorAffiliationEn": "",
        "authorCountry": "BR"
    })
}

fn head_response(input: &str) -> MockResponse {
    let id = input
        .split_whitespace()
        .find_map(|w| w.strip_prefix("ID:"))
        .unwrap_or("unknown");
    let affiliation = match id {
        "lost" => "Instituto Perdido",
        "failing" => "Instituto Falho",
        _ => UFSC_RAW,
    };
    match id {
        "explode" => panic!("scripted backend failure for {id}"),
        "huge-page" => MockResponse::Json(json!({
            "titleOrig": "Título huge-page",
            "pageFrom": "4294967295",
            "authors": [author("Ana", UFSC_RAW)]
        })),
        "broken" => MockResponse::Text("Sorry, I can't help with that document.".into()),
        "slow" => MockResponse::Hang,
        "untitled" => MockResponse::Json(json!({"titleOrig": "", "titleEn": ""})),
        _ => MockResponse::Json(json!({
            "titleOrig": format!("Título {id}"),
            "titleEn": if id == "needs-title" { "".to_string() } else { format!("Title {id}") },
            "abstractOrig": "Resumo.",
            "abstractEn": "Abstract.",
            "keywordsOrig": "jogos, ensino",
            "keywordsEn": "games, teaching",
            "language": "pt-BR",
            "authors": [author("Ana", affiliation), author("Bruno", UFSC_RAW)]
        })),
    }
}

fn references_response(input: &str) -> MockResponse {
    if input.contains("Referências") {
        MockResponse::Json(json!({
            "references": [{"description": "Silva, J. (2020). Um estudo sobre jogos."}]
        }))
    } else {
        MockResponse::Json(json!([]))
    }
}

/// Corrects the UFSC spelling, omits "Instituto Perdido" and fails any chunk
/// containing "Instituto Falho".
fn affiliation_response(input: &str) -> MockResponse {
    if input.contains("Instituto Falho") {
        return MockResponse::Error("upstream 500".into());
    }
    let pairs: Vec<Value> = serde_json::from_str(input).unwrap_or_default();
    let entries: Vec<Value> = pairs
        .iter()
        .filter_map(|p| {
            let original = p["authorAffiliation"].as_str()?;
            if original == "Instituto Perdido" {
                return None;
            }
            let normalized = if original.contains("UFSC") { UFSC } else { original };
            Some(json!({
                "originalAuthorAffiliation": original,
                "originalAuthorAffiliationEn": p["authorAffiliationEn"],
                "authorAffiliation": normalized,
                "authorAffiliationEn": normalized
            }))
        })
        .collect();
    MockResponse::Json(json!({ "affiliations": entries }))
}

fn scripted_mock() -> MockAi {
    MockAi::new()
        .handler(AiTask::ArticleExtraction, head_response)
        .handler(AiTask::ReferencesExtraction, references_response)
        .handler(AiTask::AuthorAffiliationCorrection, affiliation_response)
        .respond(
            AiTask::FieldCompletion,
            MockResponse::Json(json!({"titleEn": "Translated title"})),
        )
}

fn client(mock: Arc<MockAi>) -> Arc<AiClient> {
    Arc::new(
        AiClient::new(mock)
            .with_retry(RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(50),
                retry_malformed: true,
            })
            .with_call_timeout(Duration::from_secs(120)),
    )
}

fn config() -> Config {
    Config {
        num_workers: 2,
        article_timeout_secs: 30,
        affiliation_chunk_size: 2,
        affiliation_concurrency: 2,
        ..Config::default()
    }
}

async fn run(mock: Arc<MockAi>, sources: Vec<ArticleSource>) -> anais_core::MigrationReport {
    Migrator::new(config(), client(mock))
        .run(sources, |_| {}, CancellationToken::new())
        .await
}

#[tokio::test(start_paused = true)]
async fn malformed_head_response_lands_in_failure_log() {
    let mock = Arc::new(scripted_mock());
    let report = run(
        mock,
        vec![
            source("first", "ART-C", true),
            source("broken", "ART-C", true),
            source("third", "ART-R", true),
        ],
    )
    .await;

    let ids: Vec<_> = report.articles.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["first", "third"]);
    let seqs: Vec<_> = report.articles.iter().map(|a| a.seq).collect();
    assert_eq!(seqs, [1, 3]);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.article_id, "broken");
    assert_eq!(failure.seq, 2);
    assert_eq!(failure.kind, FailureKind::ExtractionFailure);
    assert!(
        failure
            .raw_response
            .as_deref()
            .is_some_and(|raw| raw.contains("Sorry"))
    );
}

#[tokio::test(start_paused = true)]
async fn shared_affiliation_converges_to_one_normalized_value() {
    let mock = Arc::new(scripted_mock());
    let report = run(
        mock.clone(),
        vec![source("a", "ART-C", true), source("b", "ART-C", true)],
    )
    .await;

    let affiliations: Vec<_> = report
        .articles
        .iter()
        .flat_map(|a| a.authors.iter())
        .map(|au| au.author_affiliation.as_str())
        .collect();
    assert_eq!(affiliations, [UFSC, UFSC, UFSC, UFSC]);

    // The snapshot still holds the values as extracted.
    assert!(
        report
            .snapshot
            .iter()
            .flat_map(|a| a.authors.iter())
            .all(|au| au.author_affiliation == UFSC_RAW)
    );

    // One distinct pair means one chunk and one call.
    assert_eq!(mock.call_count(AiTask::AuthorAffiliationCorrection), 1);
    let affiliation = report.affiliation.unwrap();
    assert_eq!(affiliation.distinct_pairs, 1);
    assert_eq!(affiliation.authors_updated, 4);
}

#[tokio::test(start_paused = true)]
async fn omitted_affiliation_keeps_original_value() {
    let mock = Arc::new(scripted_mock());
    let report = run(mock, vec![source("lost", "ART-C", true)]).await;

    let authors = &report.articles[0].authors;
    assert_eq!(authors[0].author_affiliation, "Instituto Perdido");
    assert_eq!(authors[1].author_affiliation, UFSC);

    let affiliation = report.affiliation.unwrap();
    assert_eq!(affiliation.dropped.len(), 1);
    assert_eq!(affiliation.dropped[0].affiliation, "Instituto Perdido");
    assert!(affiliation.failed_chunks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_chunk_is_left_uncorrected() {
    let mock = Arc::new(scripted_mock());
    let report = run(mock.clone(), vec![source("failing", "ART-C", true)]).await;

    let authors = &report.articles[0].authors;
    assert_eq!(authors[0].author_affiliation, "Instituto Falho");
    // Chunk size is 2, so both pairs share the failed chunk.
    assert_eq!(authors[1].author_affiliation, UFSC_RAW);

    let affiliation = report.affiliation.unwrap();
    assert_eq!(affiliation.failed_chunks.len(), 1);
    assert_eq!(affiliation.failed_chunks[0].pairs.len(), 2);
    assert_eq!(mock.call_count(AiTask::AuthorAffiliationCorrection), 2);
}

async fn run_single_worker(sources: Vec<ArticleSource>) -> anais_core::MigrationReport {
    let config = Config {
        num_workers: 1,
        ..config()
    };
    let migrator = Migrator::new(config, client(Arc::new(scripted_mock())));
    let run = migrator.run(sources, |_| {}, CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(3600), run)
        .await
        .expect("run finished")
}

#[tokio::test(start_paused = true)]
async fn huge_page_start_does_not_stall_the_run() {
    let mut huge = source("huge-page", "ART-C", false);
    huge.html.page_from = None;
    let report = run_single_worker(vec![huge, source("after", "ART-C", false)]).await;

    let ids: Vec<_> = report.articles.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["huge-page", "after"]);
    assert_eq!(report.articles[0].page_from, "4294967295");
    assert_eq!(report.articles[0].page_to, "");
    assert!(report.failures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn panicking_article_becomes_a_failure_and_the_worker_continues() {
    let report = run_single_worker(vec![
        source("explode", "ART-C", false),
        source("after", "ART-C", false),
    ])
    .await;

    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.articles[0].id, "after");
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.article_id, "explode");
    assert_eq!(failure.seq, 1);
    assert_eq!(failure.kind, FailureKind::ExtractionFailure);
    assert!(failure.reason.contains("scripted backend failure"));
}

#[tokio::test(start_paused = true)]
async fn article_timeout_is_isolated() {
    let mock = Arc::new(scripted_mock());
    let report = run(
        mock,
        vec![source("slow", "ART-C", true), source("fast", "ART-C", true)],
    )
    .await;

    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.articles[0].id, "fast");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].article_id, "slow");
    assert_eq!(report.failures[0].kind, FailureKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn references_are_an_empty_list_without_bibliography() {
    let mock = Arc::new(scripted_mock());
    let report = run(
        mock.clone(),
        vec![
            source("with-refs", "ART-C", true),
            source("no-refs", "ART-R", false),
            source("editorial", "EDT", true),
        ],
    )
    .await;

    let refs: Vec<_> = report.articles.iter().map(|a| a.references.len()).collect();
    assert_eq!(refs, [1, 0, 0]);

    let json = serde_json::to_value(&report.articles[1]).unwrap();
    assert_eq!(json["references"], json!([]));

    // Editorials never reach the references task.
    assert_eq!(mock.call_count(AiTask::ReferencesExtraction), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_title_is_a_validation_error() {
    let mock = Arc::new(scripted_mock());
    let report = run(mock, vec![source("untitled", "ART-C", false)]).await;

    // The table of contents title fills in for the blank AI title.
    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.articles[0].title_orig, "Sumário untitled");

    let mut blank = source("untitled", "ART-C", false);
    blank.html.title.clear();
    let report = run(Arc::new(scripted_mock()), vec![blank]).await;
    assert!(report.articles.is_empty());
    assert_eq!(report.failures[0].kind, FailureKind::ValidationError);
}

#[tokio::test(start_paused = true)]
async fn completion_fills_title_and_failures_become_notes() {
    let mock = Arc::new(scripted_mock());
    let report = run(mock.clone(), vec![source("needs-title", "ART-C", true)]).await;

    let article = &report.articles[0];
    assert_eq!(article.title_en, "Translated title");
    assert_eq!(article.title_orig, "Título needs-title");
    assert_eq!(article.language, "pt");
    assert_eq!(mock.call_count(AiTask::FieldCompletion), 1);

    let failing = Arc::new(
        scripted_mock().respond(AiTask::FieldCompletion, MockResponse::Error("boom".into())),
    );
    let report = run(failing, vec![source("needs-title", "ART-C", true)]).await;
    assert_eq!(report.articles.len(), 1);
    assert_eq!(report.articles[0].title_en, "");
    assert_eq!(report.notes.len(), 1);
    assert_eq!(report.notes[0].kind, NoteKind::CompletionFailure);
}

#[tokio::test(start_paused = true)]
async fn output_preserves_source_order() {
    let mock = Arc::new(scripted_mock().with_delay(Duration::from_millis(5)));
    let ids: Vec<String> = (0..8).map(|i| format!("art{i}")).collect();
    let sources = ids.iter().map(|id| source(id, "ART-R", true)).collect();
    let report = run(mock, sources).await;

    let got: Vec<_> = report.articles.iter().map(|a| a.id.clone()).collect();
    assert_eq!(got, ids);
    assert_eq!(report.total(), 8);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_records_every_article_and_skips_correction() {
    let mock = Arc::new(scripted_mock());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Migrator::new(config(), client(mock.clone()))
        .run(
            vec![source("a", "ART-C", true), source("b", "ART-C", true)],
            |_| {},
            cancel,
        )
        .await;

    assert!(report.cancelled);
    assert!(report.articles.is_empty());
    assert!(report.affiliation.is_none());
    assert!(
        report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Cancelled)
    );
    assert_eq!(report.failures.len(), 2);
    assert_eq!(mock.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn progress_events_cover_articles_and_chunks() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mock = Arc::new(scripted_mock());

    Migrator::new(config(), client(mock))
        .run(
            vec![source("a", "ART-C", true), source("broken", "ART-C", true)],
            move |event| {
                let tag = match event {
                    ProgressEvent::ArticleStarted { .. } => "started",
                    ProgressEvent::ArticleFinished { .. } => "finished",
                    ProgressEvent::ArticleFailed { .. } => "failed",
                    ProgressEvent::ArticleNote { .. } => "note",
                    ProgressEvent::AffiliationStarted { .. } => "affiliation",
                    ProgressEvent::ChunkFinished { .. } => "chunk",
                    ProgressEvent::ChunkFailed { .. } => "chunk-failed",
                };
                sink.lock().unwrap().push(tag);
            },
            CancellationToken::new(),
        )
        .await;

    let events = events.lock().unwrap();
    assert_eq!(events.iter().filter(|e| **e == "started").count(), 2);
    assert_eq!(events.iter().filter(|e| **e == "finished").count(), 1);
    assert_eq!(events.iter().filter(|e| **e == "failed").count(), 1);
    assert_eq!(&events[events.len() - 2..], ["affiliation", "chunk"]);
}
