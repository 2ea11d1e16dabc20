use std::path::{Path, PathBuf};

use anais_core::{Article, MigrationReport, RecordConvert};
use serde::Serialize;
use serde_json::json;

use crate::ExportError;
use crate::headers::CsvHeaders;

pub const ARTICLES_CSV: &str = "articles.csv";
pub const AUTHORS_CSV: &str = "authors.csv";
pub const REFERENCES_CSV: &str = "references.csv";
pub const ARTICLES_JSON: &str = "articles.json";
pub const FAILURES_JSON: &str = "failures.json";
/// Prefix of the CSV set written from the pre-correction snapshot.
pub const SNAPSHOT_PREFIX: &str = "before_";

const DELIMITER: char = ';';

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(DELIMITER) || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let row: Vec<String> = cells.map(|c| csv_escape(&c)).collect();
    out.push_str(&row.join(";"));
    out.push('\n');
}

/// One row per article. `seq` is the article's position in the run, shared
/// with the failure log, so gaps mark articles that were not migrated.
pub fn articles_csv(articles: &[Article], headers: &[String]) -> String {
    let mut out = String::new();
    push_row(&mut out, headers.iter().cloned());
    for article in articles {
        let record = article.to_record();
        push_row(&mut out, headers.iter().map(|h| record.text(h)));
    }
    out
}

/// Rows for a child entity, keyed by the owning article's `seq` and the
/// child's 1-based `order`.
fn child_csv<T: RecordConvert>(
    articles: &[Article],
    headers: &[String],
    children: impl Fn(&Article) -> &[T],
) -> String {
    let mut out = String::new();
    push_row(&mut out, headers.iter().cloned());
    for article in articles {
        let seq = article.seq.to_string();
        for (j, child) in children(article).iter().enumerate() {
            let record = child.to_record();
            push_row(
                &mut out,
                headers.iter().map(|h| match h.as_str() {
                    "article" => seq.clone(),
                    "order" => (j + 1).to_string(),
                    name => record.text(name),
                }),
            );
        }
    }
    out
}

pub fn authors_csv(articles: &[Article], headers: &[String]) -> String {
    child_csv(articles, headers, |a| a.authors.as_slice())
}

pub fn references_csv(articles: &[Article], headers: &[String]) -> String {
    child_csv(articles, headers, |a| a.references.as_slice())
}

/// Write the three CSV files into `dir`, each name prefixed with `prefix`.
pub fn write_csv_set(
    dir: &Path,
    prefix: &str,
    articles: &[Article],
    headers: &CsvHeaders,
) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let files = [
        (ARTICLES_CSV, articles_csv(articles, &headers.articles)),
        (AUTHORS_CSV, authors_csv(articles, &headers.authors)),
        (REFERENCES_CSV, references_csv(articles, &headers.references)),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = dir.join(format!("{}{}", prefix, name));
        std::fs::write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}

/// Failure log, notes, affiliation audit and sources that never entered the
/// pipeline, as one JSON document.
pub fn write_audit<M: Serialize>(
    path: &Path,
    report: &MigrationReport,
    missing: &[M],
) -> Result<(), ExportError> {
    let audit = json!({
        "migrated": report.articles.len(),
        "cancelled": report.cancelled,
        "failures": report.failures,
        "notes": report.notes,
        "affiliation": report.affiliation,
        "missingSources": missing,
    });
    std::fs::write(path, serde_json::to_string_pretty(&audit)?)?;
    Ok(())
}

/// Write every output of a run into `dir`.
///
/// With `snapshot`, the pre-correction corpus is also written as a
/// `before_`-prefixed CSV set.
pub fn export_run<M: Serialize>(
    dir: &Path,
    report: &MigrationReport,
    headers: &CsvHeaders,
    snapshot: bool,
    missing: &[M],
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = write_csv_set(dir, "", &report.articles, headers)?;
    if snapshot {
        written.extend(write_csv_set(dir, SNAPSHOT_PREFIX, &report.snapshot, headers)?);
    }

    let articles_path = dir.join(ARTICLES_JSON);
    std::fs::write(&articles_path, serde_json::to_string_pretty(&report.articles)?)?;
    written.push(articles_path);

    let audit_path = dir.join(FAILURES_JSON);
    write_audit(&audit_path, report, missing)?;
    written.push(audit_path);

    tracing::info!(dir = %dir.display(), files = written.len(), "export finished");
    Ok(written)
}
