use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

// Re-export domain types for convenience
pub use anais_core::{ArticleSource, BackendError, PdfBackend};
pub use anais_html::TocEntry;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("table of contents error: {0}")]
    Toc(#[from] anais_html::HtmlError),
    #[error("article directory not found: {0}")]
    MissingDir(PathBuf),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of anais-ingest)")]
    NoPdfSupport,
}

/// A TOC entry that could not be turned into a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingSource {
    pub seq: usize,
    pub id: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub sources: Vec<ArticleSource>,
    pub missing: Vec<MissingSource>,
}

/// Where the text of one article lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFile {
    /// Pre-extracted text, pages separated by form feeds.
    Text(PathBuf),
    Pdf(PathBuf),
}

/// Locate `<id>.txt` (preferred) or `<id>.pdf` in `dir`.
pub fn locate(dir: &Path, id: &str) -> Option<TextFile> {
    let txt = dir.join(format!("{}.txt", id));
    if txt.is_file() {
        return Some(TextFile::Text(txt));
    }
    let pdf = dir.join(format!("{}.pdf", id));
    pdf.is_file().then_some(TextFile::Pdf(pdf))
}

/// Split pre-extracted text into pages on form feeds.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn read_pages(file: &TextFile, backend: &dyn PdfBackend) -> Result<Vec<String>, BackendError> {
    match file {
        TextFile::Text(path) => Ok(split_pages(&std::fs::read_to_string(path)?)),
        TextFile::Pdf(path) => backend.extract_pages(path),
    }
}

/// Join TOC entries with their article text from `dir`.
///
/// Entries without a file, or whose file yields no text, are reported in
/// [`IngestReport::missing`] and left out of the sources.
pub fn load_sources(
    entries: &[TocEntry],
    dir: &Path,
    backend: &dyn PdfBackend,
) -> Result<IngestReport, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDir(dir.to_path_buf()));
    }

    let mut report = IngestReport::default();
    for entry in entries {
        let id = entry.id();
        let missing = |reason: String| MissingSource {
            seq: entry.seq,
            id: id.clone(),
            title: entry.title.clone(),
            reason,
        };

        let Some(file) = locate(dir, &id) else {
            tracing::warn!(article = %id, title = %entry.title, "no PDF or text file found");
            report.missing.push(missing(format!("no {id}.pdf or {id}.txt in {}", dir.display())));
            continue;
        };

        match read_pages(&file, backend) {
            Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => {
                tracing::debug!(article = %id, pages = pages.len(), "loaded article text");
                report
                    .sources
                    .push(ArticleSource::new(id.clone(), pages, entry.to_partial()));
            }
            Ok(_) => {
                tracing::warn!(article = %id, "article file has no text");
                report.missing.push(missing("file has no extractable text".into()));
            }
            Err(e) => {
                tracing::warn!(article = %id, error = %e, "failed to read article file");
                report.missing.push(missing(e.to_string()));
            }
        }
    }
    Ok(report)
}

/// Parse the TOC page and load at most `limit` articles from `dir` with the
/// MuPDF backend.
#[cfg(feature = "pdf")]
pub fn ingest(toc: &Path, dir: &Path, limit: Option<usize>) -> Result<IngestReport, IngestError> {
    let backend = anais_pdf_mupdf::MupdfBackend::default();
    ingest_with(toc, dir, limit, &backend)
}

#[cfg(not(feature = "pdf"))]
pub fn ingest(_toc: &Path, _dir: &Path, _limit: Option<usize>) -> Result<IngestReport, IngestError> {
    Err(IngestError::NoPdfSupport)
}

pub fn ingest_with(
    toc: &Path,
    dir: &Path,
    limit: Option<usize>,
    backend: &dyn PdfBackend,
) -> Result<IngestReport, IngestError> {
    let mut entries = anais_html::load_toc(toc)?;
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    load_sources(&entries, dir, backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that reads a fake "PDF" whose pages are separated by `---`.
    struct FakePdf;

    impl PdfBackend for FakePdf {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
            let content = std::fs::read_to_string(path)?;
            if content.starts_with("CORRUPT") {
                return Err(BackendError::OpenError("not a PDF".into()));
            }
            Ok(content.split("---").map(str::to_string).collect())
        }
    }

    fn entry(seq: usize, id: Option<&str>) -> TocEntry {
        TocEntry {
            seq,
            section_name: "Artigos Completos".into(),
            section: "ART-C".into(),
            title: format!("Artigo {seq}"),
            pages: "10-12".into(),
            page_from: Some(10),
            page_to: Some(12),
            pdf_url: None,
            source_id: id.map(str::to_string),
        }
    }

    #[test]
    fn split_pages_on_form_feed() {
        assert_eq!(split_pages("a\x0cb\x0c"), ["a", "b"]);
        assert_eq!(split_pages("only"), ["only"]);
    }

    #[test]
    fn text_file_preferred_over_pdf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1017.pdf"), "pdf").unwrap();
        std::fs::write(dir.path().join("1017.txt"), "txt").unwrap();
        assert!(matches!(locate(dir.path(), "1017"), Some(TextFile::Text(_))));
        assert_eq!(locate(dir.path(), "9999"), None);
    }

    #[test]
    fn loads_sources_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), "page one---page two").unwrap();
        std::fs::write(dir.path().join("b.txt"), "first\x0csecond\x0cthird").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "CORRUPT").unwrap();
        std::fs::write(dir.path().join("d.txt"), "  \x0c ").unwrap();

        let entries = [
            entry(1, Some("a")),
            entry(2, Some("b")),
            entry(3, Some("c")),
            entry(4, Some("d")),
            entry(5, Some("e")),
            entry(6, None),
        ];
        let report = load_sources(&entries, dir.path(), &FakePdf).unwrap();

        let ids: Vec<_> = report.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(report.sources[0].pages.len(), 2);
        assert_eq!(report.sources[1].pages.len(), 3);
        assert_eq!(report.sources[1].html.title, "Artigo 2");
        assert_eq!(report.sources[1].html.page_from, Some(10));

        let missing: Vec<_> = report.missing.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(missing, ["c", "d", "e", "seq-6"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = load_sources(&[], Path::new("/nonexistent/anais"), &FakePdf).unwrap_err();
        assert!(matches!(err, IngestError::MissingDir(_)));
    }
}
