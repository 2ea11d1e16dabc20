use once_cell::sync::Lazy;
use regex::Regex;

/// Page budget for the head and tail windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum number of pages read from the start of the article.
    pub head_pages: usize,
    /// Maximum number of pages read from the end of the article.
    pub tail_pages: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            head_pages: 2,
            tail_pages: 3,
        }
    }
}

/// Head and tail text of one article, plus the page indices each window covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageWindows {
    pub head: String,
    pub tail: String,
    pub head_pages: Vec<usize>,
    pub tail_pages: Vec<usize>,
}

static INTRODUCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bintrodu(?:ção|cao|çao|cão|ction)\b").unwrap());

static BIBLIOGRAPHY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:refer[êe]ncias?|references|bibliograf[ií]a|bibliography)\b").unwrap()
});

/// Whether a page contains an introduction heading.
pub fn has_introduction(page: &str) -> bool {
    INTRODUCTION_RE.is_match(page)
}

/// Whether a page contains a bibliography heading.
pub fn has_bibliography(page: &str) -> bool {
    BIBLIOGRAPHY_RE.is_match(page)
}

/// Indices of the pages forming the head window.
///
/// Takes pages from the start, stopping after the first page that contains an
/// introduction heading: everything metadata-bearing sits before it.
fn head_indices<S: AsRef<str>>(pages: &[S], max_pages: usize) -> Vec<usize> {
    let mut indices = Vec::new();
    for (i, page) in pages.iter().enumerate().take(max_pages.max(1)) {
        indices.push(i);
        if has_introduction(page.as_ref()) {
            break;
        }
    }
    indices
}

/// Indices of the pages forming the tail window, in reading order.
///
/// Walks back from the last page and stops once a page with a bibliography
/// heading has been included, so a reference list that starts on the last
/// page does not drag in body text.
fn tail_indices<S: AsRef<str>>(pages: &[S], max_pages: usize) -> Vec<usize> {
    let mut indices = Vec::new();
    for (i, page) in pages.iter().enumerate().rev().take(max_pages.max(1)) {
        indices.push(i);
        if has_bibliography(page.as_ref()) {
            break;
        }
    }
    indices.reverse();
    indices
}

fn join_pages<S: AsRef<str>>(pages: &[S], indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| pages[i].as_ref())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text of the head window (metadata extraction input).
pub fn head_window<S: AsRef<str>>(pages: &[S], max_pages: usize) -> String {
    join_pages(pages, &head_indices(pages, max_pages))
}

/// Text of the tail window (references extraction input).
pub fn tail_window<S: AsRef<str>>(pages: &[S], max_pages: usize) -> String {
    join_pages(pages, &tail_indices(pages, max_pages))
}

/// Select both windows at once.
pub fn select_windows<S: AsRef<str>>(pages: &[S], config: &WindowConfig) -> PageWindows {
    let head_pages = head_indices(pages, config.head_pages);
    let tail_pages = tail_indices(pages, config.tail_pages);
    PageWindows {
        head: join_pages(pages, &head_pages),
        tail: join_pages(pages, &tail_pages),
        head_pages,
        tail_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn head_stops_at_introduction() {
        let doc = pages(&["Título\nResumo\n1. Introdução", "corpo", "mais corpo"]);
        let w = select_windows(&doc, &WindowConfig::default());
        assert_eq!(w.head_pages, vec![0]);
        assert!(w.head.contains("Resumo"));
    }

    #[test]
    fn head_takes_budget_without_introduction() {
        let doc = pages(&["Title page", "Abstract continues", "Body"]);
        assert_eq!(head_indices(&doc, 2), vec![0, 1]);
        assert_eq!(head_window(&doc, 2), "Title page\n\nAbstract continues");
    }

    #[test]
    fn tail_stops_at_bibliography_heading() {
        let doc = pages(&["a", "b", "c", "Referências\n[1] Silva"]);
        assert_eq!(tail_indices(&doc, 3), vec![3]);
    }

    #[test]
    fn tail_walks_back_to_heading() {
        let doc = pages(&["a", "b", "References\n[1] X", "[2] Y", "[3] Z"]);
        assert_eq!(tail_indices(&doc, 3), vec![2, 3, 4]);
        assert_eq!(tail_window(&doc, 3), "References\n[1] X\n\n[2] Y\n\n[3] Z");
    }

    #[test]
    fn tail_budget_limits_walk() {
        let doc = pages(&["Bibliografia", "b", "c", "d"]);
        assert_eq!(tail_indices(&doc, 2), vec![2, 3]);
    }

    #[test]
    fn single_page_document_feeds_both_windows() {
        let doc = pages(&["Editorial text"]);
        let w = select_windows(&doc, &WindowConfig::default());
        assert_eq!(w.head, "Editorial text");
        assert_eq!(w.tail, "Editorial text");
    }

    #[test]
    fn empty_document_yields_empty_windows() {
        let doc: Vec<String> = Vec::new();
        let w = select_windows(&doc, &WindowConfig::default());
        assert!(w.head.is_empty());
        assert!(w.tail.is_empty());
    }

    #[test]
    fn zero_budget_still_reads_one_page() {
        let doc = pages(&["first", "last"]);
        assert_eq!(head_window(&doc, 0), "first");
        assert_eq!(tail_window(&doc, 0), "last");
    }

    #[test]
    fn heading_detection_is_case_insensitive() {
        assert!(has_introduction("1 INTRODUCTION"));
        assert!(has_introduction("1. Introducao"));
        assert!(has_bibliography("REFERÊNCIAS"));
        assert!(!has_bibliography("referenced elsewhere"));
    }
}
