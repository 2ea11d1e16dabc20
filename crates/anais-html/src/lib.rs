//! Parser for the OJS proceedings table of contents.
//!
//! The TOC page lists one `h4.tocSectionTitle` per section, each followed by
//! one table per article holding a `div.tocTitle`, a `div.tocPages` and a
//! `PDF` link. Every article becomes a [`TocEntry`].

use std::path::Path;

use anais_core::HtmlPartial;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HtmlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no section headings (h4.tocSectionTitle) found in table of contents")]
    NoSections,
}

/// One article row of the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    /// 1-based position in the TOC.
    pub seq: usize,
    /// Heading text as printed.
    pub section_name: String,
    /// `EDT`, `ART-C` or `ART-R`.
    pub section: String,
    pub title: String,
    pub pages: String,
    pub page_from: Option<u32>,
    pub page_to: Option<u32>,
    pub pdf_url: Option<String>,
    /// File stem of the PDF link, used to find the local PDF.
    pub source_id: Option<String>,
}

impl TocEntry {
    /// Identifier for the pipeline: the PDF stem, or the sequence number.
    pub fn id(&self) -> String {
        self.source_id
            .clone()
            .unwrap_or_else(|| format!("seq-{}", self.seq))
    }

    pub fn to_partial(&self) -> HtmlPartial {
        HtmlPartial {
            title: self.title.clone(),
            section: self.section.clone(),
            page_from: self.page_from,
            page_to: self.page_to,
        }
    }
}

/// Map an OJS section heading to its abbreviation.
pub fn section_abbrev(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("editorial") {
        "EDT"
    } else if lower.contains("artigos completos") || lower.contains("full papers") {
        "ART-C"
    } else {
        "ART-R"
    }
}

static PAGE_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(?:\s*[-–—]\s*(\d+))?").unwrap());

/// `"10-15"` → `(Some(10), Some(15))`, `"10"` → `(Some(10), None)`.
///
/// A range whose end precedes its start keeps only the start.
pub fn parse_page_range(text: &str) -> (Option<u32>, Option<u32>) {
    let Some(caps) = PAGE_RANGE_RE.captures(text) else {
        return (None, None);
    };
    let from = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
    let to = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|to| from.is_some_and(|from| *to >= from));
    (from, to)
}

/// Last path segment of a PDF link, without `.pdf` and percent-decoded.
///
/// `http://host/index.php/sbie/article/view/1114/1017` → `1017`.
pub fn source_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let stem = segment.strip_suffix(".pdf").unwrap_or(segment);
    if stem.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(stem)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| stem.to_string());
    Some(decoded)
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn inside_table(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(|n| n.value().as_element())
        .any(|e| e.name() == "table")
}

fn pdf_link(table: ElementRef<'_>, link_sel: &Selector) -> Option<String> {
    let links: Vec<ElementRef<'_>> = table.select(link_sel).collect();
    links
        .iter()
        .find(|a| text_of(**a).eq_ignore_ascii_case("pdf"))
        .or_else(|| {
            links.iter().find(|a| {
                a.value()
                    .attr("href")
                    .is_some_and(|h| h.contains("article/view"))
            })
        })
        .and_then(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
}

/// Parse every article entry, in page order.
pub fn parse_toc(html: &str) -> Result<Vec<TocEntry>, HtmlError> {
    let document = Html::parse_document(html);

    let block_sel = Selector::parse("h4.tocSectionTitle, table").unwrap();
    let title_sel = Selector::parse("div.tocTitle").unwrap();
    let pages_sel = Selector::parse("div.tocPages").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();

    let mut entries = Vec::new();
    let mut section: Option<String> = None;
    let mut saw_heading = false;

    for block in document.select(&block_sel) {
        if block.value().name() == "h4" {
            saw_heading = true;
            section = Some(text_of(block));
            continue;
        }
        if inside_table(block) {
            continue;
        }
        let Some(title_el) = block.select(&title_sel).next() else {
            continue;
        };
        let Some(section_name) = section.clone() else {
            tracing::debug!(title = %text_of(title_el), "skipping entry before first section heading");
            continue;
        };

        let title = text_of(title_el);
        let pages = block.select(&pages_sel).next().map(text_of).unwrap_or_default();
        let (page_from, page_to) = parse_page_range(&pages);
        let pdf_url = pdf_link(block, &link_sel);
        let source_id = pdf_url.as_deref().and_then(source_id_from_url);
        if source_id.is_none() {
            tracing::warn!(title = %title, "no PDF link in table of contents entry");
        }

        entries.push(TocEntry {
            seq: entries.len() + 1,
            section: section_abbrev(&section_name).to_string(),
            section_name,
            title,
            pages,
            page_from,
            page_to,
            pdf_url,
            source_id,
        });
    }

    if !saw_heading {
        return Err(HtmlError::NoSections);
    }
    Ok(entries)
}

/// Read and parse a saved TOC page.
pub fn load_toc(path: &Path) -> Result<Vec<TocEntry>, HtmlError> {
    let html = std::fs::read_to_string(path)?;
    parse_toc(&html)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOC: &str = r#"
<html><body>
<div id="content">
<h4 class="tocSectionTitle">Editorial</h4>
<table class="tocArticle" width="100%">
<tr valign="top">
  <td class="tocTitle"><div class="tocTitle">Apresentação</div></td>
  <td class="tocGalleys"><a href="http://host/index.php/sbie/article/view/1001/900" class="file">PDF</a></td>
</tr>
<tr><td><div class="tocAuthors">Comissão</div></td><td><div class="tocPages">1</div></td></tr>
</table>
<h4 class="tocSectionTitle">Artigos Completos</h4>
<table class="tocArticle" width="100%">
<tr valign="top">
  <td><div class="tocTitle">Ensino de   programação com jogos</div></td>
  <td><a href="http://host/index.php/sbie/article/view/1114/1017" class="file">PDF</a></td>
</tr>
<tr><td><div class="tocPages">10-19</div></td></tr>
</table>
<table class="tocArticle" width="100%">
<tr valign="top">
  <td><div class="tocTitle">Sem link</div></td>
</tr>
<tr><td><div class="tocPages">20</div></td></tr>
</table>
<h4 class="tocSectionTitle">Artigos Resumidos</h4>
<table class="tocArticle" width="100%">
<tr><td><div class="tocTitle">Pôster</div></td>
<td><a href="/files/poster%20final.pdf">PDF</a></td></tr>
<tr><td><div class="tocPages">21 – 24</div></td></tr>
</table>
</div>
</body></html>
"#;

    #[test]
    fn parses_entries_in_order() {
        let entries = parse_toc(TOC).unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Apresentação", "Ensino de programação com jogos", "Sem link", "Pôster"]
        );
        let seqs: Vec<_> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2, 3, 4]);
    }

    #[test]
    fn sections_are_abbreviated() {
        let sections: Vec<_> = parse_toc(TOC)
            .unwrap()
            .into_iter()
            .map(|e| e.section)
            .collect();
        assert_eq!(sections, ["EDT", "ART-C", "ART-C", "ART-R"]);
    }

    #[test]
    fn pages_and_source_ids() {
        let entries = parse_toc(TOC).unwrap();
        assert_eq!(entries[1].page_from, Some(10));
        assert_eq!(entries[1].page_to, Some(19));
        assert_eq!(entries[1].source_id.as_deref(), Some("1017"));
        assert_eq!(entries[2].source_id, None);
        assert_eq!(entries[2].id(), "seq-3");
        assert_eq!(entries[3].source_id.as_deref(), Some("poster final"));
        assert_eq!((entries[3].page_from, entries[3].page_to), (Some(21), Some(24)));
    }

    #[test]
    fn partial_carries_toc_fields() {
        let partial = parse_toc(TOC).unwrap()[1].to_partial();
        assert_eq!(partial.title, "Ensino de programação com jogos");
        assert_eq!(partial.section, "ART-C");
        assert_eq!(partial.page_from, Some(10));
    }

    #[test]
    fn page_range_edge_cases() {
        assert_eq!(parse_page_range("pp. 5 - 9"), (Some(5), Some(9)));
        assert_eq!(parse_page_range("12"), (Some(12), None));
        assert_eq!(parse_page_range("12-3"), (Some(12), None));
        assert_eq!(parse_page_range(""), (None, None));
    }

    #[test]
    fn section_abbrev_matches_headings() {
        assert_eq!(section_abbrev("Editorial"), "EDT");
        assert_eq!(section_abbrev("Full Papers"), "ART-C");
        assert_eq!(section_abbrev("Artigos Curtos"), "ART-R");
    }

    #[test]
    fn page_without_sections_is_an_error() {
        let err = parse_toc("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(matches!(err, HtmlError::NoSections));
    }
}
