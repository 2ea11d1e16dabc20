use serde::{Deserialize, Serialize};

/// Partial metadata read from the proceedings' table of contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlPartial {
    pub title: String,
    /// Section abbreviation (`EDT`, `ART-C`, `ART-R`).
    pub section: String,
    pub page_from: Option<u32>,
    pub page_to: Option<u32>,
}

/// Everything the pipeline needs about one article before extraction.
#[derive(Debug, Clone, Default)]
pub struct ArticleSource {
    /// Source identifier, unique within a run.
    pub id: String,
    /// Extracted text, one entry per PDF page.
    pub pages: Vec<String>,
    pub html: HtmlPartial,
}

impl ArticleSource {
    pub fn new(id: impl Into<String>, pages: Vec<String>, html: HtmlPartial) -> Self {
        Self {
            id: id.into(),
            pages,
            html,
        }
    }

    /// Best available label for logs before extraction has produced a title.
    pub fn label(&self) -> &str {
        if self.html.title.is_empty() {
            &self.id
        } else {
            &self.html.title
        }
    }
}
