use anais_core::config_file::OutputConfig;

const ARTICLE_HEADERS: &[&str] = &[
    "seq",
    "id",
    "section",
    "language",
    "titleOrig",
    "titleEn",
    "abstractOrig",
    "abstractEn",
    "keywordsOrig",
    "keywordsEn",
    "doi",
    "pageFrom",
    "pageTo",
];

const AUTHOR_HEADERS: &[&str] = &[
    "article",
    "order",
    "authorFirstName",
    "authorMiddleName",
    "authorLastName",
    "authorAffiliation",
    "authorAffiliationEn",
    "authorCountry",
    "authorEmail",
    "orcid",
];

const REFERENCE_HEADERS: &[&str] = &["article", "order", "description", "doi", "link", "accessed"];

/// Column sets for the three CSV files.
///
/// Names are record field names plus `seq` (articles) and `article` /
/// `order` (authors, references). Unknown names yield empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvHeaders {
    pub articles: Vec<String>,
    pub authors: Vec<String>,
    pub references: Vec<String>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for CsvHeaders {
    fn default() -> Self {
        Self {
            articles: owned(ARTICLE_HEADERS),
            authors: owned(AUTHOR_HEADERS),
            references: owned(REFERENCE_HEADERS),
        }
    }
}

impl CsvHeaders {
    /// Headers from the `[output]` config section, defaults for anything unset.
    pub fn from_config(output: Option<&OutputConfig>) -> Self {
        let defaults = Self::default();
        let Some(output) = output else {
            return defaults;
        };
        Self {
            articles: output.article_headers.clone().unwrap_or(defaults.articles),
            authors: output.author_headers.clone().unwrap_or(defaults.authors),
            references: output.reference_headers.clone().unwrap_or(defaults.references),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_overrides_only_given_sets() {
        let output = OutputConfig {
            author_headers: Some(vec!["article".into(), "authorLastName".into()]),
            ..Default::default()
        };
        let headers = CsvHeaders::from_config(Some(&output));
        assert_eq!(headers.authors, ["article", "authorLastName"]);
        assert_eq!(headers.articles, CsvHeaders::default().articles);
    }
}
