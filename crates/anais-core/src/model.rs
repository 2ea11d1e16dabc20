//! Domain entities produced by the pipeline.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::record::MergedRecord;

/// One author of one article. Authors are never shared across articles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    #[serde(deserialize_with = "lenient_string")]
    pub author_first_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_middle_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_last_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_affiliation: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_affiliation_en: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_country: String,
    #[serde(deserialize_with = "lenient_string")]
    pub author_email: String,
    #[serde(deserialize_with = "lenient_string")]
    pub orcid: String,
}

impl Author {
    /// Display name assembled from the name parts.
    pub fn full_name(&self) -> String {
        [
            self.author_first_name.as_str(),
            self.author_middle_name.as_str(),
            self.author_last_name.as_str(),
        ]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// One bibliography entry of one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    /// Full citation text. Never empty on a built article.
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub doi: String,
    #[serde(deserialize_with = "lenient_string")]
    pub link: String,
    #[serde(deserialize_with = "lenient_string")]
    pub accessed: String,
}

/// A validated article ready for emission.
///
/// Every scalar field is present; missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    /// 1-based position of the article in the run's source list. Assigned by
    /// the migrator, never read from extracted records.
    #[serde(skip_deserializing)]
    pub seq: usize,
    /// Source identifier (the PDF file stem on the legacy site).
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title_orig: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title_en: String,
    #[serde(deserialize_with = "lenient_string")]
    pub abstract_orig: String,
    #[serde(deserialize_with = "lenient_string")]
    pub abstract_en: String,
    #[serde(deserialize_with = "lenient_string")]
    pub keywords_orig: String,
    #[serde(deserialize_with = "lenient_string")]
    pub keywords_en: String,
    #[serde(deserialize_with = "lenient_string")]
    pub doi: String,
    #[serde(deserialize_with = "lenient_string")]
    pub language: String,
    #[serde(deserialize_with = "lenient_string")]
    pub section: String,
    #[serde(deserialize_with = "lenient_string")]
    pub page_from: String,
    #[serde(deserialize_with = "lenient_string")]
    pub page_to: String,
    #[serde(deserialize_with = "lenient_list")]
    pub authors: Vec<Author>,
    #[serde(deserialize_with = "lenient_list")]
    pub references: Vec<Reference>,
}

/// Conversion between typed entities and the untyped record representation.
///
/// Implemented for every serde type, so entities and records share one mapping.
pub trait RecordConvert: Sized {
    fn to_record(&self) -> MergedRecord;
    fn from_record(record: &MergedRecord) -> Result<Self, serde_json::Error>;
}

impl<T: Serialize + DeserializeOwned> RecordConvert for T {
    fn to_record(&self) -> MergedRecord {
        serde_json::to_value(self)
            .ok()
            .and_then(MergedRecord::from_value)
            .unwrap_or_default()
    }

    fn from_record(record: &MergedRecord) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record.clone().into_value())
    }
}

/// Accept strings, numbers, booleans and null; models are loose about scalar types.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::trim))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    })
}

/// Accept a list of objects, skipping entries that do not fit the item type.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed list entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    })
}
