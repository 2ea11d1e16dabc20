use std::collections::HashMap;
use std::path::Path;

use super::AiTask;
use crate::CoreError;

const ARTICLE_EXTRACTION: &str = r#"You extract bibliographic metadata from the first pages of a scientific article published in Brazilian conference proceedings.
Return a single JSON object with these keys (use "" when a value is not present in the text, never invent content):
titleOrig, titleEn, abstractOrig, abstractEn, keywordsOrig, keywordsEn, doi, language (two-letter code of the article language),
authors: a list of objects with authorFirstName, authorMiddleName, authorLastName, authorAffiliation, authorAffiliationEn, authorCountry, authorEmail, orcid, in the order the authors appear.
"Orig" fields hold the text in the article's own language, "En" fields the English version when the article provides one."#;

const REFERENCES_EXTRACTION: &str = r#"You extract the bibliography from the last pages of a scientific article.
Return a JSON object {"references": [...]} where each entry has description (the full citation text exactly as printed), doi, link and accessed (access date), using "" for missing values.
Keep the order of the bibliography. If the text has no bibliography return {"references": []}."#;

const FIELD_COMPLETION: &str = r#"You complete missing metadata of a scientific article. The input JSON has "article" (the full record) and "fieldsToComplete" (the empty fields to fill).
Fill only the listed fields: titleEn is the English translation of titleOrig; abstractOrig and abstractEn are translations of each other; keywordsOrig are derived from abstractOrig; keywordsEn translate keywordsOrig.
Return a JSON object containing only the completed fields. Leave a field out when its source text is empty."#;

const AUTHOR_AFFILIATION_CORRECTION: &str = r#"You normalize author affiliations. The input is a JSON list of objects with authorAffiliation (original language) and authorAffiliationEn (English).
For each entry return the institution name followed by its acronym in parentheses, without departments, laboratories, programs or addresses, e.g. "Universidade Federal de Santa Catarina (UFSC)".
Return a JSON object {"affiliations": [...]} with one entry per input: originalAuthorAffiliation (the input authorAffiliation, unchanged), originalAuthorAffiliationEn (the input authorAffiliationEn, unchanged), authorAffiliation and authorAffiliationEn (normalized)."#;

const TEXT_PROCESSING: &str = r#"The following text was extracted from a PDF and has broken diacritics (for example "informa c¸˜ao" instead of "informação").
Return the same text with the accents repaired. Do not translate, summarize or comment; output only the corrected text."#;

/// System prompts, one per task.
#[derive(Debug, Clone)]
pub struct PromptSet {
    prompts: HashMap<AiTask, String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        let prompts = AiTask::ALL
            .iter()
            .map(|&task| (task, default_prompt(task).to_string()))
            .collect();
        Self { prompts }
    }
}

fn default_prompt(task: AiTask) -> &'static str {
    match task {
        AiTask::ArticleExtraction => ARTICLE_EXTRACTION,
        AiTask::ReferencesExtraction => REFERENCES_EXTRACTION,
        AiTask::FieldCompletion => FIELD_COMPLETION,
        AiTask::AuthorAffiliationCorrection => AUTHOR_AFFILIATION_CORRECTION,
        AiTask::TextProcessing => TEXT_PROCESSING,
    }
}

impl PromptSet {
    pub fn get(&self, task: AiTask) -> &str {
        self.prompts
            .get(&task)
            .map(String::as_str)
            .unwrap_or_else(|| default_prompt(task))
    }

    pub fn set(&mut self, task: AiTask, prompt: impl Into<String>) {
        self.prompts.insert(task, prompt.into());
    }

    /// Overlay prompts from TOML, either top-level (`task_key = "prompt"`) or
    /// under a `[prompts]` table. Unknown keys are ignored with a warning;
    /// tasks absent from the file keep their default.
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;

        let mut entries = Vec::new();
        for (key, value) in table {
            match value {
                toml::Value::Table(inner) if key == "prompts" => entries.extend(inner),
                other => entries.push((key, other)),
            }
        }

        let mut set = Self::default();
        for (key, value) in entries {
            let Some(task) = AiTask::ALL.iter().copied().find(|t| t.as_str() == key) else {
                tracing::warn!(key = %key, "ignoring prompt for unknown task");
                continue;
            };
            let toml::Value::String(prompt) = value else {
                return Err(CoreError::Config(format!("prompt `{}` must be a string", key)));
            };
            set.set(task, prompt);
        }
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
