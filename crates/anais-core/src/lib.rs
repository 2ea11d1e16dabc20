use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod affiliation;
pub mod ai;
pub mod backend;
pub mod builder;
pub mod completion;
pub mod config_file;
pub mod extractor;
pub mod migrator;
pub mod model;
pub mod pool;
pub mod rate_limit;
pub mod record;
pub mod source;

// Re-export for convenience
pub use affiliation::{AffiliationCorrector, AffiliationLookup, AffiliationPair, AffiliationReport};
pub use ai::{AiBackend, AiClient, AiError, AiTask, PromptSet};
pub use backend::{BackendError, PdfBackend};
pub use builder::{ValidationError, build};
pub use completion::FieldCompleter;
pub use extractor::{ExtractionFailure, ExtractionOrchestrator};
pub use migrator::{
    ArticleNote, FailureKind, FailureRecord, MigrationReport, Migrator, NoteKind,
};
pub use model::{Article, Author, RecordConvert, Reference};
pub use rate_limit::RetryPolicy;
pub use record::{MergedRecord, fields};
pub use source::{ArticleSource, HtmlPartial};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Which AI provider implementation to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(CoreError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

/// Progress events emitted during a migration run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    ArticleStarted {
        index: usize,
        total: usize,
        id: String,
        title: String,
    },
    ArticleFinished {
        index: usize,
        total: usize,
        id: String,
        title: String,
        authors: usize,
        references: usize,
        completed_fields: Vec<&'static str>,
    },
    ArticleFailed {
        index: usize,
        total: usize,
        id: String,
        kind: FailureKind,
        reason: String,
    },
    /// A non-fatal problem on an article that still made it through.
    ArticleNote {
        id: String,
        kind: NoteKind,
        message: String,
    },
    AffiliationStarted {
        pairs: usize,
        chunks: usize,
    },
    ChunkFinished {
        index: usize,
        total: usize,
        corrected: usize,
        dropped: usize,
    },
    ChunkFailed {
        index: usize,
        total: usize,
        error: String,
    },
}

/// Configuration for a migration run.
#[derive(Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Override for OpenAI-compatible or proxied endpoints.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Provider request budget; 0 disables client-side throttling.
    pub requests_per_minute: u32,
    pub prompts_file: Option<PathBuf>,

    pub head_pages: usize,
    pub tail_pages: usize,
    pub repair_encoding: bool,
    /// Sections without a bibliography (editorials).
    pub skip_references_sections: Vec<String>,
    pub default_language: String,
    pub doi_prefix: Option<String>,
    pub year: Option<String>,

    pub affiliation_chunk_size: usize,
    pub affiliation_concurrency: usize,

    pub num_workers: usize,
    pub ai_timeout_secs: u64,
    pub article_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff: Duration::from_millis(self.backoff_base_ms),
            max_backoff: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
            retry_malformed: true,
        }
    }

    /// Whether articles of `section` skip the references call.
    pub fn skips_references(&self, section: &str) -> bool {
        extractor::section_listed(&self.skip_references_sections, section)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("prompts_file", &self.prompts_file)
            .field("head_pages", &self.head_pages)
            .field("tail_pages", &self.tail_pages)
            .field("repair_encoding", &self.repair_encoding)
            .field("skip_references_sections", &self.skip_references_sections)
            .field("default_language", &self.default_language)
            .field("doi_prefix", &self.doi_prefix)
            .field("year", &self.year)
            .field("affiliation_chunk_size", &self.affiliation_chunk_size)
            .field("affiliation_concurrency", &self.affiliation_concurrency)
            .field("num_workers", &self.num_workers)
            .field("ai_timeout_secs", &self.ai_timeout_secs)
            .field("article_timeout_secs", &self.article_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("backoff_max_ms", &self.backoff_max_ms)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            api_key: None,
            model: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 4000,
            requests_per_minute: 60,
            prompts_file: None,
            head_pages: 2,
            tail_pages: 3,
            repair_encoding: true,
            skip_references_sections: vec!["EDT".to_string()],
            default_language: "pt".to_string(),
            doi_prefix: None,
            year: None,
            affiliation_chunk_size: 20,
            affiliation_concurrency: 2,
            num_workers: 4,
            ai_timeout_secs: 120,
            article_timeout_secs: 600,
            max_attempts: 3,
            backoff_base_ms: 2000,
            backoff_max_ms: 60_000,
        }
    }
}

/// Migrate a set of articles.
///
/// Runs extraction, completion and validation per article on a worker pool,
/// then corrects affiliations once across the whole corpus. Progress events
/// are emitted via the callback. The run can be cancelled via the
/// CancellationToken.
pub async fn migrate(
    sources: Vec<ArticleSource>,
    config: Config,
    ai: Arc<AiClient>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> MigrationReport {
    Migrator::new(config, ai).run(sources, progress, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_masks_api_key() {
        let config = Config {
            api_key: Some("sk-secret".into()),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("***"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn reference_skip_ignores_case() {
        let config = Config::default();
        assert!(config.skips_references("EDT"));
        assert!(config.skips_references("edt"));
        assert!(!config.skips_references("ART-C"));
    }

    #[test]
    fn retry_policy_from_config() {
        let config = Config {
            max_attempts: 0,
            backoff_base_ms: 500,
            backoff_max_ms: 100,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_backoff, Duration::from_millis(500));
    }
}
