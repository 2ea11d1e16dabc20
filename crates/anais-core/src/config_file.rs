use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Config, CoreError, ProviderKind};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub provider: Option<ProviderConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub output: Option<OutputConfig>,
    pub prompts: Option<PromptsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// `openai` or `anthropic`.
    pub name: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub head_pages: Option<usize>,
    pub tail_pages: Option<usize>,
    pub repair_encoding: Option<bool>,
    pub skip_references_sections: Option<Vec<String>>,
    pub default_language: Option<String>,
    pub doi_prefix: Option<String>,
    pub year: Option<String>,
    pub affiliation_chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub affiliation_concurrency: Option<usize>,
    pub ai_timeout_secs: Option<u64>,
    pub article_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub article_headers: Option<Vec<String>>,
    pub author_headers: Option<Vec<String>>,
    pub reference_headers: Option<Vec<String>>,
    /// Write `before_`-prefixed CSVs from the pre-correction snapshot.
    pub snapshot: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// TOML file overriding the built-in prompts, keyed by task name.
    pub file: Option<String>,
}

/// Platform config directory path: `<config_dir>/anais/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("anais").join("config.toml"))
}

/// Load config by cascading CWD `.anais.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".anais.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Load an explicitly requested config file; unlike [`load_from_path`],
/// a missing or invalid file is an error.
pub fn load_required(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
}

fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, get: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&get)
        .or_else(|| base.as_ref().and_then(&get))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (b, o) = (&base, &overlay);
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            openai_api_key: pick(&o.api_keys, &b.api_keys, |a| a.openai_api_key.clone()),
            anthropic_api_key: pick(&o.api_keys, &b.api_keys, |a| a.anthropic_api_key.clone()),
        }),
        provider: Some(ProviderConfig {
            name: pick(&o.provider, &b.provider, |p| p.name.clone()),
            model: pick(&o.provider, &b.provider, |p| p.model.clone()),
            base_url: pick(&o.provider, &b.provider, |p| p.base_url.clone()),
            temperature: pick(&o.provider, &b.provider, |p| p.temperature),
            max_tokens: pick(&o.provider, &b.provider, |p| p.max_tokens),
            requests_per_minute: pick(&o.provider, &b.provider, |p| p.requests_per_minute),
        }),
        pipeline: Some(PipelineConfig {
            head_pages: pick(&o.pipeline, &b.pipeline, |p| p.head_pages),
            tail_pages: pick(&o.pipeline, &b.pipeline, |p| p.tail_pages),
            repair_encoding: pick(&o.pipeline, &b.pipeline, |p| p.repair_encoding),
            skip_references_sections: pick(&o.pipeline, &b.pipeline, |p| {
                p.skip_references_sections.clone()
            }),
            default_language: pick(&o.pipeline, &b.pipeline, |p| p.default_language.clone()),
            doi_prefix: pick(&o.pipeline, &b.pipeline, |p| p.doi_prefix.clone()),
            year: pick(&o.pipeline, &b.pipeline, |p| p.year.clone()),
            affiliation_chunk_size: pick(&o.pipeline, &b.pipeline, |p| p.affiliation_chunk_size),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(&o.concurrency, &b.concurrency, |c| c.num_workers),
            affiliation_concurrency: pick(&o.concurrency, &b.concurrency, |c| {
                c.affiliation_concurrency
            }),
            ai_timeout_secs: pick(&o.concurrency, &b.concurrency, |c| c.ai_timeout_secs),
            article_timeout_secs: pick(&o.concurrency, &b.concurrency, |c| c.article_timeout_secs),
            max_attempts: pick(&o.concurrency, &b.concurrency, |c| c.max_attempts),
            backoff_base_ms: pick(&o.concurrency, &b.concurrency, |c| c.backoff_base_ms),
            backoff_max_ms: pick(&o.concurrency, &b.concurrency, |c| c.backoff_max_ms),
        }),
        output: Some(OutputConfig {
            article_headers: pick(&o.output, &b.output, |out| out.article_headers.clone()),
            author_headers: pick(&o.output, &b.output, |out| out.author_headers.clone()),
            reference_headers: pick(&o.output, &b.output, |out| out.reference_headers.clone()),
            snapshot: pick(&o.output, &b.output, |out| out.snapshot),
        }),
        prompts: Some(PromptsConfig {
            file: pick(&o.prompts, &b.prompts, |p| p.file.clone()),
        }),
    }
}

impl ConfigFile {
    /// A fully populated file mirroring `config`, without credentials.
    pub fn from_config(config: &Config) -> Self {
        ConfigFile {
            api_keys: None,
            provider: Some(ProviderConfig {
                name: Some(config.provider.as_str().to_string()),
                model: config.model.clone(),
                base_url: config.base_url.clone(),
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
                requests_per_minute: Some(config.requests_per_minute),
            }),
            pipeline: Some(PipelineConfig {
                head_pages: Some(config.head_pages),
                tail_pages: Some(config.tail_pages),
                repair_encoding: Some(config.repair_encoding),
                skip_references_sections: Some(config.skip_references_sections.clone()),
                default_language: Some(config.default_language.clone()),
                doi_prefix: config.doi_prefix.clone(),
                year: config.year.clone(),
                affiliation_chunk_size: Some(config.affiliation_chunk_size),
            }),
            concurrency: Some(ConcurrencyConfig {
                num_workers: Some(config.num_workers),
                affiliation_concurrency: Some(config.affiliation_concurrency),
                ai_timeout_secs: Some(config.ai_timeout_secs),
                article_timeout_secs: Some(config.article_timeout_secs),
                max_attempts: Some(config.max_attempts),
                backoff_base_ms: Some(config.backoff_base_ms),
                backoff_max_ms: Some(config.backoff_max_ms),
            }),
            output: Some(OutputConfig {
                snapshot: Some(true),
                ..Default::default()
            }),
            prompts: None,
        }
    }

    /// The configured API key for `provider`, if any.
    pub fn api_key_for(&self, provider: ProviderKind) -> Option<String> {
        let keys = self.api_keys.as_ref()?;
        let key = match provider {
            ProviderKind::OpenAi => keys.openai_api_key.clone(),
            ProviderKind::Anthropic => keys.anthropic_api_key.clone(),
        };
        key.filter(|k| !k.trim().is_empty())
    }

    /// Copy every value present in the file onto `config`.
    ///
    /// The API key is taken for the provider selected after this file's
    /// `[provider] name` has been applied.
    pub fn apply(&self, config: &mut Config) -> Result<(), CoreError> {
        if let Some(ref p) = self.provider {
            if let Some(ref name) = p.name {
                config.provider = name.parse()?;
            }
            if p.model.is_some() {
                config.model = p.model.clone();
            }
            if p.base_url.is_some() {
                config.base_url = p.base_url.clone();
            }
            if let Some(v) = p.temperature {
                config.temperature = v;
            }
            if let Some(v) = p.max_tokens {
                config.max_tokens = v;
            }
            if let Some(v) = p.requests_per_minute {
                config.requests_per_minute = v;
            }
        }

        if let Some(key) = self.api_key_for(config.provider) {
            config.api_key = Some(key);
        }

        if let Some(ref p) = self.pipeline {
            if let Some(v) = p.head_pages {
                config.head_pages = v;
            }
            if let Some(v) = p.tail_pages {
                config.tail_pages = v;
            }
            if let Some(v) = p.repair_encoding {
                config.repair_encoding = v;
            }
            if let Some(ref v) = p.skip_references_sections {
                config.skip_references_sections = v.clone();
            }
            if let Some(ref v) = p.default_language {
                config.default_language = v.clone();
            }
            if p.doi_prefix.is_some() {
                config.doi_prefix = p.doi_prefix.clone();
            }
            if p.year.is_some() {
                config.year = p.year.clone();
            }
            if let Some(v) = p.affiliation_chunk_size {
                config.affiliation_chunk_size = v;
            }
        }

        if let Some(ref c) = self.concurrency {
            if let Some(v) = c.num_workers {
                config.num_workers = v;
            }
            if let Some(v) = c.affiliation_concurrency {
                config.affiliation_concurrency = v;
            }
            if let Some(v) = c.ai_timeout_secs {
                config.ai_timeout_secs = v;
            }
            if let Some(v) = c.article_timeout_secs {
                config.article_timeout_secs = v;
            }
            if let Some(v) = c.max_attempts {
                config.max_attempts = v;
            }
            if let Some(v) = c.backoff_base_ms {
                config.backoff_base_ms = v;
            }
            if let Some(v) = c.backoff_max_ms {
                config.backoff_max_ms = v;
            }
        }

        if let Some(ref p) = self.prompts
            && let Some(ref file) = p.file
        {
            config.prompts_file = Some(PathBuf::from(file));
        }

        Ok(())
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, CoreError> {
    let path = config_path()
        .ok_or_else(|| CoreError::Config("could not determine config directory".into()))?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| CoreError::Config(format!("failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let toml_str = "[pipeline]\nhead_pages = 3\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.pipeline.unwrap().head_pages, Some(3));
        assert!(parsed.provider.is_none());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            pipeline: Some(PipelineConfig {
                doi_prefix: Some("10.5753/base.".into()),
                head_pages: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            pipeline: Some(PipelineConfig {
                doi_prefix: Some("10.5753/sbie.".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).pipeline.unwrap();
        assert_eq!(merged.doi_prefix.as_deref(), Some("10.5753/sbie."));
        assert_eq!(merged.head_pages, Some(4));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            concurrency: Some(ConcurrencyConfig {
                num_workers: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.concurrency.unwrap().num_workers, Some(8));
    }

    #[test]
    fn apply_selects_key_for_provider() {
        let file: ConfigFile = toml::from_str(
            r#"
[api_keys]
openai_api_key = "sk-openai"
anthropic_api_key = "sk-ant"

[provider]
name = "anthropic"
model = "claude-3-5-sonnet-latest"

[concurrency]
num_workers = 2
"#,
        )
        .unwrap();
        let mut config = Config::default();
        file.apply(&mut config).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(config.model.as_deref(), Some("claude-3-5-sonnet-latest"));
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.head_pages, 2);
    }

    #[test]
    fn defaults_file_round_trips_onto_config() {
        let defaults = Config::default();
        let toml_str = toml::to_string_pretty(&ConfigFile::from_config(&defaults)).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let mut config = Config {
            head_pages: 9,
            ..Config::default()
        };
        parsed.apply(&mut config).unwrap();
        assert_eq!(config.head_pages, defaults.head_pages);
        assert_eq!(config.skip_references_sections, ["EDT"]);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn apply_rejects_unknown_provider() {
        let file: ConfigFile = toml::from_str("[provider]\nname = \"gemini\"\n").unwrap();
        assert!(file.apply(&mut Config::default()).is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigFile {
            output: Some(OutputConfig {
                snapshot: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_required(&path).unwrap();
        assert_eq!(loaded.output.unwrap().snapshot, Some(false));
    }

    #[test]
    fn invalid_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[pipeline\n").unwrap();
        assert!(matches!(load_required(&path), Err(CoreError::Config(_))));
        assert!(load_from_path(&path).is_none());
    }
}
