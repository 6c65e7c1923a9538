use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ConferenceMonth;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Remote content API and pre-fetched corpus location.
#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// Minimum delay between two requests from one client.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_path: default_api_path(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.churchofjesuschrist.org".to_string()
}
fn default_api_path() -> String {
    "/study/api/v3/language-pages/type/content".to_string()
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Scripture-Search/1.0 (Educational)".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("content/processed")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Units (talks, verses, lessons) accumulated before each commit.
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,
    /// Talks with fewer content paragraphs (byline and kicker excluded)
    /// are treated as absent.
    #[serde(default = "default_min_paragraphs")]
    pub min_paragraphs: usize,
    #[serde(default = "default_first_conference_year")]
    pub first_conference_year: i32,
    /// Most recent conference to include in `--all`, as `YYYY-MM`.
    #[serde(default = "default_latest_conference")]
    pub latest_conference: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            commit_every: default_commit_every(),
            min_paragraphs: default_min_paragraphs(),
            first_conference_year: default_first_conference_year(),
            latest_conference: default_latest_conference(),
        }
    }
}

fn default_commit_every() -> usize {
    10
}
fn default_min_paragraphs() -> usize {
    5
}
fn default_first_conference_year() -> i32 {
    2014
}
fn default_latest_conference() -> String {
    "2025-04".to_string()
}

impl IngestConfig {
    /// Parse `latest_conference` into a `(year, month)` pair.
    pub fn latest(&self) -> Result<(i32, ConferenceMonth)> {
        let (year, month) = self
            .latest_conference
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("ingest.latest_conference must look like YYYY-MM"))?;
        let year: i32 = year
            .parse()
            .with_context(|| format!("invalid year in '{}'", self.latest_conference))?;
        Ok((year, month.parse()?))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_window")]
    pub verse_window: i64,
    #[serde(default = "default_window")]
    pub paragraph_window: i64,
    #[serde(default = "default_lesson_max_refs")]
    pub lesson_max_refs: usize,
    #[serde(default = "default_lesson_max_chars")]
    pub lesson_max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            verse_window: default_window(),
            paragraph_window: default_window(),
            lesson_max_refs: default_lesson_max_refs(),
            lesson_max_chars: default_lesson_max_chars(),
        }
    }
}

fn default_window() -> i64 {
    2
}
fn default_lesson_max_refs() -> usize {
    10
}
fn default_lesson_max_chars() -> usize {
    25_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for `ollama` and `azure` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_delay_ms() -> u64 {
    500
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.ingest.commit_every == 0 {
        anyhow::bail!("ingest.commit_every must be > 0");
    }
    config.ingest.latest()?;

    if !(0..=10).contains(&config.context.verse_window)
        || !(0..=10).contains(&config.context.paragraph_window)
    {
        anyhow::bail!("context windows must be in [0, 10]");
    }
    if config.context.lesson_max_chars == 0 {
        anyhow::bail!("context.lesson_max_chars must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "azure" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, azure, or ollama.",
            other
        ),
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"data/ss.sqlite\"\n").unwrap();
        assert_eq!(cfg.ingest.commit_every, 10);
        assert_eq!(cfg.ingest.min_paragraphs, 5);
        assert_eq!(cfg.context.verse_window, 2);
        assert_eq!(cfg.context.lesson_max_chars, 25_000);
        assert_eq!(cfg.content.request_delay_ms, 500);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(
            cfg.ingest.latest().unwrap(),
            (2025, ConferenceMonth::April)
        );
    }

    #[test]
    fn rejects_zero_commit_interval() {
        let err = parse_config("[db]\npath = \"x\"\n[ingest]\ncommit_every = 0\n").unwrap_err();
        assert!(err.to_string().contains("commit_every"));
    }

    #[test]
    fn rejects_bad_latest_conference() {
        assert!(parse_config("[db]\npath = \"x\"\n[ingest]\nlatest_conference = \"2025-06\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[ingest]\nlatest_conference = \"2025\"\n").is_err());
    }

    #[test]
    fn enabled_provider_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("dims"));

        let cfg = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        assert!(cfg.embedding.is_enabled());
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn example_config_parses() {
        let cfg = parse_config(include_str!("../config/ssearch.example.toml")).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("data/ssearch.sqlite"));
        assert_eq!(cfg.context.lesson_max_refs, 10);
    }
}
