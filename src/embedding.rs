//! Embedding providers.
//!
//! The [`Embedder`] trait turns a batch of texts into one fixed-length
//! vector per text. Three HTTP backends implement it:
//!
//! | provider | endpoint | auth |
//! |----------|----------|------|
//! | `openai` | `POST {url or https://api.openai.com}/v1/embeddings` | `OPENAI_API_KEY` bearer |
//! | `azure`  | `POST {endpoint}/openai/deployments/{model}/embeddings?api-version=2024-02-01` | `AZURE_OPENAI_API_KEY` header |
//! | `ollama` | `POST {url or http://localhost:11434}/api/embed` | none |
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Vectors are persisted with [`vec_to_blob`] and read back with
//! [`blob_to_vec`].

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::EmbeddingConfig;

pub const AZURE_API_VERSION: &str = "2024-02-01";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed `texts`, returning vectors in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "azure" => Ok(Box::new(AzureEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "disabled" => bail!("Embedding provider is disabled. Set [embedding] provider in the config."),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn model_and_dims(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for provider '{}'", config.provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for provider '{}'", config.provider))?;
    Ok((model, dims))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow!("{} environment variable not set", name))
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// POST `body` with retry and backoff; returns the JSON response.
async fn post_json(
    label: &str,
    max_retries: u32,
    body: &Value,
    build: impl Fn() -> reqwest::RequestBuilder,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }

        match build().json(body).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(provider = label, %status, attempt, "embedding request failed, retrying");
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                warn!(provider = label, error = %e, attempt, "embedding request failed, retrying");
                last_err = Some(anyhow!("{} connection error: {}", label, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

fn to_vector(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-number"))
        })
        .collect()
}

/// `{"data": [{"index": i, "embedding": [...]}, ...]}`, shared by OpenAI
/// and Azure. Items are ordered by `index` when present.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut items: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .unwrap_or(pos as u64);
            let embedding = item
                .get("embedding")
                .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;
            Ok((index, to_vector(embedding)?))
        })
        .collect::<Result<_>>()?;
    items.sort_by_key(|(index, _)| *index);

    Ok(items.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(to_vector)
        .collect()
}

/// Reject responses that do not line up with the request.
fn check_shape(vectors: Vec<Vec<f32>>, expected: usize, dims: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        bail!(
            "embedding provider returned {} vectors for {} inputs",
            vectors.len(),
            expected
        );
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        bail!(
            "embedding has {} dimensions, expected {}",
            bad.len(),
            dims
        );
    }
    Ok(vectors)
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        Ok(Self {
            client: http_client(config)?,
            model,
            dims,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: env_var("OPENAI_API_KEY")?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let json = post_json("OpenAI", self.max_retries, &body, || {
            self.client.post(&url).bearer_auth(&self.api_key)
        })
        .await?;
        check_shape(parse_openai_response(&json)?, texts.len(), self.dims)
    }
}

// ============ Azure OpenAI ============

pub struct AzureEmbedder {
    client: reqwest::Client,
    deployment: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl AzureEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (deployment, dims) = model_and_dims(config)?;
        let endpoint = match &config.url {
            Some(url) => url.clone(),
            None => env_var("AZURE_OPENAI_ENDPOINT")?,
        };
        Ok(Self {
            client: http_client(config)?,
            deployment,
            dims,
            endpoint,
            api_key: env_var("AZURE_OPENAI_API_KEY")?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for AzureEmbedder {
    fn model_name(&self) -> &str {
        &self.deployment
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "input": texts });
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            AZURE_API_VERSION
        );
        let json = post_json("Azure OpenAI", self.max_retries, &body, || {
            self.client.post(&url).header("api-key", &self.api_key)
        })
        .await?;
        check_shape(parse_openai_response(&json)?, texts.len(), self.dims)
    }
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        Ok(Self {
            client: http_client(config)?,
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let json = post_json("Ollama", self.max_retries, &body, || self.client.post(&url)).await?;
        check_shape(parse_ollama_response(&json)?, texts.len(), self.dims)
    }
}

// ============ BLOB encoding ============

/// Encode a vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
