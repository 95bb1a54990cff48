//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — fails with [`EmbedError::Disabled`]; the
//!   retrieval layer treats this like a quota failure and switches to the
//!   lexical fallback.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with retry
//!   and exponential backoff.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 codec for
//!   BLOB storage
//!
//! # Retry strategy
//!
//! - HTTP 429 → retry with backoff; exhausted retries surface as
//!   [`EmbedError::Quota`] so the caller can fall back rather than fail.
//! - HTTP 5xx and network errors → retry, then [`EmbedError::Provider`].
//! - Other HTTP 4xx → fail immediately as [`EmbedError::Provider`].
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5).

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::Provider("empty embedding response".to_string()))
}

// ============ Disabled provider ============

/// A no-op embedder used when no provider is configured. Every call fails
/// with [`EmbedError::Disabled`], which the search layer treats as a
/// signal to use the lexical ranker.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI provider ============

/// Embedding provider using the OpenAI API. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: Option<usize>,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| EmbedError::Provider("embedding.model required".to_string()))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(EmbedError::Provider(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        Ok(Self {
            model,
            dims: config.dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbedError::Provider("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Provider(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<EmbedError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::Provider(e.to_string()))?;
                        return parse_embeddings_response(&json, self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 {
                        last_err = Some(EmbedError::Quota(format!(
                            "HTTP 429: {}",
                            body_text.chars().take(200).collect::<String>()
                        )));
                        continue;
                    }

                    if status.is_server_error() {
                        last_err = Some(EmbedError::Provider(format!(
                            "HTTP {}: {}",
                            status,
                            body_text.chars().take(200).collect::<String>()
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(EmbedError::Provider(format!(
                        "HTTP {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Provider(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Provider("embedding failed after retries".to_string())))
    }
}

/// Parse the embeddings response body. When `dims` is configured, a
/// vector of any other dimensionality is rejected — mixed-dimension
/// vectors would make every cosine comparison silently score 0.
fn parse_embeddings_response(
    json: &serde_json::Value,
    dims: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Provider("invalid response: missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Provider("invalid response: missing embedding".to_string()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if let Some(expected) = dims {
            if vec.len() != expected {
                return Err(EmbedError::Provider(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    expected,
                    vec.len()
                )));
            }
        }

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Create the appropriate [`Embedder`] based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbedError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => Err(EmbedError::Provider(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_response_dimension_checked_against_config() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        });
        assert!(parse_embeddings_response(&json, Some(3)).is_ok());
        assert!(parse_embeddings_response(&json, None).is_ok());

        let err = parse_embeddings_response(&json, Some(1536)).unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_disabled_embedder_signals_fallback() {
        let embedder = DisabledEmbedder;
        let err = embedder.embed(&["query".to_string()]).await.unwrap_err();
        assert!(matches!(err, crate::error::EmbedError::Disabled));
    }
}
