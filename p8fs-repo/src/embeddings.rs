//! Embedding generation, grounded in `embedding_providers.py`:
//! `BaseEmbeddingProvider` (name/dimensions/max_input_length,
//! truncate-with-warning `validate_input`) and `OpenAIEmbeddingProvider`
//! (REST-only, no vendor SDK).

use async_trait::async_trait;
use tracing::warn;

use crate::error::{RepoError, RepoResult};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn max_input_length(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> RepoResult<Vec<Vec<f32>>>;

    /// Truncates `text` to `max_input_length`, logging a warning exactly
    /// like the source's `validate_input`.
    fn validate_input(&self, text: &str) -> RepoResult<String> {
        if text.is_empty() {
            return Err(RepoError::Validation("text must be a non-empty string".into()));
        }
        if text.chars().count() > self.max_input_length() {
            warn!(
                original_len = text.chars().count(),
                max = self.max_input_length(),
                "text truncated for embedding"
            );
            Ok(text.chars().take(self.max_input_length()).collect())
        } else {
            Ok(text.to_string())
        }
    }
}

pub struct OpenAiEmbeddingProvider {
    name: String,
    model: String,
    dimensions: usize,
    max_input_length: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    const API_URL: &'static str = "https://api.openai.com/v1/embeddings";

    pub fn new(name: impl Into<String>, model: impl Into<String>, dimensions: usize, api_key: String) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            dimensions,
            max_input_length: 8000,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(serde::Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(serde::Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    async fn embed(&self, texts: &[String]) -> RepoResult<Vec<Vec<f32>>> {
        if !self.is_available() {
            return Err(RepoError::Embedding {
                provider: self.name.clone(),
                reason: "missing API key".into(),
            });
        }
        let validated: Vec<String> = texts
            .iter()
            .map(|t| self.validate_input(t))
            .collect::<RepoResult<_>>()?;

        let response = self
            .client
            .post(Self::API_URL)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest { model: &self.model, input: &validated })
            .send()
            .await
            .map_err(|e| RepoError::Embedding { provider: self.name.clone(), reason: e.to_string() })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RepoError::Embedding {
                provider: self.name.clone(),
                reason: format!("OpenAI API returned {status}: {body}"),
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RepoError::Embedding { provider: self.name.clone(), reason: e.to_string() })?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic local fallback used in tests and when no remote
/// provider is configured — not a semantic model, just stable vectors
/// so the dual-indexing pipeline can be exercised offline.
pub struct LocalHashEmbeddingProvider {
    dimensions: usize,
}

impl LocalHashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashEmbeddingProvider {
    fn name(&self) -> &str {
        "local-hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_input_length(&self) -> usize {
        100_000
    }

    async fn embed(&self, texts: &[String]) -> RepoResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let validated = self.validate_input(t).unwrap_or_default();
                let mut vec = vec![0.0f32; self.dimensions];
                for (i, byte) in validated.bytes().enumerate() {
                    vec[i % self.dimensions] += byte as f32 / 255.0;
                }
                vec
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_provider_truncates_long_input() {
        let provider = LocalHashEmbeddingProvider::new(4);
        let long_text = "x".repeat(200_001);
        let embeddings = provider.embed(&[long_text]).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].len(), 4);
    }

    #[tokio::test]
    async fn local_provider_rejects_empty_text() {
        let provider = LocalHashEmbeddingProvider::new(4);
        let err = provider.validate_input("");
        assert!(err.is_err());
    }
}
