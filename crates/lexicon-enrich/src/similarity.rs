use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("similarity request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("similarity backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid similarity response: {0}")]
    InvalidResponse(String),
}

/// Semantic similarity of two texts, in `[0, 1]`.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> Result<f32, SimilarityError>;
}

/// Scores text pairs with an OpenAI-compatible `/embeddings` endpoint and
/// compares the vectors locally.
#[derive(Clone)]
pub struct EmbeddingScorer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl EmbeddingScorer {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let auth = api_key.map(|key| (AUTHORIZATION, format!("Bearer {}", key.trim())));
        Ok(Self {
            client: http::json_client(timeout, auth, "embedding")?,
            endpoint: http::endpoint(base_url, "embeddings"),
            model,
        })
    }

    async fn embed_pair(&self, a: &str, b: &str) -> Result<(Vec<f32>, Vec<f32>), SimilarityError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [a, b],
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SimilarityError::Status {
                status: status.as_u16(),
                body: http::error_body(resp).await,
            });
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| SimilarityError::InvalidResponse(e.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        let mut vectors = parsed.data.into_iter().map(|entry| entry.embedding);
        match (vectors.next(), vectors.next(), vectors.next()) {
            (Some(first), Some(second), None) => Ok((first, second)),
            _ => Err(SimilarityError::InvalidResponse(
                "expected exactly two embeddings".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SimilarityScorer for EmbeddingScorer {
    async fn similarity(&self, a: &str, b: &str) -> Result<f32, SimilarityError> {
        let (left, right) = self.embed_pair(a, b).await?;
        if left.len() != right.len() {
            return Err(SimilarityError::InvalidResponse(format!(
                "embedding sizes differ ({} vs {})",
                left.len(),
                right.len()
            )));
        }
        Ok(cosine(&left, &right))
    }
}

/// Cosine similarity clamped to `[0, 1]`; zero vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
