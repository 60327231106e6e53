use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::config::{EmbeddingBackend, EmbeddingSettings};
use crate::core::errors::ApiError;

/// Turns text into dense vectors for the document store.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside stored vectors.
    fn model(&self) -> &str;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("Embedding backend returned no vector".to_string()))
    }
}

pub fn from_settings(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>, ApiError> {
    match settings.backend {
        EmbeddingBackend::Openai => Ok(Box::new(OpenAiEmbedder::new(settings)?)),
        EmbeddingBackend::Hashed => Ok(Box::new(HashedEmbedder::new(settings.dimensions))),
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    api_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.api_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Embedding request failed: {}", e)))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("Embedding error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        let embeddings = parse_embeddings(&payload);
        if embeddings.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "Embedding backend returned {} vectors for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }
        Ok(embeddings)
    }
}

fn parse_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let mut items: Vec<(u64, Vec<f32>)> = Vec::new();
    if let Some(data) = payload["data"].as_array() {
        for (pos, item) in data.iter().enumerate() {
            if let Some(vals) = item["embedding"].as_array() {
                let index = item["index"].as_u64().unwrap_or(pos as u64);
                let vec: Vec<f32> = vals
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                items.push((index, vec));
            }
        }
    }
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, vec)| vec).collect()
}

/// Offline embedder: hashes lowercase word unigrams and bigrams into a fixed
/// number of buckets and L2-normalises the result.
///
/// Buckets come from SHA-256, so stored vectors stay valid across builds.
pub struct HashedEmbedder {
    dimensions: usize,
    model: String,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("hashed-sha256-{}", dimensions),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = feature_hash(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// First eight bytes of the SHA-256 digest, little-endian.
fn feature_hash(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashed_embeddings_are_deterministic_and_normalised() {
        let embedder = HashedEmbedder::new(64);
        let first = embedder.embed_query("Maximum loan to value ratio").await.unwrap();
        let second = embedder.embed_query("maximum LOAN to value ratio").await.unwrap();

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn hashed_embeddings_rank_related_text_higher() {
        let embedder = HashedEmbedder::new(256);
        let vectors = embedder
            .embed(&[
                "reserves required for investment property".to_string(),
                "reserves required for an investment property purchase".to_string(),
                "gift funds from a family member".to_string(),
            ])
            .await
            .unwrap();

        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn hashed_buckets_are_pinned() {
        let embedder = HashedEmbedder::new(64);
        let vector = embedder.embed_query("loan").await.unwrap();
        assert_eq!(vector[7], 1.0);
        assert_eq!(vector.iter().filter(|x| **x != 0.0).count(), 1);

        let vector = embedder.embed_query("loan value").await.unwrap();
        assert!(vector[0] < 0.0);
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let embedder = HashedEmbedder::new(8);
        let vector = embedder.embed_query("   ").await.unwrap();
        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn embeddings_payload_is_ordered_by_index() {
        let payload = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let parsed = parse_embeddings(&payload);
        assert_eq!(parsed, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn backend_selection_follows_settings() {
        let settings = EmbeddingSettings {
            backend: EmbeddingBackend::Hashed,
            dimensions: 32,
            ..EmbeddingSettings::default()
        };
        let embedder = from_settings(&settings).unwrap();
        assert_eq!(embedder.model(), "hashed-sha256-32");
    }
}
