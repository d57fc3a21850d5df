// src/embedding/mod.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use lru::LruCache;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::RecommenderError;
use crate::utils::constants::DEFAULT_EMBEDDING_MODEL;

// Default cache size - can be configured via environment variable
const DEFAULT_CACHE_SIZE: usize = 1000;

/// The upstream embedding capability. Failures propagate as
/// `RecommenderError::Embedding`; the core never retries them.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecommenderError>;
}

/// OpenAI embeddings client. The model must match the one the corpus
/// embeddings were produced with.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
        info!("Embedding client ready (model: {})", model);
        Ok(Self::new(api_key, model))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecommenderError> {
        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": [text], "model": self.model }))
            .send()
            .await
            .map_err(|e| RecommenderError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RecommenderError::Embedding(format!(
                "embedding API returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RecommenderError::Embedding(format!("malformed response: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                RecommenderError::Embedding("embedding API returned no vectors".to_string())
            })
    }
}

struct CacheInner {
    cache: LruCache<String, Vec<f32>>,
    hits: usize,
    misses: usize,
}

/// LRU-caching wrapper: repeated queries skip the upstream call entirely.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    state: Mutex<CacheInner>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        let cache_size = std::env::var("EMBEDDING_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_CACHE_SIZE);

        info!("Initializing embedding cache with size: {}", cache_size);

        Self {
            inner,
            state: Mutex::new(CacheInner {
                cache: LruCache::new(NonZeroUsize::new(cache_size).unwrap()),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub async fn stats(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.hits, state.misses)
    }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecommenderError> {
        {
            let mut state = self.state.lock().await;
            if let Some(embedding) = state.cache.get(text) {
                let embedding = embedding.clone();
                state.hits += 1;
                if state.hits % 100 == 0 {
                    info!(
                        "Embedding cache stats - hits: {}, misses: {}, hit rate: {:.2}%",
                        state.hits,
                        state.misses,
                        (state.hits as f64 / (state.hits + state.misses) as f64) * 100.0
                    );
                }
                return Ok(embedding);
            }
            state.misses += 1;
        }

        debug!("Embedding cache miss, calling upstream");
        let embedding = self.inner.embed(text).await?;

        let mut state = self.state.lock().await;
        state.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}
