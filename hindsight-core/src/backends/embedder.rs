//! HTTP client for the embedding sidecar.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbedderConfig;
use crate::error::{EngineError, Result};
use crate::models::Backend;
use crate::ports::Embedder;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| EngineError::Config(format!("embedder http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbedResponse = self
            .http
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| EngineError::backend(Backend::Embedder, e))?
            .error_for_status()
            .map_err(|e| EngineError::backend(Backend::Embedder, e))?
            .json()
            .await
            .map_err(|e| EngineError::backend(Backend::Embedder, e))?;

        if response.embedding.len() != self.dimension {
            return Err(EngineError::backend(
                Backend::Embedder,
                format!(
                    "embedding service returned {} dimensions, expected {}",
                    response.embedding.len(),
                    self.dimension
                ),
            ));
        }
        Ok(response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_healthy(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
