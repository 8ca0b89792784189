use crate::error::CompletionError;
use crate::models::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use std::time::Duration;
use tracing::warn;

/// A chat completion backend. One request, one answer, no retries.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

pub struct GroqClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Groq rate limit (429) triggered");
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionResponse = res.json().await?;
        Ok(body.into_text())
    }
}

/// Stands in when no API key is configured.
pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::NotConfigured)
    }
}
