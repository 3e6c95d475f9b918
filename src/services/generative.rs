//! Client for the generative text service.
//!
//! The service is addressed through the [`TextGenerator`] trait so the
//! extractor can be driven by a deterministic fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

const RETRYABLE_STATUS: &[u16] = &[429, 500, 502, 503, 504];

const RETRYABLE_MESSAGES: &[&str] = &[
    "overloaded",
    "rate limit",
    "timeout",
    "timed out",
    "network error",
    "fetch failed",
];

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub status: Option<u16>,
    pub message: String,
    /// Transport-level failure (connect error, timeout) before any status
    pub transport: bool,
}

impl GenerationError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            transport: false,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            transport: false,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        if self.transport {
            return true;
        }
        if let Some(status) = self.status {
            if RETRYABLE_STATUS.contains(&status) {
                return true;
            }
        }
        let message = self.message.to_lowercase();
        RETRYABLE_MESSAGES.iter().any(|m| message.contains(m))
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            transport: e.is_timeout() || e.is_connect(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Submit a prompt and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Fixed-delay capped retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Call `generator`, retrying transient failures per `policy`.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String, GenerationError> {
    let mut attempt = 0;
    loop {
        match generator.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    "Generative request failed ({}), retry {}/{} in {:?}",
                    e, attempt, policy.max_retries, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String, api_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            api_url,
            model,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config, client: Client) -> Option<Self> {
        if !config.generative_enabled() {
            return None;
        }
        Some(Self::new(
            client,
            config.gemini_api_key.clone(),
            config.gemini_api_url.clone(),
            config.gemini_model.clone(),
        ))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json".to_string(),
            },
        };

        debug!("Sending generateContent request to model {}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::status(
                status,
                format!("API error {}: {}", status, error_text),
            ));
        }

        let completion: GenerateResponse = response.json().await?;

        completion
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| GenerationError::other("Empty response from model"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}
