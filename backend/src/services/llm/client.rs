//! HTTP client for OpenAI-compatible chat-completion APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmError, LlmService};
use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "You are a data reliability analyst. You analyze data \
anomalies and perform root-cause analysis. You have access to the table's \
lineage graph and historical anomaly data.\n\n\
Always respond with structured JSON matching the Diagnosis schema.\n\
Consider: What upstream change could have caused this? How far does the \
impact reach downstream? What's the simplest fix?";

/// Backoff schedule; one attempt per entry.
const BACKOFF_SECS: [u64; 3] = [2, 4, 8];

pub struct OpenAiClient {
    http_client: Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1) + 5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    async fn chat_completion(&self, prompt: &str) -> Result<serde_json::Value, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: prompt.to_string() },
            ],
            response_format: ResponseFormat { r#type: "json_object" },
        };

        let url = format!("{}/chat/completions", self.api_base);
        tracing::debug!("Calling LLM API: {} with model {}", url, self.model);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout.as_secs())
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            // Fall back to the scheduled backoff when no hint is given.
            return Err(LlmError::RateLimited(retry_after.unwrap_or(0)));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::ParseError("Empty response from LLM".to_string()))?;

        serde_json::from_str(content).map_err(|e| {
            LlmError::ParseError(format!("Response is not valid JSON: {}. Content: {}", e, content))
        })
    }
}

#[async_trait]
impl LlmService for OpenAiClient {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn diagnose(&self, prompt: &str) -> Option<serde_json::Value> {
        for (attempt, delay) in BACKOFF_SECS.iter().enumerate() {
            match self.chat_completion(prompt).await {
                Ok(payload) => return Some(payload),
                Err(err) if !err.is_retriable() => {
                    tracing::debug!("LLM unavailable: {}", err);
                    return None;
                },
                Err(LlmError::RateLimited(retry_after)) => {
                    let wait = if retry_after > 0 { retry_after } else { *delay };
                    tracing::warn!("LLM rate limited, waiting {}s", wait);
                    if attempt < BACKOFF_SECS.len() - 1 {
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        "LLM call failed (attempt {}/{}): {}",
                        attempt + 1,
                        BACKOFF_SECS.len(),
                        err
                    );
                    if attempt < BACKOFF_SECS.len() - 1 {
                        tokio::time::sleep(Duration::from_secs(*delay)).await;
                    }
                },
            }
        }

        tracing::error!("All LLM retries exhausted");
        None
    }
}

// ============================================================================
// OpenAI API request/response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
