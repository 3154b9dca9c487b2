//! LLM adapter for root-cause diagnosis.
//!
//! The architect sees one narrow seam: a prompt goes in, a diagnosis-shaped
//! JSON object (or nothing) comes out. Retry, timeout, and rate-limit policy
//! all live behind the trait, and tests substitute fakes through it.

mod client;

pub use client::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    NotConfigured,

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),
}

impl LlmError {
    /// Errors worth another attempt within the same diagnosis call.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, LlmError::NotConfigured)
    }
}

#[async_trait]
pub trait LlmService: Send + Sync {
    fn is_available(&self) -> bool;

    /// Run one diagnosis. `None` means every attempt failed and the caller
    /// should fall back to rules.
    async fn diagnose(&self, prompt: &str) -> Option<serde_json::Value>;
}
