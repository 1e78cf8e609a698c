//! Backend seam for model-assisted stages.
//!
//! Stages hand a [`CompletionRequest`] to an [`LlmBackend`] and get text
//! back. HTTP, auth and vendor quirks stay behind the trait; errors are
//! retried inside the stage and never reach the pipeline controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure talking to a model backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Non-success HTTP status other than 429
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The provider refused the content. Report text will not change
    /// between attempts, so this is final.
    #[error("provider refused content: {reason}")]
    Refused { reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Refusals and client errors (4xx other than 408 and 429) are final:
    /// the same request will fail the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Refused { .. } => false,
            Self::Http { status, .. } => !(400..500).contains(status) || matches!(*status, 408 | 429),
            _ => true,
        }
    }

    /// Backoff hint from the server, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

/// A model the stages can prompt.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, recorded in logs.
    fn id(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// One stage prompt: fixed instructions plus fenced report evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Stage issuing the request
    pub stage: String,
    /// Sent as the system message
    pub instructions: String,
    /// Sent as the user message
    pub evidence: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the server to constrain output to a JSON object
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(
        stage: impl Into<String>,
        instructions: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            instructions: instructions.into(),
            evidence: evidence.into(),
            max_tokens: 2048,
            temperature: 0.0,
            json_mode: true,
        }
    }

    /// Set generation limits. Temperature is clamped to 0.0..=2.0.
    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// For servers that reject `response_format`.
    pub fn without_json_mode(mut self) -> Self {
        self.json_mode = false;
        self
    }
}

/// Text produced by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Generation hit `max_tokens`
    pub truncated: bool,
    pub tokens_used: Option<u32>,
}
