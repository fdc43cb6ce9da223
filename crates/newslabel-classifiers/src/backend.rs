//! Completion backend trait and its error taxonomy

use async_trait::async_trait;
use newslabel_core::{ChatMessage, TokenUsage};
use std::time::Duration;

/// Trait for services that answer a chat completion request
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue a single completion call. No retries happen at this layer.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;

    /// Get the backend name
    fn name(&self) -> &str;
}

/// A single chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,

    /// Conversation, system prompt first
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token ceiling
    pub max_tokens: u32,

    /// Ask the service for a JSON-object response
    pub json_mode: bool,
}

/// A successful completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Model that answered, as reported by the service
    pub model: String,

    /// Assistant message content
    pub content: String,

    /// Service-reported usage, when present
    pub usage: Option<TokenUsage>,
}

/// How the retry layer should treat a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Back off and try again
    Retryable,
    /// Surface immediately
    Fatal,
    /// The requested model is not served; fallback may apply
    ModelUnavailable,
}

/// Errors reported by a completion backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("rate limited by service")]
    RateLimited {
        /// Server-suggested wait (Retry-After)
        retry_after: Option<Duration>,
    },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("response could not be decoded: {0}")]
    Decode(String),

    #[error("invalid credentials: {0}")]
    Unauthorized(String),

    #[error("request rejected: {0}")]
    InvalidRequest(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

impl BackendError {
    /// Classify for the retry layer
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout
            | Self::Network(_)
            | Self::Server { .. }
            | Self::ServiceUnavailable
            | Self::Decode(_) => ErrorClass::Retryable,
            Self::Unauthorized(_) | Self::InvalidRequest(_) | Self::QuotaExceeded(_) => {
                ErrorClass::Fatal
            }
            Self::ModelUnavailable(_) => ErrorClass::ModelUnavailable,
        }
    }

    /// Minimum wait the service asked for
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::Network(_) => "network",
            Self::Server { .. } => "server",
            Self::ServiceUnavailable => "unavailable",
            Self::Decode(_) => "decode",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
            Self::QuotaExceeded(_) => "quota",
            Self::ModelUnavailable(_) => "model_unavailable",
        }
    }
}

impl From<BackendError> for newslabel_core::Error {
    fn from(err: BackendError) -> Self {
        match err.class() {
            ErrorClass::Retryable => newslabel_core::Error::transient(err.to_string()),
            ErrorClass::Fatal | ErrorClass::ModelUnavailable => {
                newslabel_core::Error::fatal(err.to_string())
            }
        }
    }
}
