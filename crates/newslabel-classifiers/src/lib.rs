//! newslabel Classifiers
//!
//! Everything that talks to the model service.
//!
//! A [`ClassificationClient`] turns one [`Record`](newslabel_core::Record)
//! into one completion:
//! - [`PromptBuilder`] renders the Vietnamese classification prompt
//! - [`RateGovernor`] paces calls under per-minute request and token ceilings
//! - [`RetryMachine`] drives exponential backoff over retryable failures
//! - a [`CompletionBackend`] (usually [`OpenAiBackend`]) makes the call
//!
//! [`ResponseValidator`] then checks the reply against the label taxonomy.

pub mod backend;
pub mod client;
pub mod config;
pub mod governor;
pub mod openai;
pub mod prompt;
pub mod retry;
pub mod validator;

pub use backend::{BackendError, Completion, CompletionBackend, CompletionRequest, ErrorClass};
pub use client::{CallOutcome, ClassificationClient, ModelReply, SupersededReply};
pub use config::{
    BackendSettings, ClassifierSettings, FallbackPolicy, FallbackRetry, RateLimitSettings,
    RetrySettings,
};
pub use governor::{RateGovernor, WindowUsage};
pub use openai::OpenAiBackend;
pub use prompt::{BuiltPrompt, PromptBuilder};
pub use retry::{RetryMachine, RetryPolicy, RetryState};
pub use validator::{ParsedResponse, RawLabel, ResponseValidator, Validation};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{CompletionBackend, CompletionRequest};
    pub use crate::client::{CallOutcome, ClassificationClient};
    pub use crate::config::ClassifierSettings;
    pub use crate::governor::RateGovernor;
    pub use crate::validator::ResponseValidator;
}
