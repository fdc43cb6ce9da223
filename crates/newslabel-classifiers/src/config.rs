//! Configuration for the classification client and its backend

use newslabel_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for classifying records against the model service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Service connection
    #[serde(default)]
    pub backend: BackendSettings,

    /// Primary model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Fallback model identifier; `None` disables fallback regardless of policy
    #[serde(default = "default_fallback_model")]
    pub fallback_model: Option<String>,

    /// Ceiling on estimated prompt tokens per request; longer articles are truncated
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Completion token ceiling sent with each request
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Article body character budget applied before token truncation
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Per-minute ceilings
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// Retry and backoff
    #[serde(default)]
    pub retry: RetrySettings,

    /// When the fallback model is tried
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,

    /// How the fallback model is retried
    #[serde(default)]
    pub fallback_retry: FallbackRetry,

    /// Confidences below this are flagged as low confidence
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// More labels than this on one record is flagged
    #[serde(default = "default_max_labels")]
    pub max_labels_before_warning: usize,
}

impl ClassifierSettings {
    /// Check value ranges. Pricing coverage is checked by the caller.
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.rate_limits.validate()?;
        self.retry.validate()?;

        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(Error::config("max_tokens must be greater than 0"));
        }
        if self.max_output_tokens == 0 {
            return Err(Error::config("max_output_tokens must be greater than 0"));
        }
        // The governor reserves the prompt ceiling plus the output cap per call
        let per_call = self.max_tokens as u64 + self.max_output_tokens as u64;
        if (self.rate_limits.max_tpm as u64) < per_call {
            return Err(Error::config(format!(
                "max_tpm ({}) is below one call's reservation of max_tokens + max_output_tokens ({})",
                self.rate_limits.max_tpm, per_call
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::config(format!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }

    /// Fallback model, if one is configured and differs from the primary
    pub fn effective_fallback(&self) -> Option<&str> {
        self.fallback_model
            .as_deref()
            .filter(|fallback| !fallback.is_empty() && *fallback != self.model)
    }

    /// Models that need pricing entries
    pub fn models(&self) -> Vec<&str> {
        let mut models = vec![self.model.as_str()];
        models.extend(self.effective_fallback());
        models
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            model: default_model(),
            fallback_model: default_fallback_model(),
            max_tokens: default_max_tokens(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            max_content_chars: default_max_content_chars(),
            rate_limits: RateLimitSettings::default(),
            retry: RetrySettings::default(),
            fallback_policy: FallbackPolicy::default(),
            fallback_retry: FallbackRetry::default(),
            confidence_threshold: default_confidence_threshold(),
            max_labels_before_warning: default_max_labels(),
        }
    }
}

/// Service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// API credential
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the chat completions API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl BackendSettings {
    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config(
                "API key is required (set OPENAI_API_KEY or backend.api_key)",
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(Error::config("api_base_url is required"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Per-minute request and token ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Max requests per window
    #[serde(default = "default_max_rpm")]
    pub max_rpm: u32,

    /// Max tokens per window
    #[serde(default = "default_max_tpm")]
    pub max_tpm: u32,

    /// Rolling window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitSettings {
    fn validate(&self) -> Result<()> {
        if self.max_rpm == 0 {
            return Err(Error::config("max_rpm must be at least 1"));
        }
        if self.max_tpm == 0 {
            return Err(Error::config("max_tpm must be at least 1"));
        }
        if self.window_secs == 0 {
            return Err(Error::config("window_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_rpm: default_max_rpm(),
            max_tpm: default_max_tpm(),
            window_secs: default_window_secs(),
        }
    }
}

/// Retry and backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per model (3 means 3 calls)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the second attempt, doubled afterwards
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Randomize each delay within [d/2, d]
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(Error::config(
                "max_retry_delay_ms must not be smaller than retry_delay_ms",
            ));
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            jitter: true,
        }
    }
}

/// When the fallback model is tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Never use the fallback model
    Disabled,
    /// Only when the service reports the primary model as unavailable
    #[default]
    ModelUnavailable,
    /// After any primary failure, including exhausted retries
    OnFailure,
}

/// How the fallback model is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackRetry {
    /// One extra call, no backoff
    SingleAttempt,
    /// The same backoff policy as the primary model
    #[default]
    FullBackoff,
}

fn default_model() -> String {
    "gpt-4o-mini-2024-07-18".to_string()
}

fn default_fallback_model() -> Option<String> {
    Some("gpt-4o-mini".to_string())
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_max_output_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_content_chars() -> usize {
    2000
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_max_labels() -> usize {
    4
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_rpm() -> u32 {
    500
}

fn default_max_tpm() -> u32 {
    30_000
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ClassifierSettings {
        let mut settings = ClassifierSettings::default();
        settings.backend.api_key = "sk-test".to_string();
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = ClassifierSettings::default();
        assert_eq!(settings.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(settings.effective_fallback(), Some("gpt-4o-mini"));
        assert_eq!(settings.rate_limits.max_rpm, 500);
        assert_eq!(settings.rate_limits.max_tpm, 30_000);
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.fallback_policy, FallbackPolicy::ModelUnavailable);
        assert_eq!(settings.fallback_retry, FallbackRetry::FullBackoff);
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(ClassifierSettings::default().validate().is_err());

        let mut settings = valid();
        settings.temperature = 2.5;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.confidence_threshold = 1.1;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.rate_limits.max_rpm = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.retry.max_retries = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_tpm_covers_one_call() {
        let mut settings = valid();
        settings.max_tokens = 4000;
        settings.max_output_tokens = 500;

        settings.rate_limits.max_tpm = 4500;
        assert!(settings.validate().is_ok());

        settings.rate_limits.max_tpm = 4499;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("max_tpm"));
    }

    #[test]
    fn test_fallback_same_as_primary_is_ignored() {
        let mut settings = valid();
        settings.fallback_model = Some(settings.model.clone());
        assert_eq!(settings.effective_fallback(), None);
        assert_eq!(settings.models(), vec!["gpt-4o-mini-2024-07-18"]);
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = r#"
model: primary
fallback_policy: on_failure
fallback_retry: single_attempt
retry:
  max_retries: 5
"#;
        let settings: ClassifierSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.model, "primary");
        assert_eq!(settings.fallback_policy, FallbackPolicy::OnFailure);
        assert_eq!(settings.fallback_retry, FallbackRetry::SingleAttempt);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.retry_delay_ms, 1000);
    }
}
