//! Classification client
//!
//! One [`ClassificationClient::classify`] call drives every service attempt
//! for a single record: pacing through the [`RateGovernor`], retrying
//! retryable failures with backoff, and switching to the fallback model when
//! the configured [`FallbackPolicy`] allows it. Under
//! [`FallbackPolicy::OnFailure`] a primary reply that does not parse as a
//! label list is also retried on the fallback model.
//!
//! Service failures are not errors: fatal ones come back as
//! [`CallOutcome::Rejected`] without retry and exhausted retries as
//! [`CallOutcome::Exhausted`], so the caller decides what the record's
//! outcome is. `Err` is reserved for configuration problems.

use crate::backend::{BackendError, Completion, CompletionBackend, CompletionRequest, ErrorClass};
use crate::config::{ClassifierSettings, FallbackPolicy, FallbackRetry};
use crate::governor::RateGovernor;
use crate::prompt::{BuiltPrompt, PromptBuilder};
use crate::retry::{RetryMachine, RetryPolicy, RetryState};
use crate::validator::{ParsedResponse, ResponseValidator};
use newslabel_core::text::estimate_tokens;
use newslabel_core::{ChatMessage, Error, Record, Result, TokenUsage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A billed primary reply that the fallback model's answer replaced
#[derive(Debug, Clone, PartialEq)]
pub struct SupersededReply {
    pub model: String,
    pub usage: TokenUsage,
}

/// A successful completion for one record
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// Configured model identifier that answered
    pub model: String,
    /// Raw assistant content
    pub content: String,
    /// Billed usage, service-reported or estimated
    pub usage: TokenUsage,
    /// Service calls made across both models
    pub attempts: u32,
    pub used_fallback: bool,
    /// Notes gathered along the way (truncation, fallback, estimated usage)
    pub warnings: Vec<String>,
    pub superseded: Option<SupersededReply>,
}

/// Result of classifying one record
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Completed(ModelReply),
    /// Every allowed attempt failed with a retryable error
    Exhausted {
        model: String,
        attempts: u32,
        used_fallback: bool,
        last_error: BackendError,
        warnings: Vec<String>,
        superseded: Option<SupersededReply>,
    },
    /// The service refused the request outright, or the model is
    /// unavailable and no fallback applies
    Rejected {
        model: String,
        attempts: u32,
        used_fallback: bool,
        error: BackendError,
        warnings: Vec<String>,
        superseded: Option<SupersededReply>,
    },
}

enum ModelAttempt {
    Succeeded { completion: Completion, attempts: u32 },
    Exhausted { attempts: u32, last_error: BackendError },
    Unavailable { attempts: u32, error: BackendError },
    Rejected { attempts: u32, error: BackendError },
}

impl ModelAttempt {
    fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Unavailable { attempts, .. }
            | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}

/// Issues classification requests for records
pub struct ClassificationClient {
    backend: Arc<dyn CompletionBackend>,
    governor: Arc<RateGovernor>,
    prompts: PromptBuilder,
    validator: ResponseValidator,
    settings: ClassifierSettings,
    retry_policy: RetryPolicy,
}

impl ClassificationClient {
    /// Create a client over `backend`, sharing `governor` with other clients of the same service
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        governor: Arc<RateGovernor>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            backend,
            governor,
            prompts: PromptBuilder::new(settings.max_content_chars, settings.max_tokens),
            validator: ResponseValidator::new(
                settings.confidence_threshold,
                settings.max_labels_before_warning,
            ),
            retry_policy: RetryPolicy::new(&settings.retry),
            settings,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Build the prompt for `record` without sending it
    pub fn prompt_for(&self, record: &Record) -> BuiltPrompt {
        self.prompts.build(record)
    }

    /// Send one minimal request to verify credentials and reachability
    pub async fn check_connection(&self) -> Result<Completion> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user("Hello, this is a test.")],
            temperature: 0.0,
            max_tokens: 10,
            json_mode: false,
        };
        self.governor.reserve(estimate_tokens(&request.messages[0].content) + 10).await?;
        self.backend
            .complete(&request)
            .await
            .map_err(|e| match e.class() {
                ErrorClass::Retryable => Error::transient(format!("connection test failed: {}", e)),
                _ => Error::fatal(format!("connection test failed: {}", e)),
            })
    }

    /// Classify one record
    pub async fn classify(&self, record: &Record) -> Result<CallOutcome> {
        let prompt = self.prompts.build(record);
        let mut warnings = Vec::new();
        if prompt.truncated {
            warnings.push(format!(
                "content truncated to fit {}-token prompt ceiling",
                self.settings.max_tokens
            ));
        }

        let primary = self.settings.model.clone();
        let first = self
            .run_model(&primary, &prompt, self.retry_policy.clone())
            .await?;

        let fallback = self.settings.effective_fallback().map(str::to_string);
        let fallback_reason = fallback.as_ref().and_then(|_| self.fallback_reason(&first));

        let (Some(reason), Some(fallback)) = (fallback_reason, fallback) else {
            return Ok(self.finish(record, &primary, first, 0, false, None, &prompt, warnings));
        };

        warn!(
            index = record.index,
            primary = %primary,
            fallback = %fallback,
            error = %reason,
            "Primary model failed, switching to fallback"
        );
        metrics::counter!("newslabel_fallback_total").increment(1);
        warnings.push(format!(
            "primary model {} failed ({}); used fallback {}",
            primary, reason, fallback
        ));

        let policy = match self.settings.fallback_retry {
            FallbackRetry::SingleAttempt => RetryPolicy::single_attempt(),
            FallbackRetry::FullBackoff => self.retry_policy.clone(),
        };
        let prior_attempts = first.attempts();
        let superseded = match &first {
            ModelAttempt::Succeeded { completion, .. } => Some(SupersededReply {
                model: primary.clone(),
                usage: billed_usage(completion, &prompt, &mut warnings),
            }),
            _ => None,
        };
        let second = self.run_model(&fallback, &prompt, policy).await?;
        Ok(self.finish(
            record,
            &fallback,
            second,
            prior_attempts,
            true,
            superseded,
            &prompt,
            warnings,
        ))
    }

    /// Why the primary attempt should be handed to the fallback model, if it should
    fn fallback_reason(&self, attempt: &ModelAttempt) -> Option<String> {
        match (attempt, self.settings.fallback_policy) {
            (_, FallbackPolicy::Disabled) => None,
            (ModelAttempt::Unavailable { error, .. }, _) => Some(error.to_string()),
            (ModelAttempt::Exhausted { last_error, .. }, FallbackPolicy::OnFailure) => {
                Some(last_error.to_string())
            }
            (ModelAttempt::Succeeded { completion, .. }, FallbackPolicy::OnFailure) => {
                match self.validator.parse(&completion.content) {
                    ParsedResponse::Malformed(reason) => {
                        Some(format!("malformed response: {}", reason))
                    }
                    ParsedResponse::Parsed(_) => None,
                }
            }
            _ => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        record: &Record,
        model: &str,
        attempt: ModelAttempt,
        prior_attempts: u32,
        used_fallback: bool,
        superseded: Option<SupersededReply>,
        prompt: &BuiltPrompt,
        mut warnings: Vec<String>,
    ) -> CallOutcome {
        match attempt {
            ModelAttempt::Succeeded {
                completion,
                attempts,
            } => {
                let usage = billed_usage(&completion, prompt, &mut warnings);
                info!(
                    index = record.index,
                    model = %model,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    attempts = prior_attempts + attempts,
                    "API call completed"
                );
                CallOutcome::Completed(ModelReply {
                    model: model.to_string(),
                    content: completion.content,
                    usage,
                    attempts: prior_attempts + attempts,
                    used_fallback,
                    warnings,
                    superseded,
                })
            }
            ModelAttempt::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(
                    index = record.index,
                    model = %model,
                    attempts = prior_attempts + attempts,
                    error = %last_error,
                    "Retries exhausted"
                );
                CallOutcome::Exhausted {
                    model: model.to_string(),
                    attempts: prior_attempts + attempts,
                    used_fallback,
                    last_error,
                    warnings,
                    superseded,
                }
            }
            ModelAttempt::Unavailable { attempts, error }
            | ModelAttempt::Rejected { attempts, error } => {
                warn!(
                    index = record.index,
                    model = %model,
                    error = %error,
                    "Request rejected"
                );
                CallOutcome::Rejected {
                    model: model.to_string(),
                    attempts: prior_attempts + attempts,
                    used_fallback,
                    error,
                    warnings,
                    superseded,
                }
            }
        }
    }

    /// Run the retry state machine against one model
    async fn run_model(
        &self,
        model: &str,
        prompt: &BuiltPrompt,
        policy: RetryPolicy,
    ) -> Result<ModelAttempt> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: prompt.messages.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_output_tokens,
            json_mode: model.contains("gpt-4"),
        };
        let reservation = prompt.estimated_tokens + self.settings.max_output_tokens;
        let mut machine = RetryMachine::new(policy);

        loop {
            let attempt = machine.attempts();
            self.governor.reserve(reservation).await?;
            debug!(model = %model, attempt, "Sending completion request");

            let error = match self.backend.complete(&request).await {
                Ok(completion) => {
                    metrics::counter!("newslabel_attempts_total", "result" => "success")
                        .increment(1);
                    machine.succeed();
                    return Ok(ModelAttempt::Succeeded {
                        completion,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            metrics::counter!("newslabel_attempts_total", "result" => error.kind()).increment(1);
            match error.class() {
                ErrorClass::Fatal => {
                    return Ok(ModelAttempt::Rejected { attempts: attempt, error });
                }
                ErrorClass::ModelUnavailable => {
                    return Ok(ModelAttempt::Unavailable { attempts: attempt, error });
                }
                ErrorClass::Retryable => {}
            }

            warn!(model = %model, attempt, error = %error, "Retryable service error");
            match machine.fail(error).clone() {
                RetryState::Backoff { delay, .. } => {
                    debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                    machine.resume();
                }
                RetryState::ExhaustedFailed {
                    attempts,
                    last_error,
                } => {
                    return Ok(ModelAttempt::Exhausted {
                        attempts,
                        last_error,
                    });
                }
                RetryState::Attempting { .. } | RetryState::Succeeded { .. } => {}
            }
        }
    }
}

fn billed_usage(completion: &Completion, prompt: &BuiltPrompt, warnings: &mut Vec<String>) -> TokenUsage {
    completion.usage.unwrap_or_else(|| {
        warnings.push("usage not reported by service; billed from estimate".into());
        TokenUsage::new(prompt.estimated_tokens, estimate_tokens(&completion.content))
    })
}
