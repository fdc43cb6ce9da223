//! OpenAI-compatible chat completions backend
//!
//! Issues non-streaming `POST {base}/chat/completions` calls:
//! ```text
//! {"model":"gpt-4o-mini","messages":[...],"temperature":0.1,"max_tokens":500,
//!  "response_format":{"type":"json_object"}}
//! ```
//! and maps HTTP failures onto [`BackendError`].

use crate::backend::{BackendError, Completion, CompletionBackend, CompletionRequest};
use crate::config::BackendSettings;
use async_trait::async_trait;
use newslabel_core::{ChatMessage, Error, Result, TokenUsage};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat completions client for OpenAI and API-compatible services
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http_client: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
}

impl OpenAiBackend {
    /// Create a backend from connection settings
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(Error::config("API key is not set"));
        }

        let base = settings.api_base_url.trim_end_matches('/');
        let endpoint = url::Url::parse(&format!("{}/chat/completions", base))
            .map_err(|e| Error::config(format!("Invalid API base URL '{}': {}", base, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, BackendError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %text, "Backend request failed");
            return Err(map_status(status, retry_after, &text));
        }

        let text = response.text().await.map_err(map_transport_error)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Decode(format!("invalid completion body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Decode("completion has no message content".into()))?;

        Ok(Completion {
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            content,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Network(err.to_string())
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Map a non-success HTTP status and its error body onto the backend taxonomy
pub(crate) fn map_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> BackendError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error)
        .unwrap_or_default();
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| status.to_string());
    let code = detail.code.as_deref().or(detail.kind.as_deref());

    if code == Some("model_not_found") {
        return BackendError::ModelUnavailable(message);
    }

    match status.as_u16() {
        429 if code == Some("insufficient_quota") => BackendError::QuotaExceeded(message),
        429 => BackendError::RateLimited { retry_after },
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::ModelUnavailable(message),
        400 | 422 => BackendError::InvalidRequest(message),
        408 => BackendError::Timeout,
        503 => BackendError::ServiceUnavailable,
        status @ 500..=599 => BackendError::Server { status },
        _ => BackendError::InvalidRequest(message),
    }
}

// =============================================================================
// Wire structures
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ErrorClass;

    fn settings() -> BackendSettings {
        BackendSettings {
            api_key: "sk-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = OpenAiBackend::new(&BackendSettings::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let mut settings = settings();
        settings.api_base_url = "not a url".to_string();
        assert!(OpenAiBackend::new(&settings).is_err());
    }

    #[test]
    fn test_endpoint_joins_base() {
        let mut settings = settings();
        settings.api_base_url = "https://llm.internal/v1/".to_string();
        let backend = OpenAiBackend::new(&settings).unwrap();
        assert_eq!(
            backend.endpoint.as_str(),
            "https://llm.internal/v1/chat/completions"
        );
    }

    #[test]
    fn test_map_status_rate_limit() {
        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(3)),
            "",
        );
        assert_eq!(
            err,
            BackendError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn test_map_status_quota_is_fatal() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        let err = map_status(StatusCode::TOO_MANY_REQUESTS, None, body);
        assert!(matches!(err, BackendError::QuotaExceeded(_)));
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_map_status_model_not_found() {
        let body = r#"{"error":{"message":"The model `gpt-x` does not exist","type":"invalid_request_error","code":"model_not_found"}}"#;
        let err = map_status(StatusCode::BAD_REQUEST, None, body);
        assert_eq!(err.class(), ErrorClass::ModelUnavailable);
    }

    #[test]
    fn test_map_status_codes() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, None, ""),
            BackendError::Unauthorized(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, None, "{}"),
            BackendError::InvalidRequest(_)
        ));
        assert_eq!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, None, ""),
            BackendError::ServiceUnavailable
        );
        assert_eq!(
            map_status(StatusCode::BAD_GATEWAY, None, ""),
            BackendError::Server { status: 502 }
        );
        assert_eq!(
            map_status(StatusCode::REQUEST_TIMEOUT, None, ""),
            BackendError::Timeout
        );
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.1,
            max_tokens: 500,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json["messages"][0].get("name").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"id":"chatcmpl-1","model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"message":{"role":"assistant","content":"[]"},"finish_reason":"stop"}],"usage":{"prompt_tokens":812,"completion_tokens":41,"total_tokens":853}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 812);
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("[]"));
    }
}
