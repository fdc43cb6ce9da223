//! Classification client integration tests
//!
//! Retry, fallback, and pacing behaviour against scripted backends. Time is
//! paused so backoff sleeps complete instantly and deterministically.


use mock_backends::{reply, ScriptedBackend};
use newslabel_classifiers::{
    BackendError, CallOutcome, ClassificationClient, ClassifierSettings, FallbackPolicy,
    FallbackRetry, RateGovernor, ResponseValidator,
};
use newslabel_core::{Error, Label, Record};
use std::sync::Arc;
use std::time::Duration;

const LABELS: &str = r#"[{"label": "Môi trường", "confidence": 0.9}]"#;

fn settings() -> ClassifierSettings {
    let mut settings = ClassifierSettings::default();
    settings.backend.api_key = "sk-test".to_string();
    settings.model = "primary".to_string();
    settings.fallback_model = Some("secondary".to_string());
    settings.retry.jitter = false;
    settings
}

fn client(backend: Arc<ScriptedBackend>, settings: ClassifierSettings) -> ClassificationClient {
    let governor = Arc::new(RateGovernor::new(&settings.rate_limits));
    ClassificationClient::new(backend, governor, settings)
}

fn record() -> Record {
    Record::new(
        0,
        "Ô nhiễm nguồn nước",
        "Nhà máy xả thải",
        "Các nhà máy xả thải trực tiếp xuống sông.",
    )
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_attempt() {
    let backend = Arc::new(ScriptedBackend::new().with_script("primary", vec![reply("primary", LABELS)]));
    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.model, "primary");
    assert_eq!(reply.attempts, 1);
    assert!(!reply.used_fallback);
    assert_eq!(reply.usage.input_tokens, 500);
    assert!(reply.warnings.is_empty());

    let validation = ResponseValidator::new(0.7, 4).validate(&reply.content);
    assert_eq!(validation.labels[0].label, Label::Environment);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, 500);
    assert!(!requests[0].json_mode);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_exhaust_after_max_retries() {
    let backend = Arc::new(ScriptedBackend::new().with_default(Err(BackendError::Timeout)));
    let start = tokio::time::Instant::now();

    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    match outcome {
        CallOutcome::Exhausted {
            model,
            attempts,
            last_error,
            used_fallback,
            ..
        } => {
            assert_eq!(model, "primary");
            assert_eq!(attempts, 3);
            assert_eq!(last_error, BackendError::Timeout);
            assert!(!used_fallback);
        }
        other => panic!("expected exhausted, got {:?}", other),
    }
    assert_eq!(backend.call_count(), 3);
    // 1s then 2s of backoff between the three attempts
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_errors() {
    let backend = Arc::new(ScriptedBackend::new().with_script(
        "primary",
        vec![
            Err(BackendError::RateLimited {
                retry_after: Some(Duration::from_secs(10)),
            }),
            Err(BackendError::Server { status: 502 }),
            reply("primary", LABELS),
        ],
    ));
    let start = tokio::time::Instant::now();

    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();
    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.attempts, 3);
    // Retry-After of 10s overrides the 1s backoff, then 2s
    assert_eq!(start.elapsed(), Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![Err(BackendError::Unauthorized("bad key".into()))]),
    );
    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    match outcome {
        CallOutcome::Rejected {
            model,
            attempts,
            error,
            used_fallback,
            ..
        } => {
            assert_eq!(model, "primary");
            assert_eq!(attempts, 1);
            assert_eq!(error, BackendError::Unauthorized("bad key".into()));
            assert!(!used_fallback);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_model_unavailable_falls_back() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script(
                "primary",
                vec![Err(BackendError::ModelUnavailable("gone".into()))],
            )
            .with_script("secondary", vec![reply("secondary", LABELS)]),
    );
    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.model, "secondary");
    assert!(reply.used_fallback);
    assert_eq!(reply.attempts, 2);
    assert!(reply.warnings.iter().any(|w| w.contains("used fallback secondary")));
}

#[tokio::test(start_paused = true)]
async fn test_model_unavailable_without_fallback_is_rejected() {
    let mut settings = settings();
    settings.fallback_policy = FallbackPolicy::Disabled;
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![Err(BackendError::ModelUnavailable("gone".into()))])
            .with_default(reply("secondary", LABELS)),
    );

    let outcome = client(backend.clone(), settings).classify(&record()).await.unwrap();
    assert!(matches!(
        outcome,
        CallOutcome::Rejected { ref model, .. } if model == "primary"
    ));
    assert_eq!(backend.calls_for("secondary"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_by_fallback_model_names_it() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![Err(BackendError::ModelUnavailable("gone".into()))])
            .with_script(
                "secondary",
                vec![Err(BackendError::InvalidRequest("context too long".into()))],
            ),
    );
    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    match outcome {
        CallOutcome::Rejected {
            model,
            attempts,
            used_fallback,
            warnings,
            ..
        } => {
            assert_eq!(model, "secondary");
            assert_eq!(attempts, 2);
            assert!(used_fallback);
            assert!(warnings.iter().any(|w| w.contains("used fallback secondary")));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_reply_falls_back_on_failure() {
    let mut settings = settings();
    settings.fallback_policy = FallbackPolicy::OnFailure;
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![reply("primary", "Tôi không chắc chắn.")])
            .with_script("secondary", vec![reply("secondary", LABELS)]),
    );

    let outcome = client(backend.clone(), settings).classify(&record()).await.unwrap();
    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.model, "secondary");
    assert!(reply.used_fallback);
    assert_eq!(reply.attempts, 2);
    assert!(reply.warnings.iter().any(|w| w.contains("malformed response")));

    // The discarded primary reply was still billed
    let superseded = reply.superseded.expect("primary reply billed");
    assert_eq!(superseded.model, "primary");
    assert_eq!(superseded.usage.input_tokens, 500);
    assert_eq!(backend.calls_for("secondary"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_reply_kept_without_on_failure() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![reply("primary", "not json")])
            .with_default(reply("secondary", LABELS)),
    );

    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();
    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.model, "primary");
    assert_eq!(reply.content, "not json");
    assert!(reply.superseded.is_none());
    assert_eq!(backend.calls_for("secondary"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_primary_does_not_fall_back_by_default() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![Err(BackendError::Timeout); 3])
            .with_script("secondary", vec![reply("secondary", LABELS)]),
    );
    let outcome = client(backend.clone(), settings()).classify(&record()).await.unwrap();

    assert!(matches!(outcome, CallOutcome::Exhausted { .. }));
    assert_eq!(backend.calls_for("secondary"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_on_failure_fallback_single_attempt() {
    let mut settings = settings();
    settings.fallback_policy = FallbackPolicy::OnFailure;
    settings.fallback_retry = FallbackRetry::SingleAttempt;
    let backend = Arc::new(ScriptedBackend::new().with_default(Err(BackendError::ServiceUnavailable)));

    let outcome = client(backend.clone(), settings).classify(&record()).await.unwrap();
    match outcome {
        CallOutcome::Exhausted {
            model,
            attempts,
            used_fallback,
            ..
        } => {
            assert_eq!(model, "secondary");
            assert_eq!(attempts, 4);
            assert!(used_fallback);
        }
        other => panic!("expected exhausted, got {:?}", other),
    }
    assert_eq!(backend.calls_for("primary"), 3);
    assert_eq!(backend.calls_for("secondary"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_on_failure_fallback_full_backoff() {
    let mut settings = settings();
    settings.fallback_policy = FallbackPolicy::OnFailure;
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_script("primary", vec![Err(BackendError::Timeout); 3])
            .with_script(
                "secondary",
                vec![Err(BackendError::Timeout), reply("secondary", LABELS)],
            ),
    );

    let outcome = client(backend.clone(), settings).classify(&record()).await.unwrap();
    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(reply.model, "secondary");
    assert_eq!(reply.attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn test_missing_usage_is_estimated() {
    let backend = Arc::new(ScriptedBackend::new().with_default(Ok(newslabel_classifiers::Completion {
        model: "primary".to_string(),
        content: LABELS.to_string(),
        usage: None,
    })));
    let outcome = client(backend, settings()).classify(&record()).await.unwrap();

    let CallOutcome::Completed(reply) = outcome else {
        panic!("expected completion");
    };
    assert!(reply.usage.input_tokens > 0);
    assert!(reply.usage.output_tokens > 0);
    assert!(reply.warnings.iter().any(|w| w.contains("billed from estimate")));
}

#[tokio::test(start_paused = true)]
async fn test_long_content_is_truncated_not_rejected() {
    let mut settings = settings();
    settings.max_tokens = 1500;
    settings.max_content_chars = usize::MAX;
    let backend = Arc::new(ScriptedBackend::new().with_default(reply("primary", LABELS)));
    let client = client(backend.clone(), settings);

    let long = Record::new(3, "Tiêu đề", "Mô tả", "Đất đai ".repeat(5000));
    let prompt = client.prompt_for(&long);
    assert!(prompt.truncated);
    assert!(prompt.estimated_tokens <= 1500);

    let CallOutcome::Completed(reply) = client.classify(&long).await.unwrap() else {
        panic!("expected completion");
    };
    assert!(reply.warnings.iter().any(|w| w.contains("truncated")));
}

#[tokio::test(start_paused = true)]
async fn test_gpt4_models_request_json_mode() {
    let mut settings = settings();
    settings.model = "gpt-4o-mini".to_string();
    let backend = Arc::new(ScriptedBackend::new().with_default(reply("gpt-4o-mini", LABELS)));
    client(backend.clone(), settings).classify(&record()).await.unwrap();

    assert!(backend.requests()[0].json_mode);
}

#[tokio::test(start_paused = true)]
async fn test_check_connection() {
    let backend = Arc::new(ScriptedBackend::new().with_default(reply("primary", "Hi")));
    let completion = client(backend.clone(), settings()).check_connection().await.unwrap();
    assert_eq!(completion.content, "Hi");
    assert_eq!(backend.requests()[0].max_tokens, 10);

    let backend = Arc::new(
        ScriptedBackend::new().with_default(Err(BackendError::Unauthorized("bad key".into()))),
    );
    let err = client(backend, settings()).check_connection().await.unwrap_err();
    assert!(matches!(err, Error::Fatal(_)));
}
