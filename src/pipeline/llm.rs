//! The model call: build the multimodal message and send it to the provider.
//!
//! A request is a single user turn carrying the prompt text and, when there
//! is a document, one image. An optional system message goes first.
//!
//! ## Retry Strategy
//!
//! Transient failures (5xx, timeouts, 429) are retried with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`). Authentication failures are
//! returned immediately since a retry cannot fix a bad key.

use crate::config::PromptConfig;
use crate::error::DocPromptError;
use crate::pipeline::encode::Attachment;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Text returned by the model plus usage numbers.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Failed attempts before the one that succeeded.
    pub retries: u32,
    pub duration_ms: u64,
}

/// Build the chat messages for one request.
pub fn build_messages(
    prompt: &str,
    attachment: Option<&Attachment>,
    system_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);

    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }

    match attachment {
        Some(att) => messages.push(ChatMessage::user_with_images(
            prompt,
            vec![att.image.clone()],
        )),
        None => messages.push(ChatMessage::user(prompt)),
    }

    messages
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Auth,
    RateLimit,
    Timeout,
    Transient,
}

/// Classify a provider error by its message.
fn classify(message: &str) -> FailureKind {
    let m = message.to_lowercase();
    if m.contains("401")
        || m.contains("403")
        || m.contains("unauthorized")
        || m.contains("authentication")
        || m.contains("api key not valid")
        || m.contains("invalid api key")
        || m.contains("permission_denied")
    {
        FailureKind::Auth
    } else if m.contains("429") || m.contains("rate limit") || m.contains("resource_exhausted") {
        FailureKind::RateLimit
    } else {
        FailureKind::Transient
    }
}

/// Send `messages` to the provider, retrying transient failures.
pub async fn generate(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    config: &PromptConfig,
) -> Result<GeneratedText, DocPromptError> {
    let start = Instant::now();
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last: Option<(FailureKind, String)> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            let reason = last.as_ref().map(|(_, m)| m.as_str()).unwrap_or("");
            warn!(
                "Retry {}/{} after {}ms - {}",
                attempt, config.max_retries, backoff, reason
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_retry(attempt, config.max_retries, reason);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, provider.chat(messages, Some(&options))).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                debug!(
                    "{} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens, response.completion_tokens, duration
                );
                return Ok(GeneratedText {
                    text: response.content,
                    input_tokens: response.prompt_tokens as u64,
                    output_tokens: response.completion_tokens as u64,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                let kind = classify(&message);
                warn!("Attempt {} failed - {}", attempt + 1, message);
                if kind == FailureKind::Auth {
                    return Err(DocPromptError::AuthError {
                        provider: provider.name().to_string(),
                        detail: message,
                    });
                }
                last = Some((kind, message));
            }
            Err(_) => {
                warn!(
                    "Attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
                last = Some((
                    FailureKind::Timeout,
                    format!("timed out after {}s", config.api_timeout_secs),
                ));
            }
        }
    }

    let attempts = config.max_retries + 1;
    Err(match last {
        Some((FailureKind::Timeout, _)) => DocPromptError::ApiTimeout {
            secs: config.api_timeout_secs,
        },
        Some((FailureKind::RateLimit, _)) => DocPromptError::RateLimitExceeded {
            provider: provider.name().to_string(),
        },
        Some((_, message)) => DocPromptError::LlmApiError { attempts, message },
        None => DocPromptError::LlmApiError {
            attempts,
            message: "Unknown error".to_string(),
        },
    })
}

/// Build `CompletionOptions` from the prompt config.
fn build_options(config: &PromptConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::{ScriptedProvider, Step};
    use super::*;
    use crate::pipeline::encode::attach_page;
    use crate::progress::PromptProgressCallback;
    use edgequake_llm::{LlmError, MockProvider};
    use image::{DynamicImage, RgbImage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RetryLog(Mutex<Vec<(u32, u32)>>);

    impl PromptProgressCallback for RetryLog {
        fn on_retry(&self, attempt: u32, max: u32, _error: &str) {
            self.0.lock().unwrap().push((attempt, max));
        }
    }

    fn fast_config(max_retries: u32) -> PromptConfig {
        PromptConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn question() -> Vec<ChatMessage> {
        build_messages("What colour is it?", None, None)
    }

    #[test]
    fn build_options_defaults() {
        let config = PromptConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.4));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn text_only_is_single_user_message() {
        let msgs = build_messages("What is Rust?", None, None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "What is Rust?");
    }

    #[test]
    fn system_prompt_goes_first() {
        let msgs = build_messages("hi", None, Some("Be brief."));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "Be brief.");
        assert_eq!(msgs[1].content, "hi");
    }

    #[test]
    fn blank_system_prompt_is_skipped() {
        let msgs = build_messages("hi", None, Some("   "));
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn attachment_rides_on_user_message() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let att = attach_page(&img, 1, 90).unwrap();
        let msgs = build_messages("Summarise this page", Some(&att), None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "Summarise this page");
        let images = msgs[0].images.as_ref().expect("image attached");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/jpeg");
    }

    #[test]
    fn classify_failures() {
        assert_eq!(classify("HTTP 403: API key not valid"), FailureKind::Auth);
        assert_eq!(classify("401 Unauthorized"), FailureKind::Auth);
        assert_eq!(classify("429 Too Many Requests"), FailureKind::RateLimit);
        assert_eq!(classify("RESOURCE_EXHAUSTED: quota"), FailureKind::RateLimit);
        assert_eq!(classify("503 Service Unavailable"), FailureKind::Transient);
    }

    #[tokio::test]
    async fn first_attempt_succeeds() {
        let mock = MockProvider::new();
        mock.add_response("Red.").await;
        let provider: Arc<dyn LLMProvider> = Arc::new(mock);

        let out = generate(&provider, &question(), &fast_config(2)).await.unwrap();
        assert_eq!(out.text, "Red.");
        assert_eq!(out.retries, 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let log = Arc::new(RetryLog::default());
        let config = PromptConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .progress_callback(log.clone())
            .build()
            .unwrap();
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(LlmError::ApiError("503 Service Unavailable".into())),
            Step::Reply("Blue."),
        ]));
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let out = generate(&provider, &question(), &config).await.unwrap();
        assert_eq!(out.text, "Blue.");
        assert_eq!(out.retries, 1);
        assert_eq!(scripted.calls(), 2);
        assert_eq!(*log.0.lock().unwrap(), vec![(1, 2)]);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(LlmError::AuthError("401 API key not valid".into())),
            Step::Reply("unreachable"),
        ]));
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let err = generate(&provider, &question(), &fast_config(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DocPromptError::AuthError { .. }), "got: {err}");
        assert_eq!(scripted.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_exhausts_retries() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(LlmError::RateLimited("429 quota".into())),
            Step::Fail(LlmError::RateLimited("429 quota".into())),
            Step::Fail(LlmError::RateLimited("429 quota".into())),
        ]));
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let err = generate(&provider, &question(), &fast_config(2))
            .await
            .unwrap_err();
        assert!(
            matches!(err, DocPromptError::RateLimitExceeded { ref provider } if provider == "scripted"),
            "got: {err}"
        );
        assert_eq!(scripted.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_failure_reports_attempts() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Step::Fail(LlmError::ApiError("500 internal".into())),
            Step::Fail(LlmError::ApiError("502 bad gateway".into())),
        ]));
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let err = generate(&provider, &question(), &fast_config(1))
            .await
            .unwrap_err();
        match err {
            DocPromptError::LlmApiError { attempts, message } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("502"), "got: {message}");
            }
            other => panic!("expected LlmApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let config = PromptConfig::builder()
            .max_retries(0)
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let provider: Arc<dyn LLMProvider> = Arc::new(ScriptedProvider::new(vec![Step::Stall(
            Duration::from_secs(5),
        )]));

        let err = generate(&provider, &question(), &config).await.unwrap_err();
        assert!(
            matches!(err, DocPromptError::ApiTimeout { secs: 1 }),
            "got: {err}"
        );
    }

    #[test]
    fn classify_library_errors() {
        let auth = LlmError::AuthError("bad key".into()).to_string();
        assert_eq!(classify(&auth), FailureKind::Auth);
        let limited = LlmError::RateLimited("slow down".into()).to_string();
        assert_eq!(classify(&limited), FailureKind::RateLimit);
    }
}
