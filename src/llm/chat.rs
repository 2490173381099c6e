//! # Completion Dispatch
//!
//! Sends an assembled prompt to a provider's chat-completions endpoint. All
//! launch providers speak the OpenAI-compatible request shape at different
//! base URLs. Transient failures (429, 5xx, transport errors) are retried
//! with exponential backoff up to the caller's retry limit; everything else
//! is terminal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use super::{ApiKey, Error, http_client};

/// Longest backoff between retry attempts.
const MAX_BACKOFF_SECS: u64 = 60;

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub provider_id: &'a str,
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

/// Chat-completions request body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat-completions response body
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Seam between the processor and the remote endpoint, so the pipeline can
/// be exercised without a network.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest<'_>,
        api_key: &ApiKey,
    ) -> Result<String, Error>;
}

/// Production client speaking HTTP to the configured provider.
pub struct HttpCompletionClient;

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        request: &CompletionRequest<'_>,
        api_key: &ApiKey,
    ) -> Result<String, Error> {
        complete(request, api_key).await
    }
}

/// Chat-completions endpoint for a provider id.
fn chat_endpoint(provider_id: &str) -> Option<String> {
    let base = match provider_id {
        "deepseek" => "https://api.deepseek.com/v1",
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        _ => return None,
    };
    Some(format!("{}/chat/completions", base))
}

/// Whether an HTTP status is worth retrying.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Exponential backoff for the given attempt number (1-based), capped.
fn backoff_delay(attempt: usize) -> Duration {
    let secs = 1u64
        .checked_shl(attempt as u32)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Execute one completion call with retry.
pub async fn complete(
    request: &CompletionRequest<'_>,
    api_key: &ApiKey,
) -> Result<String, Error> {
    let url = chat_endpoint(request.provider_id).ok_or_else(|| {
        Error::new(
            request.provider_id,
            format!("no completion endpoint for provider '{}'", request.provider_id),
        )
    })?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match send_once(request, api_key, &url).await {
            Ok(text) => return Ok(text),
            Err((retryable, error)) => {
                if !retryable || attempt > request.max_retries {
                    return Err(error);
                }
                let delay = backoff_delay(attempt);
                warn!(
                    "completion attempt {}/{} failed ({}), retrying in {}s",
                    attempt,
                    request.max_retries + 1,
                    error,
                    delay.as_secs()
                );
                sleep(delay).await;
            }
        }
    }
}

async fn send_once(
    request: &CompletionRequest<'_>,
    api_key: &ApiKey,
    url: &str,
) -> Result<String, (bool, Error)> {
    let provider = request.provider_id;
    let body = ChatRequest {
        model: request.model,
        messages: vec![
            ChatMessage { role: "system", content: request.system },
            ChatMessage { role: "user", content: request.user },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    };

    let response = http_client()
        .post(url)
        .bearer_auth(api_key.expose())
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(request.timeout_secs))
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            // Timeouts and connection errors are worth another attempt.
            (true, Error::new(provider, format!("HTTP request failed: {}", e)))
        })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        let message = extract_error_message(&error_text)
            .unwrap_or_else(|| format!("HTTP {}: {}", status, error_text));
        return Err((is_retryable_status(status), Error::new(provider, message)));
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|e| (false, Error::new(provider, format!("Failed to parse response: {}", e))))?;

    match parsed.choices.into_iter().next() {
        Some(choice) => Ok(choice.message.content),
        None => Err((false, Error::new(provider, "No choices in response"))),
    }
}

/// Pull the vendor's error message out of an error body, if it has one.
fn extract_error_message(error_text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(error_text).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_have_endpoints() {
        assert!(chat_endpoint("deepseek").unwrap().ends_with("/chat/completions"));
        assert!(chat_endpoint("openai").is_some());
        assert!(chat_endpoint("openrouter").is_some());
        assert!(chat_endpoint("unknown").is_none());
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));

        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(10), Duration::from_secs(60));
    }

    #[test]
    fn error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "auth"}}"#;
        assert_eq!(extract_error_message(body), Some("Invalid API key".to_string()));
        assert_eq!(extract_error_message("not json"), None);
        assert_eq!(extract_error_message(r#"{"detail": "other"}"#), None);
    }
}
