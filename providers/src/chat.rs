//! OpenAI / Azure OpenAI Chat Completions client.
//!
//! One call is one non-streaming `POST .../chat/completions` carrying a system
//! message (the instruction) and a user message (the content).

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::Instrument;

use crate::{
    ApiConfig, ApiConfigError, CompletionFut, CompletionRequest, LanguageModel, ModelError,
    http_client_with_timeout, read_capped_error_body,
    retry::{RetryOutcome, send_with_retry},
};
use precis_types::Provider;

/// Error `type`/`code` values that mark a request the provider will never accept.
const INVALID_REQUEST_KINDS: &[&str] = &["invalid_request_error", "content_filter"];

/// Chat completions client bound to a single validated [`ApiConfig`].
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: ApiConfig,
    http: reqwest::Client,
    url: String,
}

impl ChatClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiConfigError> {
        let http = http_client_with_timeout(config.timeout(), config.requires_https())?;
        let url = config.completions_url();
        Ok(Self { config, http, url })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.provider() {
            Provider::OpenAI => builder.bearer_auth(self.config.api_key()),
            Provider::Azure => builder.header("api-key", self.config.api_key()),
        }
    }

    async fn send(&self, request: CompletionRequest<'_>) -> Result<String, ModelError> {
        let body = build_request_body(self.config.model().as_str(), request);

        let outcome = send_with_retry(
            || {
                self.authorize(self.http.post(&self.url))
                    .header("content-type", "application/json")
                    .json(&body)
            },
            self.config.retry(),
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let error_text = read_capped_error_body(response).await;
                return Err(classify_http_error(status, &error_text));
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(ModelError::Failure(format!(
                    "request failed after {attempts} attempts: {source}"
                )));
            }
            RetryOutcome::NonRetryable(e) => {
                return Err(ModelError::Failure(format!("request failed: {e}")));
            }
        };

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Failure(format!("unreadable response body: {e}")))?;

        extract_content(&payload)
    }
}

impl LanguageModel for ChatClient {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a> {
        let span = tracing::debug_span!(
            "chat_completion",
            provider = %self.config.provider(),
            model = %self.config.model(),
            content_bytes = request.content.len(),
        );
        Box::pin(self.send(request).instrument(span))
    }
}

fn build_request_body(model: &str, request: CompletionRequest<'_>) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.instruction },
            { "role": "user", "content": request.content },
        ],
        "max_tokens": request.max_tokens,
    })
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Map a final non-2xx response onto [`ModelError`].
///
/// 400, 404 and 422 are rejections of the request itself, as is any body
/// whose error `type` or `code` names an invalid request or content filter.
fn classify_http_error(status: reqwest::StatusCode, body: &str) -> ModelError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);

    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| body.trim().to_string());
    let text = format!("API error {status}: {message}");

    let flagged = detail.as_ref().is_some_and(|d| {
        [d.kind.as_deref(), d.code.as_deref()]
            .into_iter()
            .flatten()
            .any(|k| INVALID_REQUEST_KINDS.contains(&k))
    });

    if flagged || matches!(status.as_u16(), 400 | 404 | 422) {
        ModelError::InvalidRequest(text)
    } else {
        ModelError::Failure(text)
    }
}

fn extract_content(payload: &Value) -> Result<String, ModelError> {
    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| ModelError::Failure("response contained no choices".to_string()))?;

    if choice.get("finish_reason").and_then(Value::as_str) == Some("content_filter") {
        return Err(ModelError::InvalidRequest(
            "response withheld by content filter".to_string(),
        ));
    }

    choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ModelError::Failure("response choice had no message content".to_string()))
}
