//! Language-model client for chat completions.
//!
//! # Architecture
//!
//! - [`LanguageModel`] - the seam every caller depends on: one instruction, one
//!   user message, one capped response.
//! - [`chat`] - OpenAI / Azure OpenAI Chat Completions implementation.
//! - [`retry`] - transport-level retry with exponential backoff.
//!
//! # Configuration
//!
//! Use [`ApiConfig`] to bundle credentials, model and endpoint. The constructor
//! validates that the API key, model and endpoint all belong to the same
//! provider and that the endpoint URL is acceptable, so a mismatched setup is
//! rejected before the first request.
//!
//! # Error Handling
//!
//! Calls return [`ModelError`], a two-variant sum type:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `InvalidRequest` | The provider rejected this request (malformed, filtered, repetitive) |
//! | `Failure` | Anything else: transport, timeout, exhausted retries, bad payload |
//!
//! Callers decide what a failure means for them; nothing here panics or
//! retries beyond the configured transport policy.

pub mod chat;
pub mod retry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use precis_types::{ApiKey, ModelName, Provider};
use thiserror::Error;

pub use chat::ChatClient;
pub use precis_types;
pub use retry::RetryConfig;

/// Canonical OpenAI API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
/// Azure OpenAI API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Response-token cap applied to every call unless configured otherwise.
pub const DEFAULT_MAX_RESPONSE_TOKENS: u32 = 3000;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 30;

// Note: reqwest only exposes tcp_keepalive (idle time); interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

// ============================================================================
// Model seam
// ============================================================================

/// One chat request: a system instruction, a user message and a response cap.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub instruction: &'a str,
    pub content: &'a str,
    pub max_tokens: u32,
}

/// Failure of a single model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The provider refused the request itself (HTTP 400-class, content filter).
    #[error("request rejected by provider: {0}")]
    InvalidRequest(String),
    /// Network, timeout, provider outage, unexpected payload.
    #[error("model call failed: {0}")]
    Failure(String),
}

impl ModelError {
    #[must_use]
    pub const fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

pub type CompletionFut<'a> = Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;

/// A chat model that answers one instruction + user message pair.
pub trait LanguageModel: Send + Sync {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a>;
}

impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a> {
        (**self).complete(request)
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for &T {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a> {
        (**self).complete(request)
    }
}

// ============================================================================
// HTTP client
// ============================================================================

fn base_client_builder(https_only: bool) -> reqwest::ClientBuilder {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(concat!("precis/", env!("CARGO_PKG_VERSION"))),
    );

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(https_only)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

pub fn http_client_with_timeout(
    timeout: Duration,
    https_only: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder(https_only).timeout(timeout).build()
}

/// Read an error body, truncating anything past 32 KiB.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

// ============================================================================
// Endpoint & configuration
// ============================================================================

/// Where chat completion requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// OpenAI-compatible API rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    OpenAI { base_url: String },
    /// Azure OpenAI resource addressed by deployment name.
    Azure {
        resource_url: String,
        deployment: String,
        api_version: String,
    },
}

impl Endpoint {
    #[must_use]
    pub fn openai_default() -> Self {
        Self::OpenAI {
            base_url: OPENAI_API_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self {
            Self::OpenAI { .. } => Provider::OpenAI,
            Self::Azure { .. } => Provider::Azure,
        }
    }

    fn root(&self) -> &str {
        match self {
            Self::OpenAI { base_url } => base_url,
            Self::Azure { resource_url, .. } => resource_url,
        }
    }

    /// Full URL of the chat completions route.
    #[must_use]
    pub fn completions_url(&self) -> String {
        match self {
            Self::OpenAI { base_url } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Self::Azure {
                resource_url,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                resource_url.trim_end_matches('/')
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiConfigError {
    #[error("API key provider {key} does not match model provider {model}")]
    ProviderMismatch { key: Provider, model: Provider },
    #[error("endpoint provider {endpoint} does not match model provider {model}")]
    EndpointMismatch { endpoint: Provider, model: Provider },
    #[error("invalid endpoint URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("plain http is only allowed for loopback hosts (got {0})")]
    InsecureUrl(String),
    #[error("Azure deployment name must not be empty")]
    EmptyDeployment,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Credentials, model and endpoint for one chat backend.
///
/// ```rust
/// use precis_providers::{ApiConfig, Endpoint};
/// use precis_types::{ApiKey, Provider};
///
/// let config = ApiConfig::new(
///     ApiKey::new(Provider::OpenAI, "test"),
///     Provider::OpenAI.default_model(),
///     Endpoint::openai_default(),
/// )
/// .unwrap();
/// assert!(config.completions_url().ends_with("/chat/completions"));
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    api_key: ApiKey,
    model: ModelName,
    endpoint: Endpoint,
    timeout: Duration,
    retry: RetryConfig,
}

impl ApiConfig {
    pub fn new(
        api_key: ApiKey,
        model: ModelName,
        endpoint: Endpoint,
    ) -> Result<Self, ApiConfigError> {
        let key_provider = api_key.provider();
        let model_provider = model.provider();
        if key_provider != model_provider {
            return Err(ApiConfigError::ProviderMismatch {
                key: key_provider,
                model: model_provider,
            });
        }
        if endpoint.provider() != model_provider {
            return Err(ApiConfigError::EndpointMismatch {
                endpoint: endpoint.provider(),
                model: model_provider,
            });
        }
        if let Endpoint::Azure { deployment, .. } = &endpoint
            && deployment.trim().is_empty()
        {
            return Err(ApiConfigError::EmptyDeployment);
        }
        validate_endpoint_url(endpoint.root())?;

        Ok(Self {
            api_key,
            model,
            endpoint,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.api_key.provider()
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    #[must_use]
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn completions_url(&self) -> String {
        self.endpoint.completions_url()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Loopback endpoints (mock servers, local proxies) may use plain http.
    #[must_use]
    pub fn requires_https(&self) -> bool {
        !reqwest::Url::parse(self.endpoint.root()).is_ok_and(|url| url.scheme() == "http")
    }
}

fn validate_endpoint_url(raw: &str) -> Result<(), ApiConfigError> {
    let url = reqwest::Url::parse(raw).map_err(|e| ApiConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "https" => Ok(()),
        "http" => {
            let loopback = matches!(
                url.host_str(),
                Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
            );
            if loopback {
                Ok(())
            } else {
                Err(ApiConfigError::InsecureUrl(raw.to_string()))
            }
        }
        other => Err(ApiConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
