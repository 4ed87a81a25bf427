//! Configuration loading for precis.
//!
//! ```toml
//! [model]
//! provider = "azure"
//! model = "gpt-4o"
//! api_key = "${AZURE_OPENAI_API_KEY}"
//! base_url = "https://my-resource.openai.azure.com"
//! azure_deployment = "gpt-4o"
//!
//! [chunking]
//! max_tokens = 100000
//!
//! [pipeline]
//! combine = "concatenate"
//!
//! [email]
//! smtp_server = "smtp.example.com"
//! smtp_port = 587
//! ```
//!
//! Every section is optional. String values may reference environment
//! variables as `${VAR}`; unset variables expand to nothing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use precis_context::{DEFAULT_MAX_CHUNK_TOKENS, DEFAULT_TOKENIZER_MODEL};
use precis_notify::EmailConfig;
use precis_providers::{
    ApiConfig, ApiConfigError, DEFAULT_AZURE_API_VERSION, DEFAULT_MAX_RESPONSE_TOKENS, Endpoint,
    OPENAI_API_BASE_URL, RetryConfig,
};
use precis_types::{ApiKey, CombinePolicy, ModelParseError, Provider};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_RETRIES: u32 = 2;

const AZURE_ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown provider {0:?} (expected \"openai\" or \"azure\")")]
    UnknownProvider(String),
    #[error("invalid model name: {0}")]
    InvalidModel(#[from] ModelParseError),
    #[error("no API key configured; set [model] api_key or {env_var}")]
    MissingApiKey { env_var: &'static str },
    #[error("Azure OpenAI needs an endpoint; set [model] base_url or AZURE_OPENAI_ENDPOINT")]
    MissingAzureEndpoint,
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error(transparent)]
    Api(#[from] ApiConfigError),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrecisConfig {
    pub model: Option<ModelConfig>,
    pub chunking: Option<ChunkingConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub email: Option<EmailSection>,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// `openai` (default) or `azure`.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL, or the Azure resource endpoint.
    pub base_url: Option<String>,
    /// Azure deployment name. Defaults to the model name.
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
    pub max_response_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    /// Transport retries after the first attempt. 0 disables retrying.
    pub max_retries: Option<u32>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(opt: Option<&String>) -> &'static str {
            if opt.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &mask(self.api_key.as_ref()))
            .field("base_url", &self.base_url)
            .field("azure_deployment", &self.azure_deployment)
            .field("azure_api_version", &self.azure_api_version)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Model whose tiktoken encoding counts tokens. Default: `gpt-4`.
    pub tokenizer_model: Option<String>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub combine: Option<CombinePolicy>,
    /// Chunk requests in flight at once. Default: 1 (sequential).
    pub concurrency: Option<usize>,
    /// Files replacing the bundled instructions.
    pub summarization_instruction: Option<PathBuf>,
    pub final_instruction: Option<PathBuf>,
    pub comparison_instruction: Option<PathBuf>,
}

/// SMTP port as either a TOML integer or a string (`"${SMTP_PORT}"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailSection {
    pub address: Option<String>,
    pub password: Option<String>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<PortValue>,
    pub to: Option<String>,
}

impl std::fmt::Debug for EmailSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSection")
            .field("address", &self.address)
            .field(
                "password",
                &if self.password.is_some() { "[REDACTED]" } else { "None" },
            )
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("to", &self.to)
            .finish()
    }
}

/// Replace `${VAR}` references using `lookup`. Unknown variables expand to
/// the empty string; an unclosed `${` is kept verbatim.
pub fn expand_vars_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty()
                    && let Some(replacement) = lookup(var)
                {
                    out.push_str(&replacement);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn expand_env_vars(value: &str) -> String {
    expand_vars_with(value, |var| std::env::var(var).ok())
}

/// Chunking settings after defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSettings {
    pub tokenizer_model: String,
    pub max_tokens: usize,
}

/// Pipeline settings after defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub combine: CombinePolicy,
    pub concurrency: usize,
    pub max_response_tokens: u32,
}

impl PrecisConfig {
    /// Load from the default path. `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to parse config");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn chunk_settings(&self) -> Result<ChunkSettings, ConfigError> {
        let chunking = self.chunking.as_ref();
        let max_tokens = chunking
            .and_then(|c| c.max_tokens)
            .unwrap_or(DEFAULT_MAX_CHUNK_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::ZeroValue {
                field: "chunking.max_tokens",
            });
        }
        Ok(ChunkSettings {
            tokenizer_model: chunking
                .and_then(|c| c.tokenizer_model.clone())
                .unwrap_or_else(|| DEFAULT_TOKENIZER_MODEL.to_string()),
            max_tokens,
        })
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        let pipeline = self.pipeline.as_ref();
        let concurrency = pipeline.and_then(|p| p.concurrency).unwrap_or(1);
        if concurrency == 0 {
            return Err(ConfigError::ZeroValue {
                field: "pipeline.concurrency",
            });
        }
        let max_response_tokens = self
            .model
            .as_ref()
            .and_then(|m| m.max_response_tokens)
            .unwrap_or(DEFAULT_MAX_RESPONSE_TOKENS);
        if max_response_tokens == 0 {
            return Err(ConfigError::ZeroValue {
                field: "model.max_response_tokens",
            });
        }
        Ok(PipelineSettings {
            combine: pipeline.and_then(|p| p.combine).unwrap_or_default(),
            concurrency,
            max_response_tokens,
        })
    }

    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        self.api_config_with(|var| std::env::var(var).ok())
    }

    /// Build the model client configuration, reading fallbacks and `${VAR}`
    /// references through `lookup`.
    pub fn api_config_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ApiConfig, ConfigError> {
        let empty = ModelConfig::default();
        let section = self.model.as_ref().unwrap_or(&empty);
        let expand = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| expand_vars_with(v, &lookup))
                .filter(|v| !v.trim().is_empty())
        };

        let provider = match expand(&section.provider) {
            Some(raw) => Provider::parse(&raw).ok_or(ConfigError::UnknownProvider(raw))?,
            None => Provider::default(),
        };

        let model = match expand(&section.model) {
            Some(raw) => provider.parse_model(&raw)?,
            None => provider.default_model(),
        };

        let key = expand(&section.api_key)
            .or_else(|| lookup(provider.env_var()).filter(|v| !v.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey {
                env_var: provider.env_var(),
            })?;

        let endpoint = match provider {
            Provider::OpenAI => Endpoint::OpenAI {
                base_url: expand(&section.base_url)
                    .or_else(|| lookup(OPENAI_BASE_URL_ENV))
                    .unwrap_or_else(|| OPENAI_API_BASE_URL.to_string()),
            },
            Provider::Azure => Endpoint::Azure {
                resource_url: expand(&section.base_url)
                    .or_else(|| lookup(AZURE_ENDPOINT_ENV))
                    .ok_or(ConfigError::MissingAzureEndpoint)?,
                deployment: expand(&section.azure_deployment)
                    .unwrap_or_else(|| model.as_str().to_string()),
                api_version: expand(&section.azure_api_version)
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
        };

        let timeout_secs = section.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "model.timeout_secs",
            });
        }
        let retry = RetryConfig::default()
            .with_max_retries(section.max_retries.unwrap_or(DEFAULT_MAX_RETRIES));

        Ok(ApiConfig::new(ApiKey::new(provider, key), model, endpoint)?
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_retry(retry))
    }

    #[must_use]
    pub fn email_config(&self) -> EmailConfig {
        self.email_config_with(|var| std::env::var(var).ok())
    }

    /// Email settings from `[email]`, with unset fields filled from the
    /// `EMAIL_ADDRESS`, `EMAIL_PASSWORD`, `SMTP_SERVER`, `SMTP_PORT` and
    /// `TO_EMAIL` variables. Nothing is validated here.
    pub fn email_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> EmailConfig {
        let from_env = EmailConfig::from_lookup(&lookup);
        let Some(section) = self.email.as_ref() else {
            return from_env;
        };

        let expand = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| expand_vars_with(v, &lookup))
                .filter(|v| !v.trim().is_empty())
        };
        let port = section.smtp_port.as_ref().and_then(|port| match port {
            PortValue::Number(n) => Some(n.to_string()),
            PortValue::Text(text) => {
                Some(expand_vars_with(text, &lookup)).filter(|v| !v.trim().is_empty())
            }
        });

        EmailConfig {
            address: expand(&section.address),
            password: expand(&section.password),
            smtp_server: expand(&section.smtp_server),
            smtp_port: port,
            to: expand(&section.to),
        }
        .or(from_env)
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".precis").join("config.toml"))
}
