//! Token counting and window decoding using tiktoken.
//!
//! The BPE is selected by model name (`gpt-4` resolves to `cl100k_base`,
//! `gpt-4o` to `o200k_base`). Counts are exact for OpenAI models.

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

/// Model whose encoding is used when none is configured.
pub const DEFAULT_TOKENIZER_MODEL: &str = "gpt-4";

/// The cl100k vocabulary is expensive to load, so the default tokenizer is
/// built once and shared.
static CL100K: OnceLock<Option<Arc<CoreBPE>>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("no tiktoken encoding known for model {model:?}: {reason}")]
    UnknownModel { model: String, reason: String },
    #[error("failed to load tiktoken encoding: {0}")]
    Load(String),
}

/// Thread-safe tokenizer bound to one model's encoding.
#[derive(Clone)]
pub struct Tokenizer {
    model: String,
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("model", &self.model)
            .field("bpe", &"<CoreBPE>")
            .finish()
    }
}

impl Tokenizer {
    /// Tokenizer for `model`. The default model reuses a shared encoder.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let model = model.trim();
        if model == DEFAULT_TOKENIZER_MODEL {
            return Self::cl100k();
        }

        let bpe = get_bpe_from_model(model).map_err(|e| TokenizerError::UnknownModel {
            model: model.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            model: model.to_string(),
            bpe: Arc::new(bpe),
        })
    }

    /// Shared `cl100k_base` tokenizer (the `gpt-4` encoding).
    pub fn cl100k() -> Result<Self, TokenizerError> {
        let bpe = CL100K
            .get_or_init(|| match cl100k_base() {
                Ok(bpe) => Some(Arc::new(bpe)),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Failed to initialize tiktoken cl100k_base encoder"
                    );
                    None
                }
            })
            .clone()
            .ok_or_else(|| TokenizerError::Load("cl100k_base".to_string()))?;

        Ok(Self {
            model: DEFAULT_TOKENIZER_MODEL.to_string(),
            bpe,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Token ids for `text`. Special-token markup is treated as plain text.
    #[must_use]
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Decode a token window back into text.
    ///
    /// Fails when the window starts or ends inside a multi-byte character.
    pub fn decode(&self, tokens: &[u32]) -> Result<String, String> {
        self.bpe.decode(tokens.to_vec()).map_err(|e| e.to_string())
    }
}
