//! Raw document bytes to text.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("bytes are not valid {primary} or {fallback}")]
pub struct DecodeError {
    pub primary: &'static str,
    pub fallback: &'static str,
}

/// Turns raw document bytes into text.
pub trait TextDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError>;
}

/// Tries a primary encoding and then a fallback, both strictly (no
/// replacement characters).
#[derive(Debug, Clone, Copy)]
pub struct FallbackDecoder {
    primary: &'static Encoding,
    fallback: &'static Encoding,
}

impl Default for FallbackDecoder {
    /// UTF-8 first, then Windows-1252 (the web's Latin-1).
    fn default() -> Self {
        Self::new(UTF_8, WINDOWS_1252)
    }
}

impl FallbackDecoder {
    #[must_use]
    pub const fn new(primary: &'static Encoding, fallback: &'static Encoding) -> Self {
        Self { primary, fallback }
    }

    fn strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
        encoding
            .decode_without_bom_handling_and_without_replacement(strip_bom(encoding, bytes))
            .map(Cow::into_owned)
    }
}

impl TextDecoder for FallbackDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        if let Some(text) = Self::strict(self.primary, bytes) {
            return Ok(text);
        }
        tracing::debug!(
            primary = self.primary.name(),
            fallback = self.fallback.name(),
            "Primary decoding failed, trying fallback"
        );
        Self::strict(self.fallback, bytes).ok_or(DecodeError {
            primary: self.primary.name(),
            fallback: self.fallback.name(),
        })
    }
}

fn strip_bom<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((bom_encoding, len)) if bom_encoding == encoding => &bytes[len..],
        _ => bytes,
    }
}
