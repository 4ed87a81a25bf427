//! Core domain types for precis.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A non-empty `&'static str`, checked at compile time when used in a const.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonEmptyStaticStr(&'static str);

impl NonEmptyStaticStr {
    #[must_use]
    pub const fn new(value: &'static str) -> Self {
        assert!(!value.is_empty(), "NonEmptyStaticStr must not be empty");
        Self(value)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

// ============================================================================
// Provider & Model Types
// ============================================================================

/// Supported chat-completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    /// Azure OpenAI deployment (`engine=` style addressing).
    Azure,
}

impl Provider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Azure => "azure",
        }
    }

    #[must_use]
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Azure => "AZURE_OPENAI_API_KEY",
        }
    }

    #[must_use]
    pub fn default_model(&self) -> ModelName {
        ModelName::known(*self, "gpt-4o")
    }

    /// Parse provider from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" | "chatgpt" => Some(Provider::OpenAI),
            "azure" | "azure-openai" | "azure_openai" => Some(Provider::Azure),
            _ => None,
        }
    }

    /// Parse a model name for this provider.
    pub fn parse_model(&self, raw: &str) -> Result<ModelName, ModelParseError> {
        ModelName::parse(*self, raw)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModelParseError {
    #[error("model name cannot be empty")]
    Empty,
    #[error("model name cannot contain whitespace (got {0:?})")]
    Whitespace(String),
}

/// Provider-scoped model name.
///
/// For Azure this is the model the deployment serves; the deployment name is
/// configured separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelName {
    provider: Provider,
    #[serde(rename = "model")]
    name: Cow<'static, str>,
}

impl ModelName {
    pub fn parse(provider: Provider, raw: &str) -> Result<Self, ModelParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ModelParseError::Whitespace(trimmed.to_string()));
        }

        Ok(Self {
            provider,
            name: Cow::Owned(trimmed.to_string()),
        })
    }

    #[must_use]
    pub const fn known(provider: Provider, name: &'static str) -> Self {
        Self {
            provider,
            name: Cow::Borrowed(name),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.name.as_ref()
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

// ============================================================================
// API Key Types
// ============================================================================

/// Provider-scoped API key.
///
/// Note: `Debug` is manually implemented to redact the key value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone)]
pub enum ApiKey {
    OpenAI(String),
    Azure(String),
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKey::OpenAI(_) => write!(f, "ApiKey::OpenAI(<redacted>)"),
            ApiKey::Azure(_) => write!(f, "ApiKey::Azure(<redacted>)"),
        }
    }
}

impl ApiKey {
    #[must_use]
    pub fn new(provider: Provider, key: impl Into<String>) -> Self {
        match provider {
            Provider::OpenAI => ApiKey::OpenAI(key.into()),
            Provider::Azure => ApiKey::Azure(key.into()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            ApiKey::OpenAI(_) => Provider::OpenAI,
            ApiKey::Azure(_) => Provider::Azure,
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        match self {
            ApiKey::OpenAI(key) | ApiKey::Azure(key) => key,
        }
    }
}

// ============================================================================
// Documents & Chunks
// ============================================================================

/// Identifier of one ingested document (usually its file name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded plain-text document. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: DocumentId,
    content: String,
}

impl Document {
    #[must_use]
    pub fn new(id: DocumentId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A token-bounded contiguous slice of a document, reconstituted as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    index: usize,
    text: String,
    token_count: usize,
}

impl Chunk {
    #[must_use]
    pub fn new(index: usize, text: impl Into<String>, token_count: usize) -> Self {
        Self {
            index,
            text: text.into(),
            token_count,
        }
    }

    /// Zero-based position in the document.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn token_count(&self) -> usize {
        self.token_count
    }
}

/// Model output for one chunk, keyed by the chunk's index.
///
/// A failed request still produces a summary: its text is the sentinel string
/// and `failed` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    index: usize,
    text: String,
    failed: bool,
}

impl ChunkSummary {
    #[must_use]
    pub fn succeeded(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            failed: false,
        }
    }

    #[must_use]
    pub fn failed(index: usize, sentinel: impl Into<String>) -> Self {
        Self {
            index,
            text: sentinel.into(),
            failed: true,
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }
}

impl AsRef<str> for ChunkSummary {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// The combined summary for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalSummary {
    document: DocumentId,
    text: String,
    chunk_count: usize,
    failed_chunks: usize,
}

impl FinalSummary {
    #[must_use]
    pub fn new(
        document: DocumentId,
        text: impl Into<String>,
        chunk_count: usize,
        failed_chunks: usize,
    ) -> Self {
        Self {
            document,
            text: text.into(),
            chunk_count,
            failed_chunks,
        }
    }

    #[must_use]
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Chunks whose summary is a sentinel string.
    #[must_use]
    pub const fn failed_chunks(&self) -> usize {
        self.failed_chunks
    }
}

impl fmt::Display for FinalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Instructions & Policies
// ============================================================================

/// Which model behavior an instruction selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    Summarization,
    FinalCombination,
    Comparison,
}

impl InstructionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarization => "summarization",
            Self::FinalCombination => "final",
            Self::Comparison => "comparison",
        }
    }
}

/// A system message sent ahead of the user content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    kind: InstructionKind,
    text: Cow<'static, str>,
}

impl Instruction {
    #[must_use]
    pub fn new(kind: InstructionKind, text: NonEmptyString) -> Self {
        Self {
            kind,
            text: Cow::Owned(text.into_inner()),
        }
    }

    /// Instruction backed by text compiled into the binary.
    #[must_use]
    pub const fn bundled(kind: InstructionKind, text: NonEmptyStaticStr) -> Self {
        Self {
            kind,
            text: Cow::Borrowed(text.as_str()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> InstructionKind {
        self.kind
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Two instructions are distinct when their text differs, ignoring
    /// surrounding whitespace.
    #[must_use]
    pub fn is_distinct_from(&self, other: &Instruction) -> bool {
        self.as_str().trim() != other.as_str().trim()
    }
}

/// How chunk summaries become the final summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// Join chunk summaries with a blank line. No model call.
    #[default]
    Concatenate,
    /// Send the joined summaries through one more model call using the final
    /// instruction. Falls back to concatenation for a single summary or when
    /// the final instruction equals the chunk instruction.
    Resummarize,
}

impl CombinePolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "concatenate" | "concat" | "local" => Some(Self::Concatenate),
            "resummarize" | "model" => Some(Self::Resummarize),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concatenate => "concatenate",
            Self::Resummarize => "resummarize",
        }
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Chunking,
    Summarizing,
    Combining,
    Done,
    Failed,
}

impl PipelineState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Chunking => "chunking",
            Self::Summarizing => "summarizing",
            Self::Combining => "combining",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
