//! Text preparation for summarization.
//!
//! This crate provides:
//! - Byte decoding with a fallback encoding ([`FallbackDecoder`])
//! - Exact token counting via tiktoken ([`Tokenizer`])
//! - Token-bounded, order-preserving chunking ([`Chunker`])
//!
//! # Architecture
//!
//! ```text
//! raw bytes ──TextDecoder──▶ text ──Tokenizer──▶ token ids
//!                                                   │
//!                              Vec<Chunk> ◀──Chunker┘ (windows of ≤ max_tokens)
//! ```

mod chunker;
mod decode;
mod tokenizer;

pub use chunker::{ChunkError, Chunker, chunk};
pub use decode::{DecodeError, FallbackDecoder, TextDecoder};
pub use tokenizer::{DEFAULT_TOKENIZER_MODEL, Tokenizer, TokenizerError};

/// Chunk bound used when none is configured.
pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 100_000;
