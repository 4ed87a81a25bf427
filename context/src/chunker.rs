//! Token-bounded document chunking.
//!
//! The token stream is cut into contiguous windows of at most `max_tokens`
//! and each window is decoded back to text. A cut that would land inside a
//! multi-byte character is moved back until the window decodes, so every
//! chunk is valid text and the chunks concatenate to the original.

use precis_types::Chunk;
use thiserror::Error;

use crate::tokenizer::Tokenizer;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("max_tokens must be greater than zero")]
    ZeroBound,
    #[error(
        "no valid character boundary within {max_tokens} tokens at token offset {offset}: {reason}"
    )]
    NoBoundary {
        offset: usize,
        max_tokens: usize,
        reason: String,
    },
}

/// Splits text into ordered, token-bounded chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    tokenizer: Tokenizer,
    max_tokens: usize,
}

impl Chunker {
    pub fn new(tokenizer: Tokenizer, max_tokens: usize) -> Result<Self, ChunkError> {
        if max_tokens == 0 {
            return Err(ChunkError::ZeroBound);
        }
        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, ChunkError> {
        chunk(&self.tokenizer, text, self.max_tokens)
    }
}

/// Split `text` into chunks of at most `max_tokens` tokens each.
///
/// Empty text yields no chunks.
pub fn chunk(
    tokenizer: &Tokenizer,
    text: &str,
    max_tokens: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    if max_tokens == 0 {
        return Err(ChunkError::ZeroBound);
    }

    let tokens = tokenizer.encode(text);
    let mut chunks = Vec::with_capacity(tokens.len().div_ceil(max_tokens));
    let mut start = 0;

    while start < tokens.len() {
        let (end, window_text) = decode_window(tokenizer, &tokens, start, max_tokens)?;
        chunks.push(Chunk::new(chunks.len(), window_text, end - start));
        start = end;
    }

    tracing::debug!(
        chunks = chunks.len(),
        tokens = tokens.len(),
        max_tokens,
        "Text split into chunks"
    );
    Ok(chunks)
}

/// Decode the longest window starting at `start` that holds at most
/// `max_tokens` tokens and ends on a character boundary.
fn decode_window(
    tokenizer: &Tokenizer,
    tokens: &[u32],
    start: usize,
    max_tokens: usize,
) -> Result<(usize, String), ChunkError> {
    let mut end = tokens.len().min(start.saturating_add(max_tokens));

    loop {
        match tokenizer.decode(&tokens[start..end]) {
            Ok(text) => return Ok((end, text)),
            Err(reason) => {
                if end - start <= 1 {
                    return Err(ChunkError::NoBoundary {
                        offset: start,
                        max_tokens,
                        reason,
                    });
                }
                end -= 1;
            }
        }
    }
}
