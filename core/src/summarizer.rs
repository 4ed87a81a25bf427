//! Per-chunk summarization and combination.
//!
//! A model failure on one chunk never aborts the rest: the chunk's summary
//! becomes a sentinel string and the run continues.

use futures_util::{StreamExt, stream};
use precis_providers::{
    CompletionRequest, DEFAULT_MAX_RESPONSE_TOKENS, LanguageModel, ModelError,
};
use precis_types::{Chunk, ChunkSummary, CombinePolicy, Instruction};
use tracing::{Instrument, Span};

/// Substituted when the provider rejects a chunk's request.
pub const INVALID_REQUEST_SENTINEL: &str =
    "Error: The request contained repetitive patterns. Please modify the input and try again.";

/// Substituted for any other failed chunk request.
pub const FAILURE_SENTINEL: &str = "Error: An unexpected issue occurred. Please try again later.";

const SUMMARY_SEPARATOR: &str = "\n\n";

/// Join summaries in order, separated by a blank line.
///
/// ```
/// assert_eq!(precis_core::combine(&["A", "B"]), "A\n\nB");
/// ```
#[must_use]
pub fn combine<S: AsRef<str>>(summaries: &[S]) -> String {
    let mut out = String::new();
    for (i, summary) in summaries.iter().enumerate() {
        if i > 0 {
            out.push_str(SUMMARY_SEPARATOR);
        }
        out.push_str(summary.as_ref());
    }
    out
}

#[must_use]
pub const fn sentinel_for(error: &ModelError) -> &'static str {
    match error {
        ModelError::InvalidRequest(_) => INVALID_REQUEST_SENTINEL,
        ModelError::Failure(_) => FAILURE_SENTINEL,
    }
}

pub struct Summarizer<M> {
    model: M,
    max_response_tokens: u32,
    concurrency: usize,
    span: Span,
}

impl<M: LanguageModel> Summarizer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            concurrency: 1,
            span: Span::current(),
        }
    }

    #[must_use]
    pub fn with_max_response_tokens(mut self, max_response_tokens: u32) -> Self {
        self.max_response_tokens = max_response_tokens;
        self
    }

    /// Requests in flight at once. 1 (the default) is strictly sequential.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Parent span for every log record this summarizer emits.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub const fn max_response_tokens(&self) -> u32 {
        self.max_response_tokens
    }

    async fn request(
        &self,
        instruction: &Instruction,
        content: &str,
    ) -> Result<String, ModelError> {
        self.model
            .complete(CompletionRequest {
                instruction: instruction.as_str(),
                content,
                max_tokens: self.max_response_tokens,
            })
            .await
    }

    /// Summarize one chunk. Never fails: errors become sentinel summaries.
    pub async fn summarize_chunk(&self, chunk: &Chunk, instruction: &Instruction) -> ChunkSummary {
        let span = tracing::info_span!(
            parent: &self.span,
            "summarize_chunk",
            chunk = chunk.index(),
            tokens = chunk.token_count(),
        );

        async {
            tracing::info!("Summarizing chunk");
            match self.request(instruction, chunk.text()).await {
                Ok(text) => ChunkSummary::succeeded(chunk.index(), text),
                Err(e) => {
                    tracing::error!(error = %e, "Chunk summarization failed");
                    ChunkSummary::failed(chunk.index(), sentinel_for(&e))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Summarize every chunk. The result has one entry per chunk, in chunk
    /// order, whatever the concurrency.
    pub async fn summarize_chunks(
        &self,
        chunks: &[Chunk],
        instruction: &Instruction,
    ) -> Vec<ChunkSummary> {
        let summaries: Vec<ChunkSummary> = if self.concurrency == 1 {
            let mut summaries = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                summaries.push(self.summarize_chunk(chunk, instruction).await);
            }
            summaries
        } else {
            stream::iter(chunks)
                .map(|chunk| self.summarize_chunk(chunk, instruction))
                .buffered(self.concurrency)
                .collect()
                .await
        };

        let failed = summaries.iter().filter(|s| s.is_failed()).count();
        tracing::info!(
            parent: &self.span,
            chunks = summaries.len(),
            failed,
            "Summarized chunks"
        );
        summaries
    }

    /// Combine chunk summaries under `policy`.
    ///
    /// `Resummarize` makes one model call with `final_instruction` over the
    /// joined summaries, but only for more than one summary and a final
    /// instruction that differs from `chunk_instruction`. Otherwise, and
    /// always for `Concatenate`, the summaries are joined locally.
    pub async fn combine_with_policy(
        &self,
        summaries: &[ChunkSummary],
        policy: CombinePolicy,
        chunk_instruction: &Instruction,
        final_instruction: &Instruction,
    ) -> Result<String, ModelError> {
        let joined = combine(summaries);

        let resummarize = policy == CombinePolicy::Resummarize
            && summaries.len() > 1
            && final_instruction.is_distinct_from(chunk_instruction);
        if !resummarize {
            tracing::info!(
                parent: &self.span,
                policy = policy.as_str(),
                summaries = summaries.len(),
                "Combined summaries locally"
            );
            return Ok(joined);
        }

        let span = tracing::info_span!(
            parent: &self.span,
            "combine_summaries",
            summaries = summaries.len()
        );
        async {
            tracing::info!("Re-summarizing combined chunk summaries");
            self.request(final_instruction, &joined)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Final combination failed"))
        }
        .instrument(span)
        .await
    }
}
