//! End-to-end run for one document: decode, chunk, summarize, combine.
//!
//! ```text
//! Idle ──▶ Chunking ──▶ Summarizing ──▶ Combining ──▶ Done
//!             │                            │
//!             └──────────────┬─────────────┘
//!                            ▼
//!                         Failed
//! ```
//!
//! Decoding failures are tolerated (empty text, zero chunks). Per-chunk model
//! failures are absorbed by the summarizer. Chunking and combination failures
//! end the run with a single [`PipelineError`]. Nothing here retries.

use precis_context::{ChunkError, Chunker, FallbackDecoder, TextDecoder};
use precis_providers::{LanguageModel, ModelError};
use precis_types::{CombinePolicy, Document, DocumentId, FinalSummary, Instruction, PipelineState};
use thiserror::Error;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::summarizer::Summarizer;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkError),
    #[error("combining summaries failed: {0}")]
    Combining(#[source] ModelError),
}

impl PipelineError {
    /// State the run was in when it failed.
    #[must_use]
    pub const fn stage(&self) -> PipelineState {
        match self {
            Self::Chunking(_) => PipelineState::Chunking,
            Self::Combining(_) => PipelineState::Combining,
        }
    }
}

pub struct PipelineCoordinator<M, D = FallbackDecoder> {
    decoder: D,
    chunker: Chunker,
    summarizer: Summarizer<M>,
    policy: CombinePolicy,
    state: PipelineState,
    span: Span,
}

impl<M: LanguageModel> PipelineCoordinator<M> {
    pub fn new(chunker: Chunker, summarizer: Summarizer<M>) -> Self {
        Self {
            decoder: FallbackDecoder::default(),
            chunker,
            summarizer,
            policy: CombinePolicy::default(),
            state: PipelineState::Idle,
            span: Span::current(),
        }
    }
}

impl<M: LanguageModel, D: TextDecoder> PipelineCoordinator<M, D> {
    pub fn with_decoder<D2: TextDecoder>(self, decoder: D2) -> PipelineCoordinator<M, D2> {
        PipelineCoordinator {
            decoder,
            chunker: self.chunker,
            summarizer: self.summarizer,
            policy: self.policy,
            state: self.state,
            span: self.span,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CombinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parent span for every log record a run emits.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub const fn state(&self) -> PipelineState {
        self.state
    }

    pub const fn policy(&self) -> CombinePolicy {
        self.policy
    }

    pub fn summarizer(&self) -> &Summarizer<M> {
        &self.summarizer
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::debug!(from = %self.state, to = %state, "Pipeline state change");
        self.state = state;
    }

    /// Run the pipeline over raw document bytes under a generated document id.
    pub async fn run(
        &mut self,
        raw_document: &[u8],
        summarization_instruction: &Instruction,
        final_instruction: &Instruction,
    ) -> Result<FinalSummary, PipelineError> {
        let document = DocumentId::new(format!("doc-{}", Uuid::new_v4()));
        self.run_document(
            document,
            raw_document,
            summarization_instruction,
            final_instruction,
        )
        .await
    }

    pub async fn run_document(
        &mut self,
        document: DocumentId,
        raw_document: &[u8],
        summarization_instruction: &Instruction,
        final_instruction: &Instruction,
    ) -> Result<FinalSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            parent: &self.span,
            "pipeline_run",
            %run_id,
            document = %document,
            bytes = raw_document.len(),
        );

        if self.state.is_terminal() {
            tracing::debug!(
                parent: &span,
                previous = %self.state,
                "Coordinator reset for a new run"
            );
        }
        self.state = PipelineState::Idle;
        let result = self
            .execute(
                document,
                raw_document,
                summarization_instruction,
                final_instruction,
            )
            .instrument(span.clone())
            .await;

        let _guard = span.enter();
        match &result {
            Ok(summary) => {
                self.enter(PipelineState::Done);
                tracing::info!(
                    chunks = summary.chunk_count(),
                    failed_chunks = summary.failed_chunks(),
                    "Pipeline completed"
                );
            }
            Err(e) => {
                self.enter(PipelineState::Failed);
                tracing::error!(stage = %e.stage(), error = %e, "Pipeline failed");
            }
        }
        result
    }

    async fn execute(
        &mut self,
        document: DocumentId,
        raw_document: &[u8],
        summarization_instruction: &Instruction,
        final_instruction: &Instruction,
    ) -> Result<FinalSummary, PipelineError> {
        let text = match self.decoder.decode(raw_document) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Could not decode document, continuing with empty text");
                String::new()
            }
        };
        let document = Document::new(document, text);

        self.enter(PipelineState::Chunking);
        let chunks = self.chunker.chunk(document.content())?;
        tracing::info!(chunks = chunks.len(), "Text split into chunks");

        self.enter(PipelineState::Summarizing);
        let summaries = self
            .summarizer
            .summarize_chunks(&chunks, summarization_instruction)
            .await;
        debug_assert_eq!(summaries.len(), chunks.len());
        let failed_chunks = summaries.iter().filter(|s| s.is_failed()).count();

        self.enter(PipelineState::Combining);
        let text = self
            .summarizer
            .combine_with_policy(
                &summaries,
                self.policy,
                summarization_instruction,
                final_instruction,
            )
            .await
            .map_err(PipelineError::Combining)?;

        Ok(FinalSummary::new(
            document.id().clone(),
            text,
            chunks.len(),
            failed_chunks,
        ))
    }
}
