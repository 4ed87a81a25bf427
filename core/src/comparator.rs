//! Difference report between a summary and its neighbors.

use precis_notify::Notifier;
use precis_providers::{CompletionRequest, DEFAULT_MAX_RESPONSE_TOKENS, LanguageModel};
use precis_types::Instruction;
use tracing::{Instrument, Span};

use crate::instructions::COMPARISON_INSTRUCTION;

/// Returned in place of a report when the comparison call fails.
pub const COMPARISON_FAILED_SENTINEL: &str = "Error comparing summaries.";

const COMPARISON_REQUEST: &str =
    "Please provide the key differences between the original summary and the combined neighbor summaries.";

/// The user message for a comparison: the original summary followed by each
/// neighbor, labeled by 1-based position.
#[must_use]
pub fn build_comparison_prompt<S: AsRef<str>>(original: &str, neighbors: &[S]) -> String {
    let neighbors = neighbors
        .iter()
        .enumerate()
        .map(|(i, summary)| format!("Neighbor {} Summary:\n{}", i + 1, summary.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Original Summary:\n{original}\n\nCombined Neighbor Summaries:\n{neighbors}\n\n{COMPARISON_REQUEST}"
    )
}

pub struct Comparator<M, N> {
    model: M,
    notifier: N,
    instruction: Instruction,
    max_response_tokens: u32,
    span: Span,
}

impl<M: LanguageModel, N: Notifier> Comparator<M, N> {
    pub fn new(model: M, notifier: N) -> Self {
        Self {
            model,
            notifier,
            instruction: COMPARISON_INSTRUCTION,
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            span: Span::current(),
        }
    }

    #[must_use]
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instruction = instruction;
        self
    }

    #[must_use]
    pub fn with_max_response_tokens(mut self, max_response_tokens: u32) -> Self {
        self.max_response_tokens = max_response_tokens;
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Ask the model how `original` differs from `neighbors`, forward the
    /// report to the notifier and return it.
    ///
    /// A failed model call returns [`COMPARISON_FAILED_SENTINEL`] and notifies
    /// nobody. A failed notification is logged and does not change the result.
    pub async fn compare<S: AsRef<str>>(&self, original: &str, neighbors: &[S]) -> String {
        let span = tracing::info_span!(
            parent: &self.span,
            "compare_summaries",
            neighbors = neighbors.len(),
            channel = self.notifier.channel_name(),
        );
        self.compare_inner(original, neighbors)
            .instrument(span)
            .await
    }

    async fn compare_inner<S: AsRef<str>>(&self, original: &str, neighbors: &[S]) -> String {
        let prompt = build_comparison_prompt(original, neighbors);
        tracing::info!("Comparing summaries");

        let response = self
            .model
            .complete(CompletionRequest {
                instruction: self.instruction.as_str(),
                content: &prompt,
                max_tokens: self.max_response_tokens,
            })
            .await;

        let report = match response {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Error comparing summaries");
                return COMPARISON_FAILED_SENTINEL.to_string();
            }
        };

        match self.notifier.send(&report).await {
            Ok(()) => tracing::info!("Comparison report sent"),
            Err(e) => tracing::error!(error = %e, "Failed to send comparison report"),
        }

        report
    }
}
