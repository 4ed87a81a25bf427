//! Summarization pipeline and summary comparison.
//!
//! # Architecture
//!
//! ```text
//! PipelineCoordinator (state machine, one document per run)
//! ├── decoder: TextDecoder      (bytes -> text, tolerant)
//! ├── chunker: Chunker          (text -> token-bounded chunks)
//! └── summarizer: Summarizer    (chunk -> summary, summaries -> final)
//!
//! Comparator
//! ├── model: LanguageModel      (difference report)
//! └── notifier: Notifier        (report delivery, non-fatal)
//! ```
//!
//! Every component takes a parent [`tracing::Span`] at construction and logs
//! inside it; none installs a subscriber.

mod comparator;
mod instructions;
mod pipeline;
mod summarizer;

#[cfg(test)]
mod test_support;

pub use comparator::{COMPARISON_FAILED_SENTINEL, Comparator, build_comparison_prompt};
pub use instructions::{
    COMPARISON_INSTRUCTION, FINAL_INSTRUCTION, Instructions, SUMMARIZATION_INSTRUCTION,
};
pub use pipeline::{PipelineCoordinator, PipelineError};
pub use summarizer::{
    FAILURE_SENTINEL, INVALID_REQUEST_SENTINEL, Summarizer, combine, sentinel_for,
};
