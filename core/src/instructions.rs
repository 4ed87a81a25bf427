//! The three system messages a run needs.

use precis_types::{
    EmptyStringError, Instruction, InstructionKind, NonEmptyStaticStr, NonEmptyString,
};

const SUMMARIZATION_RAW: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/summarization.md"));
const FINAL_RAW: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/final.md"));
const COMPARISON_RAW: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/comparison.md"));

const SUMMARIZATION_TEXT: NonEmptyStaticStr = NonEmptyStaticStr::new(SUMMARIZATION_RAW);
const FINAL_TEXT: NonEmptyStaticStr = NonEmptyStaticStr::new(FINAL_RAW);
const COMPARISON_TEXT: NonEmptyStaticStr = NonEmptyStaticStr::new(COMPARISON_RAW);

pub const SUMMARIZATION_INSTRUCTION: Instruction =
    Instruction::bundled(InstructionKind::Summarization, SUMMARIZATION_TEXT);
pub const FINAL_INSTRUCTION: Instruction =
    Instruction::bundled(InstructionKind::FinalCombination, FINAL_TEXT);
pub const COMPARISON_INSTRUCTION: Instruction =
    Instruction::bundled(InstructionKind::Comparison, COMPARISON_TEXT);

/// Process-wide instruction set. Starts from the bundled texts; any of them
/// can be replaced from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub summarization: Instruction,
    pub final_combination: Instruction,
    pub comparison: Instruction,
}

impl Default for Instructions {
    fn default() -> Self {
        Self::bundled()
    }
}

impl Instructions {
    #[must_use]
    pub fn bundled() -> Self {
        Self {
            summarization: SUMMARIZATION_INSTRUCTION,
            final_combination: FINAL_INSTRUCTION,
            comparison: COMPARISON_INSTRUCTION,
        }
    }

    /// Replace one instruction. Blank text is rejected.
    pub fn with_override(
        mut self,
        kind: InstructionKind,
        text: impl Into<String>,
    ) -> Result<Self, EmptyStringError> {
        let instruction = Instruction::new(kind, NonEmptyString::new(text)?);
        match kind {
            InstructionKind::Summarization => self.summarization = instruction,
            InstructionKind::FinalCombination => self.final_combination = instruction,
            InstructionKind::Comparison => self.comparison = instruction,
        }
        Ok(self)
    }
}
