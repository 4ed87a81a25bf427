use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use precis_config::PrecisConfig;
use precis_core::Instructions;
use precis_types::InstructionKind;

/// Bundled instructions with any `[pipeline]` file overrides applied.
///
/// Relative override paths resolve against `base_dir`, the directory holding
/// the config file.
pub fn instructions(config: &PrecisConfig, base_dir: Option<&Path>) -> Result<Instructions> {
    let mut instructions = Instructions::bundled();
    let Some(pipeline) = config.pipeline.as_ref() else {
        return Ok(instructions);
    };

    let overrides = [
        (
            InstructionKind::Summarization,
            pipeline.summarization_instruction.as_deref(),
        ),
        (
            InstructionKind::FinalCombination,
            pipeline.final_instruction.as_deref(),
        ),
        (
            InstructionKind::Comparison,
            pipeline.comparison_instruction.as_deref(),
        ),
    ];

    for (kind, path) in overrides {
        let Some(path) = path else { continue };
        let path = resolve(path, base_dir);
        let name = kind.as_str();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {name} instruction {}", path.display()))?;
        instructions = instructions
            .with_override(kind, text)
            .with_context(|| format!("{name} instruction {} is empty", path.display()))?;
        tracing::info!(kind = name, path = %path.display(), "Instruction overridden");
    }

    Ok(instructions)
}

fn resolve(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
