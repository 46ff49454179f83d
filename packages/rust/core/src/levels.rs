//! Public alert and responder summary generation.

use tracing::{info, instrument};

use crisisbrief_shared::{AbstractionLevel, CrisisBriefError, GeneratedOutput, Result};

use crate::backend::Condenser;
use crate::control::ControlSignalBuilder;

/// The two top-level outputs plus the text the authority report is built from.
#[derive(Debug, Clone)]
pub struct LevelOutputs {
    pub alert: GeneratedOutput,
    pub responder_summary: GeneratedOutput,
    /// The unmodified input, handed to the report assembler.
    pub report_seed_text: String,
}

/// Reject text that is empty or shorter than `min_chars` after trimming.
pub fn validate_source(text: &str, min_chars: usize) -> Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CrisisBriefError::invalid_input("source text is empty"));
    }
    let chars = trimmed.chars().count();
    if chars < min_chars {
        return Err(CrisisBriefError::invalid_input(format!(
            "source text too short: {chars} characters (min {min_chars})"
        )));
    }
    Ok(())
}

/// Generate the public alert and the responder summary from `text`.
///
/// Both generations run concurrently. Any failure is returned unchanged.
#[instrument(skip_all, fields(chars = text.len()))]
pub async fn generate_levels(
    text: &str,
    signals: &ControlSignalBuilder,
    condenser: &Condenser,
    min_input_chars: usize,
) -> Result<LevelOutputs> {
    validate_source(text, min_input_chars)?;

    let public = signals.build(AbstractionLevel::Public, None)?;
    let responder = signals.build(AbstractionLevel::Responder, None)?;

    let (alert, responder_summary) = tokio::join!(
        condenser.condense(text, &public),
        condenser.condense(text, &responder),
    );
    let alert = alert?;
    let responder_summary = responder_summary?;

    info!(
        alert_words = alert.word_count,
        responder_words = responder_summary.word_count,
        "level outputs generated"
    );

    Ok(LevelOutputs {
        alert,
        responder_summary,
        report_seed_text: text.to_string(),
    })
}
