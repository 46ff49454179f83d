//! Six-section authority report assembly with the cross-section diversity guard.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crisisbrief_shared::{
    AbstractionLevel, AuthorityReport, EventType, GeneratedOutput, OutputOrigin, Result,
    SectionKind,
};

use crate::backend::Condenser;
use crate::control::{ControlSignal, ControlSignalBuilder};
use crate::text;

/// Characters of source text the title is generated from.
const TITLE_SOURCE_CHARS: usize = 200;

/// Text of a section whose generation failed.
pub fn placeholder_text(kind: SectionKind) -> String {
    format!("Section unavailable: {kind}")
}

fn placeholder(kind: SectionKind) -> GeneratedOutput {
    let text = placeholder_text(kind);
    GeneratedOutput {
        word_count: text::word_count(&text),
        text,
        origin: OutputOrigin::Section(kind),
        low_diversity: false,
        placeholder: true,
    }
}

fn section_signal(
    signals: &ControlSignalBuilder,
    kind: SectionKind,
    event: &EventType,
) -> Result<ControlSignal> {
    Ok(signals
        .build(AbstractionLevel::Authority, Some(kind))?
        .grounded_in(&event.label))
}

/// Source text handed to the backend for one section.
fn section_input(kind: SectionKind, text: &str) -> &str {
    match kind {
        SectionKind::Title => text::head_at_word_boundary(text, TITLE_SOURCE_CHARS),
        _ => text,
    }
}

async fn generate_section(
    condenser: &Condenser,
    kind: SectionKind,
    text: &str,
    signal: &ControlSignal,
) -> Result<GeneratedOutput> {
    let mut output = condenser.condense(section_input(kind, text), signal).await?;
    if kind == SectionKind::Title {
        let trimmed = output.text.trim().trim_end_matches('.').to_string();
        output.word_count = text::word_count(&trimmed);
        output.text = trimmed;
    }
    Ok(output)
}

/// Assemble the authority report for `text`.
///
/// Never fails: a section whose generation fails becomes a placeholder, and
/// the result always holds all six sections in report order.
#[instrument(skip_all, fields(event = %event.label, threshold = diversity_threshold))]
pub async fn assemble_report(
    text: &str,
    event: &EventType,
    signals: &ControlSignalBuilder,
    condenser: &Condenser,
    diversity_threshold: f32,
) -> AuthorityReport {
    let mut drafts = generate_drafts(text, event, signals, condenser).await;

    let mut accepted: Vec<GeneratedOutput> = Vec::with_capacity(SectionKind::ALL.len());
    for kind in SectionKind::ALL {
        let draft = match drafts.remove(&kind) {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                warn!(section = %kind, error = %e, "section generation failed, using placeholder");
                accepted.push(placeholder(kind));
                continue;
            }
            None => {
                warn!(section = %kind, "section task did not complete, using placeholder");
                accepted.push(placeholder(kind));
                continue;
            }
        };

        let overlap = max_overlap(&draft, &accepted);
        if overlap <= diversity_threshold {
            accepted.push(draft);
            continue;
        }

        info!(section = %kind, overlap, "section repeats earlier content, regenerating");
        let output = match regenerate(text, kind, event, signals, condenser).await {
            Ok(mut regenerated) => {
                let overlap = max_overlap(&regenerated, &accepted);
                if overlap > diversity_threshold {
                    warn!(section = %kind, overlap, "section still overlaps after regeneration");
                    regenerated.low_diversity = true;
                }
                regenerated
            }
            Err(e) => {
                warn!(section = %kind, error = %e, "regeneration failed, keeping first draft");
                GeneratedOutput {
                    low_diversity: true,
                    ..draft
                }
            }
        };
        accepted.push(output);
    }

    let report = AuthorityReport::from_sections(accepted);
    info!(
        sections = report.len(),
        words = report.word_count(),
        placeholders = report.sections().iter().filter(|s| s.placeholder).count(),
        "authority report assembled"
    );
    report
}

/// Generate every section concurrently, keyed by section.
async fn generate_drafts(
    text: &str,
    event: &EventType,
    signals: &ControlSignalBuilder,
    condenser: &Condenser,
) -> BTreeMap<SectionKind, Result<GeneratedOutput>> {
    let source: Arc<str> = Arc::from(text);
    let mut drafts = BTreeMap::new();
    let mut tasks = JoinSet::new();

    for kind in SectionKind::ALL {
        let signal = match section_signal(signals, kind, event) {
            Ok(signal) => signal,
            Err(e) => {
                drafts.insert(kind, Err(e));
                continue;
            }
        };
        let condenser = condenser.clone();
        let source = Arc::clone(&source);
        tasks.spawn(async move {
            let result = generate_section(&condenser, kind, &source, &signal).await;
            (kind, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((kind, result)) => {
                drafts.insert(kind, result);
            }
            Err(e) => warn!(error = %e, "section task aborted"),
        }
    }
    drafts
}

async fn regenerate(
    text: &str,
    kind: SectionKind,
    event: &EventType,
    signals: &ControlSignalBuilder,
    condenser: &Condenser,
) -> Result<GeneratedOutput> {
    let signal = section_signal(signals, kind, event)?.with_dedup_instruction();
    generate_section(condenser, kind, text, &signal).await
}

/// Highest overlap between `candidate` and any non-placeholder earlier section.
fn max_overlap(candidate: &GeneratedOutput, earlier: &[GeneratedOutput]) -> f32 {
    earlier
        .iter()
        .filter(|s| !s.placeholder)
        .map(|s| text::token_overlap(&candidate.text, &s.text))
        .fold(0.0, f32::max)
}
