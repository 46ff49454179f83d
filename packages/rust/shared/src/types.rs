//! Core domain types for crisisbrief summaries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one summarization request (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AbstractionLevel / SectionKind
// ---------------------------------------------------------------------------

/// Target audience and information-density tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbstractionLevel {
    /// One-line alert for the general public.
    Public,
    /// Operational summary for response teams.
    Responder,
    /// Multi-section report for authorities.
    Authority,
}

impl AbstractionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Responder => "RESPONDER",
            Self::Authority => "AUTHORITY",
        }
    }
}

impl std::fmt::Display for AbstractionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the six fixed, ordered sections of the authority report.
///
/// The derived `Ord` follows declaration order, which is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionKind {
    Title,
    Introduction,
    EventDetails,
    Impact,
    Response,
    Aftermath,
}

impl SectionKind {
    /// All sections, in report order.
    pub const ALL: [SectionKind; 6] = [
        Self::Title,
        Self::Introduction,
        Self::EventDetails,
        Self::Impact,
        Self::Response,
        Self::Aftermath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "TITLE",
            Self::Introduction => "INTRODUCTION",
            Self::EventDetails => "EVENT_DETAILS",
            Self::Impact => "IMPACT",
            Self::Response => "RESPONSE",
            Self::Aftermath => "AFTERMATH",
        }
    }

    /// Header used when the report is rendered.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Title => "TITLE & BYLINE",
            Self::Introduction => "INTRODUCTION (What, When, Where)",
            Self::EventDetails => "DETAILS OF THE EVENT (How)",
            Self::Impact => "IMPACT & DAMAGE (Figures & Facts)",
            Self::Response => "RESPONSE & RELIEF EFFORTS",
            Self::Aftermath => "AFTERMATH & LESSONS LEARNED",
        }
    }

    /// Position of this section in the report (0-based).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LengthBucket
// ---------------------------------------------------------------------------

/// Inclusive word-count range requested from the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBucket {
    pub min: usize,
    pub max: usize,
}

impl LengthBucket {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Whether `words` lies within the bucket widened by `tolerance` (e.g. 0.2 = ±20%).
    pub fn contains_with_tolerance(&self, words: usize, tolerance: f32) -> bool {
        let tolerance = f64::from(tolerance);
        let lo = (self.min as f64 * (1.0 - tolerance) - 1e-6).ceil().max(0.0) as usize;
        let hi = (self.max as f64 * (1.0 + tolerance) + 1e-6).floor() as usize;
        (lo..=hi).contains(&words)
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Disaster categories recognized by the event-type detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Earthquake,
    Flood,
    Cyclone,
    Wildfire,
    Tsunami,
    Drought,
    Landslide,
    VolcanicEruption,
    General,
}

impl EventCategory {
    /// Human-readable label embedded into report prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Flood => "flood",
            Self::Cyclone => "cyclone",
            Self::Wildfire => "wildfire",
            Self::Tsunami => "tsunami",
            Self::Drought => "drought",
            Self::Landslide => "landslide",
            Self::VolcanicEruption => "volcanic eruption",
            Self::General => "general disaster event",
        }
    }
}

/// Classification of a source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventType {
    pub category: EventCategory,
    pub label: String,
    /// Share of the category's keywords found in the text, in `[0, 1]`.
    pub confidence: f32,
}

impl EventType {
    /// The fallback classification used when no keyword matches.
    pub fn general() -> Self {
        Self {
            category: EventCategory::General,
            label: EventCategory::General.label().to_string(),
            confidence: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// GeneratedOutput
// ---------------------------------------------------------------------------

/// What a generated text was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutputOrigin {
    Level(AbstractionLevel),
    Section(SectionKind),
}

/// One condensed text produced by the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    pub text: String,
    pub origin: OutputOrigin,
    /// Length of `text` in words (the bucket unit).
    pub word_count: usize,
    /// Set when the diversity guard could not bring overlap below the threshold.
    #[serde(default)]
    pub low_diversity: bool,
    /// Set when generation failed and `text` is a placeholder.
    #[serde(default)]
    pub placeholder: bool,
}

impl GeneratedOutput {
    /// The section this output belongs to, if it is a report section.
    pub fn section(&self) -> Option<SectionKind> {
        match self.origin {
            OutputOrigin::Section(kind) => Some(kind),
            OutputOrigin::Level(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthorityReport
// ---------------------------------------------------------------------------

/// The six-section authority report, always in [`SectionKind::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityReport {
    sections: Vec<GeneratedOutput>,
}

impl AuthorityReport {
    /// Build a report from section outputs, sorting them into report order.
    ///
    /// Callers guarantee one output per [`SectionKind`].
    pub fn from_sections(mut sections: Vec<GeneratedOutput>) -> Self {
        sections.sort_by_key(|s| s.section().map(|k| k.index()).unwrap_or(usize::MAX));
        Self { sections }
    }

    pub fn sections(&self) -> &[GeneratedOutput] {
        &self.sections
    }

    pub fn section(&self, kind: SectionKind) -> Option<&GeneratedOutput> {
        self.sections.iter().find(|s| s.section() == Some(kind))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total words across all sections.
    pub fn word_count(&self) -> usize {
        self.sections.iter().map(|s| s.word_count).sum()
    }

    /// Render the report as Markdown with bold section headers.
    ///
    /// The byline follows the title section.
    pub fn to_markdown(&self, generated_on: NaiveDate) -> String {
        let mut out = String::new();
        for output in &self.sections {
            let Some(kind) = output.section() else {
                continue;
            };
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&format!("**{}**\n{}", kind.header(), output.text));
            if kind == SectionKind::Title {
                out.push_str(&format!(
                    "\nDisaster Assessment Report | Generated on {}",
                    generated_on.format("%B %d, %Y")
                ));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// SummaryResult
// ---------------------------------------------------------------------------

/// The terminal artifact of one summarization request.
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub request_id: RequestId,
    pub alert: GeneratedOutput,
    pub responder_summary: GeneratedOutput,
    pub authority_report: AuthorityReport,
    pub event_type: EventType,
    /// Transcript text when the source was audio.
    pub transcript: Option<String>,
    /// SHA-256 of the (capped) source text the outputs were generated from.
    pub source_sha256: String,
    pub generated_at: DateTime<Utc>,
}

impl SummaryResult {
    /// Caller-facing serializable record.
    pub fn to_record(&self) -> SummaryRecord {
        SummaryRecord::from(self)
    }
}

/// One `{section, text}` entry of the serialized authority report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSectionRecord {
    pub section: SectionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_diversity: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

/// Serializable view of a [`SummaryResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub request_id: RequestId,
    pub alert: String,
    pub responder_summary: String,
    pub authority_report: Vec<ReportSectionRecord>,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub source_sha256: String,
    pub generated_at: DateTime<Utc>,
}

impl From<&SummaryResult> for SummaryRecord {
    fn from(result: &SummaryResult) -> Self {
        Self {
            request_id: result.request_id.clone(),
            alert: result.alert.text.clone(),
            responder_summary: result.responder_summary.text.clone(),
            authority_report: result
                .authority_report
                .sections()
                .iter()
                .filter_map(|s| {
                    s.section().map(|section| ReportSectionRecord {
                        section,
                        text: s.text.clone(),
                        low_diversity: s.low_diversity,
                        placeholder: s.placeholder,
                    })
                })
                .collect(),
            event_type: result.event_type.clone(),
            transcript: result.transcript.clone(),
            source_sha256: result.source_sha256.clone(),
            generated_at: result.generated_at,
        }
    }
}
