//! Control signals: the steering prefix and word bucket handed to the
//! generation backend for one audience (and, for authorities, one section).

use crisisbrief_shared::{
    AbstractionLevel, CrisisBriefError, LengthBucket, LengthBuckets, Result, SectionKind,
};

/// Appended to a section prompt when its first draft repeated earlier sections.
pub const DEDUP_INSTRUCTION: &str = "Do not repeat information already covered in other \
sections of the report; add only facts specific to this section.";

/// Steering input for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSignal {
    pub level: AbstractionLevel,
    /// Present only for [`AbstractionLevel::Authority`].
    pub section: Option<SectionKind>,
    pub prefix: String,
    pub min_len: usize,
    pub max_len: usize,
    event_label: Option<String>,
    dedup: bool,
}

impl ControlSignal {
    fn new(level: AbstractionLevel, section: Option<SectionKind>, bucket: LengthBucket) -> Self {
        let mut signal = Self {
            level,
            section,
            prefix: String::new(),
            min_len: bucket.min,
            max_len: bucket.max,
            event_label: None,
            dedup: false,
        };
        signal.render();
        signal
    }

    /// Embed the detected event label into the prefix.
    ///
    /// Only the title and introduction sections are grounded; other signals
    /// are returned unchanged.
    pub fn grounded_in(mut self, label: &str) -> Self {
        if matches!(
            self.section,
            Some(SectionKind::Title | SectionKind::Introduction)
        ) {
            self.event_label = Some(label.to_string());
            self.render();
        }
        self
    }

    /// Append the stronger de-duplication instruction.
    pub fn with_dedup_instruction(mut self) -> Self {
        self.dedup = true;
        self.render();
        self
    }

    pub fn bucket(&self) -> LengthBucket {
        LengthBucket::new(self.min_len, self.max_len)
    }

    fn render(&mut self) {
        let mut prefix = match self.section {
            None => level_prefix(self.level).to_string(),
            Some(kind) => section_prefix(kind, self.event_label.as_deref()),
        };
        if self.dedup {
            prefix.push_str(DEDUP_INSTRUCTION);
            prefix.push(' ');
        }
        prefix.push_str("Text: ");
        self.prefix = prefix;
    }
}

fn level_prefix(level: AbstractionLevel) -> &'static str {
    match level {
        AbstractionLevel::Public => {
            "Write a one-line emergency alert for the general public. \
             State the hazard, the place and the immediate action to take. "
        }
        AbstractionLevel::Responder => {
            "Summarize for emergency response teams. Focus on affected locations, \
             casualties, hazards on site and the resources needed. "
        }
        // Authority prompts are always per-section.
        AbstractionLevel::Authority => "Summarize for government authorities. ",
    }
}

fn section_prefix(kind: SectionKind, event_label: Option<&str>) -> String {
    let event = event_label.map(|l| format!("{l} ")).unwrap_or_default();
    match kind {
        SectionKind::Title => format!(
            "Summarize for authorities as a concise, professional title for this \
             {event}disaster report. "
        ),
        SectionKind::Introduction => format!(
            "Summarize for authorities what type of {event}disaster occurred, when it \
             occurred and where. Answer in 2-3 sentences. Do not describe how it \
             happened or its impact. "
        ),
        SectionKind::EventDetails => "Summarize for authorities how the disaster developed \
             and progressed: the sequence of events, intensity changes and physical processes. \
             Do not mention casualties. "
            .to_string(),
        SectionKind::Impact => "Summarize for authorities, focusing on impact figures and \
             casualties: deaths, injuries, displaced people and damage to buildings and \
             infrastructure. Use 'according to reports' for figures. If no numbers are given, \
             say 'assessment ongoing'. "
            .to_string(),
        SectionKind::Response => "Summarize for authorities the rescue operations, emergency \
             services, government actions and relief efforts deployed. Do not describe the \
             disaster itself. "
            .to_string(),
        SectionKind::Aftermath => "Summarize for authorities the ongoing risks, recovery \
             challenges and lessons for preparedness or early warning. If none are mentioned, \
             note briefly that recovery will be challenging. "
            .to_string(),
    }
}

/// Maps an audience (and report section) to a [`ControlSignal`].
///
/// Pure and deterministic: the same arguments always produce the same signal.
#[derive(Debug, Clone)]
pub struct ControlSignalBuilder {
    buckets: LengthBuckets,
}

impl ControlSignalBuilder {
    pub fn new(buckets: LengthBuckets) -> Self {
        Self { buckets }
    }

    pub fn buckets(&self) -> &LengthBuckets {
        &self.buckets
    }

    /// Build the signal for `level`.
    ///
    /// `section` must be given for [`AbstractionLevel::Authority`] and must be
    /// absent for the other levels.
    pub fn build(
        &self,
        level: AbstractionLevel,
        section: Option<SectionKind>,
    ) -> Result<ControlSignal> {
        match (level, section) {
            (AbstractionLevel::Authority, Some(kind)) => Ok(ControlSignal::new(
                level,
                Some(kind),
                self.buckets.section(kind),
            )),
            (AbstractionLevel::Authority, None) => Err(CrisisBriefError::invalid_argument(
                "AUTHORITY signals require a section",
            )),
            (_, Some(kind)) => Err(CrisisBriefError::invalid_argument(format!(
                "{level} signals take no section (got {kind})"
            ))),
            (_, None) => Ok(ControlSignal::new(level, None, self.buckets.level(level))),
        }
    }
}

impl Default for ControlSignalBuilder {
    fn default() -> Self {
        Self::new(LengthBuckets::default())
    }
}
