//! Generation backend adapter.
//!
//! [`GenerationBackend`] is the only seam to the text-generation model.
//! [`Condenser`] wraps a backend with the request-level policy: input size
//! check, bounded concurrency, transient-failure retry and length enforcement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, instrument, warn};

use crisisbrief_shared::{CrisisBriefError, GeneratedOutput, GenerationConfig, OutputOrigin, Result};

use crate::control::ControlSignal;
use crate::text;

/// Upper bound for a single backoff delay between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// One generation call: steering prefix, source text and the word bucket.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub prefix: &'a str,
    pub text: &'a str,
    pub min_len: usize,
    pub max_len: usize,
}

impl GenerationRequest<'_> {
    /// Full prompt submitted to the model: prefix followed by text.
    pub fn prompt(&self) -> String {
        format!("{}{}", self.prefix, self.text)
    }
}

/// Failure reported by a generation backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("backend timed out")]
    Timeout,

    /// Rate-limited or temporarily overloaded.
    #[error("backend busy: {0}")]
    Busy(String),

    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend out of memory: {0}")]
    OutOfMemory(String),

    #[error("input too long: {chars} characters (max {max})")]
    InputTooLong { chars: usize, max: usize },

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Busy(_))
    }
}

impl From<BackendError> for CrisisBriefError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfMemory(msg) => CrisisBriefError::OutOfResource(msg),
            BackendError::InputTooLong { chars, max } => {
                CrisisBriefError::InputTooLong { chars, max }
            }
            other => CrisisBriefError::GenerationFailure(other.to_string()),
        }
    }
}

/// A text-generation capability that condenses a prompt into a bounded summary.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Longest `text` (in characters) the backend accepts.
    fn max_input_chars(&self) -> usize;

    /// Generate a condensed text of roughly `min_len..=max_len` words.
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError>;
}

// ---------------------------------------------------------------------------
// Condenser
// ---------------------------------------------------------------------------

/// Request policy applied around every backend call.
#[derive(Debug, Clone, Copy)]
pub struct CondenserSettings {
    pub length_tolerance: f32,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
}

impl From<&GenerationConfig> for CondenserSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            length_tolerance: config.length_tolerance,
            retry_count: config.retry_count,
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }
}

/// Turns `(text, signal)` into a [`GeneratedOutput`] through a backend.
///
/// Cheap to clone; clones share the backend and the concurrency permits.
#[derive(Clone)]
pub struct Condenser {
    backend: Arc<dyn GenerationBackend>,
    permits: Arc<Semaphore>,
    settings: CondenserSettings,
}

impl Condenser {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        permits: Arc<Semaphore>,
        settings: CondenserSettings,
    ) -> Self {
        Self {
            backend,
            permits,
            settings,
        }
    }

    pub fn max_input_chars(&self) -> usize {
        self.backend.max_input_chars()
    }

    /// Condense `text` under `signal`.
    ///
    /// Retries timeouts and busy responses `retry_count` times with jittered
    /// exponential backoff. Overlong output is cut back at a sentence boundary:
    /// level outputs to `max_len` words, sections to `max_len * (1 + tolerance)`.
    #[instrument(skip_all, fields(backend = %self.backend.name(), level = %signal.level, section = ?signal.section))]
    pub async fn condense(&self, text: &str, signal: &ControlSignal) -> Result<GeneratedOutput> {
        let chars = text.chars().count();
        let max = self.backend.max_input_chars();
        if chars > max {
            return Err(CrisisBriefError::InputTooLong { chars, max });
        }

        let request = GenerationRequest {
            prefix: &signal.prefix,
            text,
            min_len: signal.min_len,
            max_len: signal.max_len,
        };
        debug!(min = request.min_len, max = request.max_len, prefix = %signal.prefix, "requesting generation");

        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.settings.retry_base_delay_ms / 2).max(1))
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.settings.retry_count as usize);

        let backend = &self.backend;
        let permits = &self.permits;
        let request = &request;
        let raw = RetryIf::spawn(
            strategy,
            || async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|e| BackendError::Other(e.to_string()))?;
                backend.generate(request).await
            },
            |err: &BackendError| {
                let transient = err.is_transient();
                if transient {
                    warn!(error = %err, "transient backend failure, retrying");
                }
                transient
            },
        )
        .await
        .map_err(|err| {
            warn!(error = %err, "generation failed");
            CrisisBriefError::from(err)
        })?;

        let output = self.enforce_length(raw.trim(), signal);
        if output.is_empty() {
            return Err(CrisisBriefError::GenerationFailure(
                "backend returned empty output".into(),
            ));
        }

        let word_count = text::word_count(&output);
        if word_count < signal.min_len {
            debug!(words = word_count, min = signal.min_len, "output shorter than bucket minimum");
        }

        let origin = match signal.section {
            Some(kind) => OutputOrigin::Section(kind),
            None => OutputOrigin::Level(signal.level),
        };
        Ok(GeneratedOutput {
            text: output,
            origin,
            word_count,
            low_diversity: false,
            placeholder: false,
        })
    }

    /// Word ceiling for `signal`: alert and responder summary are held to
    /// `max_len`, report sections get `max_len * (1 + tolerance)`.
    fn word_limit(&self, signal: &ControlSignal) -> usize {
        if signal.section.is_none() {
            return signal.max_len;
        }
        (signal.max_len as f64 * (1.0 + f64::from(self.settings.length_tolerance)) + 1e-6).floor()
            as usize
    }

    fn enforce_length(&self, raw: &str, signal: &ControlSignal) -> String {
        let limit = self.word_limit(signal);
        let words = text::word_count(raw);
        if words <= limit {
            return raw.to_string();
        }
        debug!(words, limit, "truncating overlong output");
        text::truncate_to_words(raw, limit)
    }
}

impl std::fmt::Debug for Condenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condenser")
            .field("backend", &self.backend.name())
            .field("available_permits", &self.permits.available_permits())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlSignalBuilder;
    use crate::testing::{EchoBackend, FailingBackend, FlakyBackend, FixedBackend};
    use crisisbrief_shared::{AbstractionLevel, SectionKind};

    fn settings() -> CondenserSettings {
        CondenserSettings {
            length_tolerance: 0.2,
            retry_count: 1,
            retry_base_delay_ms: 1,
        }
    }

    fn condenser(backend: Arc<dyn GenerationBackend>) -> Condenser {
        Condenser::new(backend, Arc::new(Semaphore::new(1)), settings())
    }

    fn public_signal() -> ControlSignal {
        ControlSignalBuilder::default()
            .build(AbstractionLevel::Public, None)
            .unwrap()
    }

    #[test]
    fn prompt_is_prefix_then_text() {
        let request = GenerationRequest {
            prefix: "Alert: ",
            text: "river rising",
            min_len: 1,
            max_len: 5,
        };
        assert_eq!(request.prompt(), "Alert: river rising");
    }

    #[test]
    fn backend_errors_map_to_taxonomy() {
        assert!(matches!(
            CrisisBriefError::from(BackendError::OutOfMemory("cuda".into())),
            CrisisBriefError::OutOfResource(_)
        ));
        assert!(matches!(
            CrisisBriefError::from(BackendError::Timeout),
            CrisisBriefError::GenerationFailure(_)
        ));
        assert!(matches!(
            CrisisBriefError::from(BackendError::InputTooLong { chars: 5, max: 4 }),
            CrisisBriefError::InputTooLong { chars: 5, max: 4 }
        ));
        assert!(BackendError::Busy("429".into()).is_transient());
        assert!(!BackendError::Unreachable("refused".into()).is_transient());
    }

    #[tokio::test]
    async fn condense_tags_origin_and_counts_words() {
        let c = condenser(Arc::new(EchoBackend::default()));
        let out = c.condense("Flood waters rose overnight.", &public_signal()).await.unwrap();
        assert_eq!(out.origin, OutputOrigin::Level(AbstractionLevel::Public));
        assert_eq!(out.word_count, text::word_count(&out.text));
        assert!(out.text.starts_with("Write a on..."));
    }

    #[tokio::test]
    async fn overlong_input_rejected_before_call() {
        let backend = Arc::new(FailingBackend::new(BackendError::Timeout));
        let c = condenser(backend.clone());
        let long = "word ".repeat(2000);
        let err = c.condense(&long, &public_signal()).await.unwrap_err();
        assert!(matches!(err, CrisisBriefError::InputTooLong { max: 4096, .. }));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failure_retried_once() {
        let backend = Arc::new(FlakyBackend::new(1, BackendError::Timeout));
        let c = condenser(backend.clone());
        let out = c.condense("Storm damage reported downtown.", &public_signal()).await;
        assert!(out.is_ok());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_surface_generation_failure() {
        let backend = Arc::new(FailingBackend::new(BackendError::Busy("503".into())));
        let c = condenser(backend.clone());
        let err = c.condense("Storm damage reported.", &public_signal()).await.unwrap_err();
        assert!(matches!(err, CrisisBriefError::GenerationFailure(_)));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn out_of_memory_not_retried() {
        let backend = Arc::new(FailingBackend::new(BackendError::OutOfMemory("gpu".into())));
        let c = condenser(backend.clone());
        let err = c.condense("Storm damage reported.", &public_signal()).await.unwrap_err();
        assert!(matches!(err, CrisisBriefError::OutOfResource(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn overlong_alert_held_to_bucket_max() {
        let sentence = "Crews cleared five blocked roads today. ";
        let backend = Arc::new(FixedBackend::new(sentence.repeat(10)));
        let c = condenser(backend);
        let signal = public_signal();
        let out = c.condense("Roads blocked by debris.", &signal).await.unwrap();
        // max 20; sentences are 6 words each
        assert_eq!(out.word_count, 18);
        assert!(out.word_count <= signal.max_len);
        assert!(out.text.ends_with("today."));
    }

    #[tokio::test]
    async fn alert_without_sentence_break_is_hard_cut() {
        let run_on = "water rising fast near the old mill bridge ".repeat(5);
        let c = condenser(Arc::new(FixedBackend::new(run_on)));
        let signal = public_signal();
        let out = c.condense("Mill bridge flooding.", &signal).await.unwrap();
        assert_eq!(out.word_count, signal.max_len);
    }

    #[tokio::test]
    async fn overlong_section_keeps_tolerance() {
        let signal = ControlSignalBuilder::default()
            .build(AbstractionLevel::Authority, Some(SectionKind::Impact))
            .unwrap();
        let sentence = "Crews cleared five blocked roads today. ";
        let c = condenser(Arc::new(FixedBackend::new(sentence.repeat(30))));
        let out = c.condense("Roads blocked by debris.", &signal).await.unwrap();
        // 100 words * 1.2 = 120
        assert_eq!(out.word_count, 120);
        assert!(signal.bucket().contains_with_tolerance(out.word_count, 0.2));
        assert!(!signal.bucket().contains_with_tolerance(out.word_count + 1, 0.2));
    }

    #[tokio::test]
    async fn section_signal_tags_section_origin() {
        let signal = ControlSignalBuilder::default()
            .build(AbstractionLevel::Authority, Some(SectionKind::Impact))
            .unwrap();
        let c = condenser(Arc::new(EchoBackend::default()));
        let out = c.condense("Two bridges collapsed.", &signal).await.unwrap();
        assert_eq!(out.section(), Some(SectionKind::Impact));
    }
}
