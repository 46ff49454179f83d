//! Deterministic stand-ins for the generation backend, the ASR collaborator
//! and the progress reporter. Compiled for tests and the `test-util` feature.

use std::sync::Mutex;
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crisisbrief_shared::{CrisisBriefError, Result};

use crate::backend::{BackendError, GenerationBackend, GenerationRequest};
use crate::cancel::CancelToken;
use crate::control::DEDUP_INSTRUCTION;
use crate::pipeline::{AudioInput, PipelineState, ProgressReporter, Transcriber};

/// Matches the default `backend.max_input_chars`.
pub const STUB_MAX_INPUT_CHARS: usize = 4096;

/// A field report about a magnitude 7.2 earthquake, about 120 words.
pub const EARTHQUAKE_REPORT: &str = "A severe earthquake measuring 7.2 on the Richter scale \
struck the northern region early this morning at 3:45 AM. The epicenter was located 15 \
kilometers northeast of the city center. Initial reports indicate significant structural \
damage to residential buildings in the downtown area. Emergency services have been deployed \
to assess the situation. At least 50 people have been reported injured, with 5 confirmed \
fatalities. Hospitals are on high alert and accepting casualties. Power outages have been \
reported in several districts. The government has activated the emergency response protocol \
and is coordinating rescue operations. Search and rescue teams are being dispatched to the \
most affected areas. Citizens are advised to stay indoors and avoid damaged structures.";

/// First `n` characters of `s`.
fn head(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Generation backends
// ---------------------------------------------------------------------------

/// Characters of source text the echo stub repeats back.
pub const ECHO_TEXT_CHARS: usize = 500;

/// Echoes `prefix[..10] + "..." + text[..ECHO_TEXT_CHARS]`.
///
/// Ignores the requested bucket, so length policy is left to the caller.
#[derive(Debug, Default)]
pub struct EchoBackend {
    calls: AtomicUsize,
}

impl EchoBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn render(request: &GenerationRequest<'_>) -> String {
        format!(
            "{}...{}",
            head(request.prefix, 10),
            head(request.text, ECHO_TEXT_CHARS)
        )
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::render(request))
    }
}

/// Always returns the same text.
#[derive(Debug)]
pub struct FixedBackend {
    text: String,
}

impl FixedBackend {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl GenerationBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        Ok(self.text.clone())
    }
}

/// Fails every call with the same error.
#[derive(Debug)]
pub struct FailingBackend {
    error: BackendError,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(error: BackendError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Fails the first `failures` calls, then behaves like [`EchoBackend`].
#[derive(Debug)]
pub struct FlakyBackend {
    failures: usize,
    error: BackendError,
    calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(failures: usize, error: BackendError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(self.error.clone());
        }
        Ok(EchoBackend::render(request))
    }
}

/// Answers by prefix content.
///
/// The first rule whose needle occurs in the prefix wins. A prefix carrying
/// the de-duplication instruction gets a fresh variant text when one was
/// configured. Everything else is echoed.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Vec<(String, std::result::Result<String, BackendError>)>,
    dedup_variant: Option<String>,
    dedup_calls: AtomicUsize,
    prefixes: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` when the prefix contains `needle`.
    pub fn respond_when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(text.into())));
        self
    }

    /// Fail with `error` when the prefix contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, error: BackendError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// On de-duplication prompts, reply with `base` plus a per-call suffix.
    pub fn vary_on_dedup(mut self, base: impl Into<String>) -> Self {
        self.dedup_variant = Some(base.into());
        self
    }

    /// Number of calls whose prefix carried the de-duplication instruction.
    pub fn dedup_calls(&self) -> usize {
        self.dedup_calls.load(Ordering::SeqCst)
    }

    /// Every prefix received so far, in call order.
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        if let Ok(mut prefixes) = self.prefixes.lock() {
            prefixes.push(request.prefix.to_string());
        }

        if request.prefix.contains(DEDUP_INSTRUCTION) {
            let n = self.dedup_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(base) = &self.dedup_variant {
                return Ok(format!("{base} variant{n}"));
            }
        }

        for (needle, reply) in &self.rules {
            if request.prefix.contains(needle.as_str()) {
                return reply.clone();
            }
        }
        Ok(EchoBackend::render(request))
    }
}

/// Echoes like [`EchoBackend`] after a short delay, recording how many
/// calls were in flight at once.
#[derive(Debug)]
pub struct InFlightBackend {
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of simultaneous `generate` calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for InFlightBackend {
    fn name(&self) -> &str {
        "in-flight"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(EchoBackend::render(request))
    }
}

/// Never completes. Used to hold a run at a suspension point.
#[derive(Debug, Default)]
pub struct StalledBackend;

#[async_trait]
impl GenerationBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    fn max_input_chars(&self) -> usize {
        STUB_MAX_INPUT_CHARS
    }

    async fn generate(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Transcriber
// ---------------------------------------------------------------------------

/// Returns a canned transcript, or a transcription failure when none is set.
#[derive(Debug)]
pub struct StubTranscriber {
    transcript: Option<String>,
    calls: AtomicUsize,
}

impl StubTranscriber {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            transcript: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    fn name(&self) -> &str {
        "stub-asr"
    }

    async fn transcribe(&self, _audio: &AudioInput) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| CrisisBriefError::TranscriptionFailure("stub ASR failure".into()))
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Records every state transition; optionally cancels a token on entering a state.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    states: Mutex<Vec<PipelineState>>,
    cancel_on: Option<(PipelineState, CancelToken)>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_on(state: PipelineState, token: CancelToken) -> Self {
        Self {
            states: Mutex::new(Vec::new()),
            cancel_on: Some((state, token)),
        }
    }

    pub fn states(&self) -> Vec<PipelineState> {
        self.states.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn reached(&self, state: PipelineState) -> bool {
        self.states().contains(&state)
    }
}

impl ProgressReporter for RecordingProgress {
    fn state_changed(&self, _from: PipelineState, to: PipelineState) {
        if let Ok(mut states) = self.states.lock() {
            states.push(to);
        }
        if let Some((state, token)) = &self.cancel_on {
            if *state == to {
                token.cancel();
            }
        }
    }
}
