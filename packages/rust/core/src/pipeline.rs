//! End-to-end summarize pipeline: source → (transcript) → levels → event type → report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crisisbrief_shared::{AppConfig, CrisisBriefError, RequestId, Result, SummaryResult};

use crate::backend::{Condenser, CondenserSettings, GenerationBackend};
use crate::cancel::CancelToken;
use crate::control::ControlSignalBuilder;
use crate::handle::{Loader, ModelHandle};
use crate::levels::{generate_levels, validate_source};
use crate::report::assemble_report;
use crate::{event, text};

/// Audio container formats accepted by the transcriber.
pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "m4a", "flac", "ogg"];

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where the audio comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Path(PathBuf),
    /// In-memory audio; `file_name` carries the container extension.
    Bytes { data: Vec<u8>, file_name: String },
}

/// A recorded or uploaded report awaiting transcription.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub source: AudioSource,
    /// Language hint for the ASR collaborator.
    pub language: Option<String>,
}

impl AudioInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AudioSource::Path(path.into()),
            language: None,
        }
    }

    pub fn from_bytes(data: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            source: AudioSource::Bytes {
                data,
                file_name: file_name.into(),
            },
            language: None,
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// File name sent to the ASR service.
    pub fn file_name(&self) -> String {
        match &self.source {
            AudioSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audio.wav".to_string()),
            AudioSource::Bytes { file_name, .. } => file_name.clone(),
        }
    }

    /// Check that the audio exists, is non-empty and has a supported extension.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            AudioSource::Path(path) => {
                let meta = std::fs::metadata(path)
                    .ok()
                    .filter(|m| m.is_file())
                    .ok_or_else(|| CrisisBriefError::AudioNotFound { path: path.clone() })?;
                if meta.len() == 0 {
                    return Err(CrisisBriefError::EmptyAudio);
                }
            }
            AudioSource::Bytes { data, .. } => {
                if data.is_empty() {
                    return Err(CrisisBriefError::EmptyAudio);
                }
            }
        }

        let name = self.file_name();
        let ext = Path::new(&name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            return Err(CrisisBriefError::TranscriptionFailure(format!(
                "unsupported audio format {name:?} (expected one of {})",
                SUPPORTED_AUDIO_EXTENSIONS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Input of one summarization request.
#[derive(Debug, Clone)]
pub enum Source {
    Text(String),
    Audio(AudioInput),
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
        }
    }
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe `audio`. Fails with `AudioNotFound`, `EmptyAudio` or
    /// `TranscriptionFailure`.
    async fn transcribe(&self, audio: &AudioInput) -> Result<String>;
}

// ---------------------------------------------------------------------------
// States & progress
// ---------------------------------------------------------------------------

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Received,
    Transcribing,
    Validated,
    GeneratingLevels,
    DetectingEventType,
    AssemblingReport,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Transcribing => "transcribing",
            Self::Validated => "validated",
            Self::GeneratingLevels => "generating_levels",
            Self::DetectingEventType => "detecting_event_type",
            Self::AssemblingReport => "assembling_report",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` directly follows `self`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Received, Transcribing | Validated) => true,
            (Transcribing, Validated) => true,
            (Validated, GeneratingLevels) => true,
            (GeneratingLevels, DetectingEventType) => true,
            (DetectingEventType, AssemblingReport) => true,
            (AssemblingReport, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition, including into `Failed`.
    fn state_changed(&self, from: PipelineState, to: PipelineState);
    /// Called when the pipeline completes.
    fn done(&self, _result: &SummaryResult) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state_changed(&self, _from: PipelineState, _to: PipelineState) {}
}

struct StateTracker<'a> {
    state: PipelineState,
    progress: &'a dyn ProgressReporter,
}

impl<'a> StateTracker<'a> {
    fn new(progress: &'a dyn ProgressReporter) -> Self {
        Self {
            state: PipelineState::Received,
            progress,
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CrisisBriefError::invalid_argument(format!(
                "illegal pipeline transition {} -> {next}",
                self.state
            )));
        }
        let prev = std::mem::replace(&mut self.state, next);
        debug!(from = %prev, to = %next, "pipeline state");
        self.progress.state_changed(prev, next);
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            let prev = std::mem::replace(&mut self.state, PipelineState::Failed);
            self.progress.state_changed(prev, PipelineState::Failed);
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The orchestrator. Owns the model handles; safe to share across tasks.
pub struct Pipeline {
    config: AppConfig,
    signals: ControlSignalBuilder,
    backend: ModelHandle<dyn GenerationBackend>,
    transcriber: ModelHandle<dyn Transcriber>,
    permits: Arc<Semaphore>,
}

impl Pipeline {
    /// Build a pipeline whose backend and transcriber load on first use.
    pub fn new(
        config: AppConfig,
        backend: Loader<dyn GenerationBackend>,
        transcriber: Loader<dyn Transcriber>,
    ) -> Result<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.generation.concurrency));
        Ok(Self {
            signals: ControlSignalBuilder::new(config.generation.buckets.clone()),
            backend: ModelHandle::lazy("generation", backend),
            transcriber: ModelHandle::lazy("transcriber", transcriber),
            permits,
            config,
        })
    }

    /// Build a pipeline around already-constructed clients.
    pub fn with_clients(
        config: AppConfig,
        backend: Arc<dyn GenerationBackend>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.generation.concurrency));
        Ok(Self {
            signals: ControlSignalBuilder::new(config.generation.buckets.clone()),
            backend: ModelHandle::ready("generation", backend),
            transcriber: ModelHandle::ready("transcriber", transcriber),
            permits,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn signals(&self) -> &ControlSignalBuilder {
        &self.signals
    }

    pub fn backend_handle(&self) -> &ModelHandle<dyn GenerationBackend> {
        &self.backend
    }

    pub fn transcriber_handle(&self) -> &ModelHandle<dyn Transcriber> {
        &self.transcriber
    }

    /// Run one summarization request.
    ///
    /// 1. Transcribe (audio sources only)
    /// 2. Validate and cap the source text
    /// 3. Generate the public alert and responder summary
    /// 4. Detect the event type
    /// 5. Assemble the authority report
    ///
    /// Cancelling `cancel` at any point yields `Cancelled` and no result.
    #[instrument(skip_all, fields(source = source.kind()))]
    pub async fn run(
        &self,
        source: Source,
        cancel: &CancelToken,
        progress: &dyn ProgressReporter,
    ) -> Result<SummaryResult> {
        let start = Instant::now();
        let request_id = RequestId::new();
        info!(%request_id, "starting summarize pipeline");

        let mut tracker = StateTracker::new(progress);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CrisisBriefError::Cancelled),
            result = self.execute(request_id.clone(), source, cancel, &mut tracker) => result,
        };

        match outcome {
            Ok(result) => {
                tracker.advance(PipelineState::Done)?;
                info!(
                    %request_id,
                    event = %result.event_type.label,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "summarize pipeline complete"
                );
                progress.done(&result);
                Ok(result)
            }
            Err(e) => {
                warn!(%request_id, state = %tracker.state, error = %e, "summarize pipeline failed");
                tracker.fail();
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request_id: RequestId,
        source: Source,
        cancel: &CancelToken,
        tracker: &mut StateTracker<'_>,
    ) -> Result<SummaryResult> {
        // --- Phase 1: Transcription ---
        let (raw_text, transcript) = match source {
            Source::Text(text) => (text, None),
            Source::Audio(audio) => {
                tracker.advance(PipelineState::Transcribing)?;
                let transcript = self.transcribe(&audio).await?;
                (transcript.clone(), Some(transcript))
            }
        };

        // --- Phase 2: Validation ---
        tracker.advance(PipelineState::Validated)?;
        cancel.checkpoint()?;
        validate_source(&raw_text, self.config.generation.min_input_chars)?;

        let backend = self.backend.get().await?;
        let condenser = Condenser::new(
            backend,
            Arc::clone(&self.permits),
            CondenserSettings::from(&self.config.generation),
        );
        let max_chars = condenser.max_input_chars();
        let source_text = text::cap_chars(raw_text.trim(), max_chars).into_owned();
        if source_text.len() < raw_text.trim().len() {
            warn!(
                original_chars = raw_text.trim().chars().count(),
                max_chars, "source text truncated to backend input limit"
            );
        }
        validate_source(&source_text, self.config.generation.min_input_chars)?;
        let source_sha256 = sha256_hex(&source_text);

        // --- Phase 3: Level outputs ---
        tracker.advance(PipelineState::GeneratingLevels)?;
        cancel.checkpoint()?;
        let levels = generate_levels(
            &source_text,
            &self.signals,
            &condenser,
            self.config.generation.min_input_chars,
        )
        .await?;

        // --- Phase 4: Event type ---
        tracker.advance(PipelineState::DetectingEventType)?;
        cancel.checkpoint()?;
        let event_type = event::detect(&levels.report_seed_text);

        // --- Phase 5: Authority report ---
        tracker.advance(PipelineState::AssemblingReport)?;
        cancel.checkpoint()?;
        let authority_report = assemble_report(
            &levels.report_seed_text,
            &event_type,
            &self.signals,
            &condenser,
            self.config.generation.diversity_threshold,
        )
        .await;

        Ok(SummaryResult {
            request_id,
            alert: levels.alert,
            responder_summary: levels.responder_summary,
            authority_report,
            event_type,
            transcript,
            source_sha256,
            generated_at: Utc::now(),
        })
    }

    async fn transcribe(&self, audio: &AudioInput) -> Result<String> {
        audio.validate()?;
        let transcriber = self.transcriber.get().await?;
        debug!(asr = transcriber.name(), file = %audio.file_name(), "transcribing audio");
        let transcript = transcriber.transcribe(audio).await?;
        if transcript.trim().is_empty() {
            return Err(CrisisBriefError::EmptyTranscript);
        }
        info!(words = text::word_count(&transcript), "transcription complete");
        Ok(transcript)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend)
            .field("transcriber", &self.transcriber)
            .finish_non_exhaustive()
    }
}

/// Hex SHA-256 of the text the outputs were generated from.
fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
