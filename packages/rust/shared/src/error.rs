//! Error types for crisisbrief.
//!
//! Library crates use [`CrisisBriefError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all crisisbrief operations.
#[derive(Debug, thiserror::Error)]
pub enum CrisisBriefError {
    /// Source text is empty, too short, or otherwise unusable.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// An operation was called with an argument combination it does not accept.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The ASR collaborator returned an empty transcript.
    #[error("transcript is empty")]
    EmptyTranscript,

    /// The ASR collaborator failed.
    #[error("transcription failed: {0}")]
    TranscriptionFailure(String),

    /// The referenced audio file does not exist.
    #[error("audio not found: {path:?}")]
    AudioNotFound { path: PathBuf },

    /// The audio payload contains no data.
    #[error("audio input is empty")]
    EmptyAudio,

    /// The generation backend failed (unreachable, or transient failures exhausted retries).
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// The generation backend ran out of device memory or compute. Never retried.
    #[error("generation backend out of resources: {0}")]
    OutOfResource(String),

    /// Text exceeds the backend's maximum input size.
    #[error("input too long: {chars} characters (max {max})")]
    InputTooLong { chars: usize, max: usize },

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CrisisBriefError>;

impl CrisisBriefError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create an invalid-argument error from any displayable message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the generation backend.
    pub fn is_generation_error(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailure(_) | Self::OutOfResource(_) | Self::InputTooLong { .. }
        )
    }

    /// Whether this error came from the ASR collaborator or its input.
    pub fn is_transcription_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyTranscript
                | Self::TranscriptionFailure(_)
                | Self::AudioNotFound { .. }
                | Self::EmptyAudio
        )
    }
}
