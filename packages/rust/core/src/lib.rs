//! Core condensation engine for crisisbrief.
//!
//! Turns one disaster report into a public alert, a responder summary and a
//! six-section authority report through a single [`GenerationBackend`].

pub mod backend;
pub mod cancel;
pub mod control;
pub mod event;
pub mod handle;
pub mod levels;
pub mod pipeline;
pub mod report;
pub mod text;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{BackendError, Condenser, CondenserSettings, GenerationBackend, GenerationRequest};
pub use cancel::CancelToken;
pub use control::{ControlSignal, ControlSignalBuilder};
pub use handle::{Loader, ModelHandle};
pub use levels::{LevelOutputs, generate_levels};
pub use pipeline::{
    AudioInput, AudioSource, Pipeline, PipelineState, ProgressReporter, SilentProgress, Source,
    Transcriber,
};
pub use report::assemble_report;
