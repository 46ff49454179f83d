//! HTTP clients for the generation model and the speech-to-text service.

pub mod asr;
pub mod generation;

use std::sync::Arc;

use crisisbrief_core::{GenerationBackend, Loader, Transcriber};
use crisisbrief_shared::{AsrConfig, BackendConfig, backend_api_key};

pub use asr::HttpTranscriber;
pub use generation::HttpGenerationBackend;

pub const USER_AGENT: &str = concat!("crisisbrief/", env!("CARGO_PKG_VERSION"));

/// Deferred constructor for the generation backend, resolved on first use.
pub fn generation_loader(config: &BackendConfig) -> Loader<dyn GenerationBackend> {
    let config = config.clone();
    Arc::new(move || {
        let backend = HttpGenerationBackend::new(&config, backend_api_key(&config))?;
        tracing::info!(model = %config.model, device = config.device.as_str(), "generation backend ready");
        Ok(Arc::new(backend) as Arc<dyn GenerationBackend>)
    })
}

/// Deferred constructor for the transcriber. Only audio runs trigger it.
pub fn transcriber_loader(config: &AsrConfig) -> Loader<dyn Transcriber> {
    let config = config.clone();
    Arc::new(move || {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|v| !v.is_empty());
        let transcriber = HttpTranscriber::new(&config, api_key)?;
        tracing::info!(model = %config.model, "transcriber ready");
        Ok(Arc::new(transcriber) as Arc<dyn Transcriber>)
    })
}
