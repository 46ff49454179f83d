//! Speech-to-text over an OpenAI-compatible Whisper endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crisisbrief_core::{AudioInput, AudioSource, Transcriber};
use crisisbrief_shared::{AsrConfig, CrisisBriefError, Result};

use crate::USER_AGENT;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcriber backed by `POST {endpoint}/v1/audio/transcriptions`.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: Client,
    url: Url,
    model: String,
    api_key: Option<String>,
    default_language: Option<String>,
}

impl HttpTranscriber {
    pub fn new(config: &AsrConfig, api_key: Option<String>) -> Result<Self> {
        let raw = format!(
            "{}/v1/audio/transcriptions",
            config.endpoint.trim_end_matches('/')
        );
        let url = Url::parse(&raw)
            .map_err(|e| CrisisBriefError::config(format!("invalid ASR endpoint {raw:?}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrisisBriefError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            api_key,
            default_language: config.language.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

async fn read_audio(audio: &AudioInput) -> Result<Vec<u8>> {
    match &audio.source {
        AudioSource::Path(path) => tokio::fs::read(path)
            .await
            .map_err(|e| read_error(path, e)),
        AudioSource::Bytes { data, .. } => Ok(data.clone()),
    }
}

fn read_error(path: &Path, err: std::io::Error) -> CrisisBriefError {
    if err.kind() == std::io::ErrorKind::NotFound {
        CrisisBriefError::AudioNotFound {
            path: path.to_path_buf(),
        }
    } else {
        CrisisBriefError::TranscriptionFailure(format!(
            "failed to read audio file {}: {err}",
            path.display()
        ))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(url = %self.url, file = %audio.file_name()))]
    async fn transcribe(&self, audio: &AudioInput) -> Result<String> {
        audio.validate()?;
        let data = read_audio(audio).await?;
        if data.is_empty() {
            return Err(CrisisBriefError::EmptyAudio);
        }
        debug!(bytes = data.len(), "uploading audio");

        let mut form = Form::new()
            .part("file", Part::bytes(data).file_name(audio.file_name()))
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = audio.language.as_ref().or(self.default_language.as_ref()) {
            form = form.text("language", language.clone());
        }

        let mut builder = self.client.post(self.url.clone()).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CrisisBriefError::TranscriptionFailure(format!("{}: {e}", self.url)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrisisBriefError::TranscriptionFailure(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            CrisisBriefError::TranscriptionFailure(format!("unexpected response body: {e}"))
        })?;
        Ok(parsed.text.trim().to_string())
    }
}
