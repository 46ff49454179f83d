//! Summarization over a Hugging Face Inference–style HTTP endpoint.
//!
//! `POST {endpoint}/models/{model}` with `{"inputs", "parameters", "options"}`,
//! answered by `[{"summary_text": ...}]`. Decoding is greedy (`do_sample: false`)
//! so identical requests give identical summaries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crisisbrief_core::{BackendError, GenerationBackend, GenerationRequest};
use crisisbrief_shared::{BackendConfig, CrisisBriefError, DevicePreference, Result};

use crate::USER_AGENT;

#[derive(Debug, Serialize)]
struct SummarizeRequest {
    inputs: String,
    parameters: SummarizeParameters,
    options: SummarizeOptions,
}

#[derive(Debug, Serialize)]
struct SummarizeParameters {
    min_length: usize,
    max_length: usize,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct SummarizeOptions {
    wait_for_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_gpu: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SummaryItem {
    summary_text: String,
}

/// Generation backend that calls a remote summarization model.
#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    client: Client,
    url: Url,
    name: String,
    api_key: Option<String>,
    max_input_chars: usize,
    device: DevicePreference,
}

impl HttpGenerationBackend {
    /// Build a backend from `[backend]` config. `api_key` is sent as a bearer token.
    pub fn new(config: &BackendConfig, api_key: Option<String>) -> Result<Self> {
        let raw = format!(
            "{}/models/{}",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        let url = Url::parse(&raw)
            .map_err(|e| CrisisBriefError::config(format!("invalid backend endpoint {raw:?}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrisisBriefError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            name: format!("http:{}", config.model),
            api_key,
            max_input_chars: config.max_input_chars,
            device: config.device,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn use_gpu(&self) -> Option<bool> {
        match self.device {
            DevicePreference::Auto => None,
            DevicePreference::Cpu => Some(false),
            DevicePreference::Gpu => Some(true),
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    #[instrument(skip_all, fields(url = %self.url, min = request.min_len, max = request.max_len))]
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> std::result::Result<String, BackendError> {
        let prompt = request.prompt();
        let prompt_chars = prompt.chars().count();
        let body = SummarizeRequest {
            inputs: prompt,
            parameters: SummarizeParameters {
                min_length: request.min_len,
                max_length: request.max_len,
                do_sample: false,
            },
            options: SummarizeOptions {
                wait_for_model: true,
                use_gpu: self.use_gpu(),
            },
        };

        let mut builder = self.client.post(self.url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Other(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            if status == StatusCode::PAYLOAD_TOO_LARGE {
                return Err(BackendError::InputTooLong {
                    chars: prompt_chars,
                    max: self.max_input_chars,
                });
            }
            return Err(classify_status(status, &text));
        }

        let items: Vec<SummaryItem> = serde_json::from_str(&text)
            .map_err(|e| BackendError::Other(format!("unexpected response body: {e}")))?;
        let summary = items
            .into_iter()
            .next()
            .map(|item| item.summary_text)
            .ok_or_else(|| BackendError::Other("response contained no summary".into()))?;

        debug!(chars = summary.len(), "summary received");
        Ok(summary)
    }
}

fn classify_send_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() {
        BackendError::Unreachable(err.to_string())
    } else {
        BackendError::Other(err.to_string())
    }
}

/// Map a non-success HTTP status (and body) to a backend error.
fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let detail = format!("HTTP {status}: {}", body.trim());
    if status == StatusCode::INSUFFICIENT_STORAGE || body.to_lowercase().contains("out of memory") {
        return BackendError::OutOfMemory(detail);
    }
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendError::Timeout,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => BackendError::Busy(detail),
        _ => BackendError::Other(detail),
    }
}
