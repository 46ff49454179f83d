//! Application configuration for crisisbrief.
//!
//! User config lives at `~/.crisisbrief/crisisbrief.toml`.
//! CLI flags override config file values, which override defaults.
//! The resolved [`AppConfig`] is handed to the pipeline at construction and
//! never mutated afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CrisisBriefError, Result};
use crate::types::{AbstractionLevel, LengthBucket, SectionKind};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "crisisbrief.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".crisisbrief";

// ---------------------------------------------------------------------------
// Config structs (matching crisisbrief.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation backend selection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Speech-to-text collaborator.
    #[serde(default)]
    pub asr: AsrConfig,

    /// Length buckets, thresholds, retries and concurrency.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Preferred compute device for the generation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the inference service.
    #[serde(default = "default_backend_endpoint")]
    pub endpoint: String,

    /// Summarization model identifier.
    #[serde(default = "default_backend_model")]
    pub model: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_backend_api_key_env")]
    pub api_key_env: String,

    /// Device preference forwarded to the backend.
    #[serde(default)]
    pub device: DevicePreference,

    /// Per-request timeout.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Maximum source length the backend accepts, in characters.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_backend_endpoint(),
            model: default_backend_model(),
            api_key_env: default_backend_api_key_env(),
            device: DevicePreference::default(),
            timeout_secs: default_backend_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_backend_endpoint() -> String {
    "https://api-inference.huggingface.co".into()
}
fn default_backend_model() -> String {
    "facebook/bart-large-cnn".into()
}
fn default_backend_api_key_env() -> String {
    "HF_API_TOKEN".into()
}
fn default_backend_timeout() -> u64 {
    120
}
fn default_max_input_chars() -> usize {
    // ~1024 tokens at four characters per token
    4096
}

/// `[asr]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Base URL of an OpenAI-compatible transcription service.
    #[serde(default = "default_asr_endpoint")]
    pub endpoint: String,

    /// Whisper model name.
    #[serde(default = "default_asr_model")]
    pub model: String,

    /// Name of the env var holding the API key, if the service needs one.
    #[serde(default = "default_asr_api_key_env")]
    pub api_key_env: String,

    /// Optional language hint (e.g. `en`). Auto-detected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_asr_timeout")]
    pub timeout_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: default_asr_endpoint(),
            model: default_asr_model(),
            api_key_env: default_asr_api_key_env(),
            language: None,
            timeout_secs: default_asr_timeout(),
        }
    }
}

fn default_asr_endpoint() -> String {
    "http://localhost:8000".into()
}
fn default_asr_model() -> String {
    "whisper-1".into()
}
fn default_asr_api_key_env() -> String {
    "ASR_API_KEY".into()
}
fn default_asr_timeout() -> u64 {
    300
}

/// `[generation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Shortest source text accepted for summarization, in characters.
    #[serde(default = "default_min_input_chars")]
    pub min_input_chars: usize,

    /// Allowed relative overshoot of a bucket's max before truncation.
    #[serde(default = "default_length_tolerance")]
    pub length_tolerance: f32,

    /// Overlap ratio above which a report section is regenerated.
    #[serde(default = "default_diversity_threshold")]
    pub diversity_threshold: f32,

    /// Retries for transient backend failures.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay of the exponential retry backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Maximum concurrent backend calls. 1 serializes on a single device.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-level and per-section word buckets.
    #[serde(default)]
    pub buckets: LengthBuckets,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_input_chars: default_min_input_chars(),
            length_tolerance: default_length_tolerance(),
            diversity_threshold: default_diversity_threshold(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            concurrency: default_concurrency(),
            buckets: LengthBuckets::default(),
        }
    }
}

fn default_min_input_chars() -> usize {
    20
}
fn default_length_tolerance() -> f32 {
    0.2
}
fn default_diversity_threshold() -> f32 {
    0.6
}
fn default_retry_count() -> u32 {
    1
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_concurrency() -> usize {
    1
}

/// `[generation.buckets]` section, in words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthBuckets {
    #[serde(default = "default_public_bucket")]
    pub public: LengthBucket,
    #[serde(default = "default_responder_bucket")]
    pub responder: LengthBucket,
    #[serde(default = "default_title_bucket")]
    pub title: LengthBucket,
    #[serde(default = "default_introduction_bucket")]
    pub introduction: LengthBucket,
    #[serde(default = "default_event_details_bucket")]
    pub event_details: LengthBucket,
    #[serde(default = "default_impact_bucket")]
    pub impact: LengthBucket,
    #[serde(default = "default_response_bucket")]
    pub response: LengthBucket,
    #[serde(default = "default_aftermath_bucket")]
    pub aftermath: LengthBucket,
}

impl Default for LengthBuckets {
    fn default() -> Self {
        Self {
            public: default_public_bucket(),
            responder: default_responder_bucket(),
            title: default_title_bucket(),
            introduction: default_introduction_bucket(),
            event_details: default_event_details_bucket(),
            impact: default_impact_bucket(),
            response: default_response_bucket(),
            aftermath: default_aftermath_bucket(),
        }
    }
}

fn default_public_bucket() -> LengthBucket {
    LengthBucket::new(8, 20)
}
fn default_responder_bucket() -> LengthBucket {
    LengthBucket::new(60, 150)
}
fn default_title_bucket() -> LengthBucket {
    LengthBucket::new(5, 15)
}
fn default_introduction_bucket() -> LengthBucket {
    LengthBucket::new(30, 80)
}
fn default_event_details_bucket() -> LengthBucket {
    LengthBucket::new(40, 100)
}
fn default_impact_bucket() -> LengthBucket {
    LengthBucket::new(40, 100)
}
fn default_response_bucket() -> LengthBucket {
    LengthBucket::new(30, 80)
}
fn default_aftermath_bucket() -> LengthBucket {
    LengthBucket::new(30, 80)
}

impl LengthBuckets {
    /// Bucket for one report section.
    pub fn section(&self, kind: SectionKind) -> LengthBucket {
        match kind {
            SectionKind::Title => self.title,
            SectionKind::Introduction => self.introduction,
            SectionKind::EventDetails => self.event_details,
            SectionKind::Impact => self.impact,
            SectionKind::Response => self.response,
            SectionKind::Aftermath => self.aftermath,
        }
    }

    /// Bucket for an abstraction level. The authority bucket spans the whole report.
    pub fn level(&self, level: AbstractionLevel) -> LengthBucket {
        match level {
            AbstractionLevel::Public => self.public,
            AbstractionLevel::Responder => self.responder,
            AbstractionLevel::Authority => {
                let (min, max) = SectionKind::ALL
                    .iter()
                    .map(|k| self.section(*k))
                    .fold((0, 0), |(lo, hi), b| (lo + b.min, hi + b.max));
                LengthBucket::new(min, max)
            }
        }
    }

    /// Check bucket sanity and the ordering between abstraction levels.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("public", self.public),
            ("responder", self.responder),
            ("title", self.title),
            ("introduction", self.introduction),
            ("event_details", self.event_details),
            ("impact", self.impact),
            ("response", self.response),
            ("aftermath", self.aftermath),
        ];
        for (name, bucket) in named {
            if bucket.min == 0 || bucket.min > bucket.max {
                return Err(CrisisBriefError::config(format!(
                    "bucket {name}: expected 0 < min <= max, got {}..{}",
                    bucket.min, bucket.max
                )));
            }
        }

        let public = self.level(AbstractionLevel::Public);
        let responder = self.level(AbstractionLevel::Responder);
        let authority = self.level(AbstractionLevel::Authority);

        if public.max >= responder.min {
            return Err(CrisisBriefError::config(format!(
                "public bucket max ({}) must be below responder min ({})",
                public.max, responder.min
            )));
        }
        if responder.max >= authority.max || responder.min >= authority.min {
            return Err(CrisisBriefError::config(format!(
                "responder bucket {}..{} must be below the authority report bucket {}..{}",
                responder.min, responder.max, authority.min, authority.max
            )));
        }
        Ok(())
    }
}

impl GenerationConfig {
    /// Validate thresholds, retry settings and buckets.
    pub fn validate(&self) -> Result<()> {
        if !(self.diversity_threshold > 0.0 && self.diversity_threshold <= 1.0) {
            return Err(CrisisBriefError::config(format!(
                "diversity_threshold must be in (0, 1], got {}",
                self.diversity_threshold
            )));
        }
        if !(self.length_tolerance >= 0.0) {
            return Err(CrisisBriefError::config(format!(
                "length_tolerance must be >= 0, got {}",
                self.length_tolerance
            )));
        }
        if self.concurrency == 0 {
            return Err(CrisisBriefError::config("concurrency must be at least 1"));
        }
        if self.min_input_chars == 0 {
            return Err(CrisisBriefError::config("min_input_chars must be at least 1"));
        }
        self.buckets.validate()
    }
}

impl AppConfig {
    /// Validate every section that has invariants.
    pub fn validate(&self) -> Result<()> {
        if self.backend.max_input_chars < self.generation.min_input_chars {
            return Err(CrisisBriefError::config(format!(
                "backend.max_input_chars ({}) is below generation.min_input_chars ({})",
                self.backend.max_input_chars, self.generation.min_input_chars
            )));
        }
        self.generation.validate()
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.crisisbrief/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CrisisBriefError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.crisisbrief/crisisbrief.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CrisisBriefError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CrisisBriefError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CrisisBriefError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CrisisBriefError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CrisisBriefError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the backend API token from the configured env var.
///
/// Public inference endpoints accept anonymous requests, so a missing
/// token is not an error here.
pub fn backend_api_key(config: &BackendConfig) -> Option<String> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}

/// Check that the backend API token env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.backend.api_key_env;
    match backend_api_key(&config.backend) {
        Some(_) => Ok(()),
        None => Err(CrisisBriefError::config(format!(
            "generation backend API token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("bart-large-cnn"));
        assert!(toml_str.contains("HF_API_TOKEN"));
        assert!(toml_str.contains("diversity_threshold"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_buckets_keep_defaults() {
        let toml_str = r#"
[generation]
diversity_threshold = 0.5

[generation.buckets]
public = { min = 5, max = 12 }
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.diversity_threshold, 0.5);
        assert_eq!(config.generation.buckets.public, LengthBucket::new(5, 12));
        assert_eq!(config.generation.buckets.responder, LengthBucket::new(60, 150));
        assert_eq!(config.generation.retry_count, 1);
        config.validate().expect("still valid");
    }

    #[test]
    fn default_buckets_are_ordered() {
        let buckets = LengthBuckets::default();
        buckets.validate().expect("defaults valid");

        let public = buckets.level(AbstractionLevel::Public);
        let responder = buckets.level(AbstractionLevel::Responder);
        let authority = buckets.level(AbstractionLevel::Authority);
        assert!(public.max < responder.min);
        assert!(public.max < responder.max);
        assert!(responder.max < authority.max);
        assert_eq!(authority.max, 15 + 80 + 100 + 100 + 80 + 80);
    }

    #[test]
    fn title_bucket_far_below_impact() {
        let buckets = LengthBuckets::default();
        assert!(
            buckets.section(SectionKind::Title).max < buckets.section(SectionKind::Impact).min
        );
    }

    #[test]
    fn overlapping_levels_rejected() {
        let mut buckets = LengthBuckets::default();
        buckets.public = LengthBucket::new(10, 70);
        let err = buckets.validate().unwrap_err();
        assert!(err.to_string().contains("public bucket max"));

        let mut buckets = LengthBuckets::default();
        buckets.responder = LengthBucket::new(60, 900);
        assert!(buckets.validate().is_err());

        let mut buckets = LengthBuckets::default();
        buckets.title = LengthBucket::new(20, 10);
        assert!(buckets.validate().unwrap_err().to_string().contains("bucket title"));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let mut generation = GenerationConfig::default();
        generation.diversity_threshold = 1.5;
        assert!(generation.validate().is_err());

        let mut generation = GenerationConfig::default();
        generation.concurrency = 0;
        assert!(generation.validate().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.backend.api_key_env = "CRISISBRIEF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API token not found"));
        assert!(backend_api_key(&config.backend).is_none());
    }
}
