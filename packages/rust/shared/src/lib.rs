//! Shared types, error model, and configuration for crisisbrief.
//!
//! This crate is the foundation depended on by all other crisisbrief crates.
//! It provides:
//! - [`CrisisBriefError`], the unified error type
//! - Domain types ([`AbstractionLevel`], [`SectionKind`], [`GeneratedOutput`], [`SummaryResult`])
//! - Configuration ([`AppConfig`], [`LengthBuckets`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AsrConfig, BackendConfig, DevicePreference, GenerationConfig, LengthBuckets,
    backend_api_key, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{CrisisBriefError, Result};
pub use types::{
    AbstractionLevel, AuthorityReport, EventCategory, EventType, GeneratedOutput, LengthBucket,
    OutputOrigin, ReportSectionRecord, RequestId, SectionKind, SummaryRecord, SummaryResult,
};
