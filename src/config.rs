//! Per-request synthesis parameters and service-boundary configuration.

use std::path::Path;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::chunker::DEFAULT_MAX_CHUNK_LENGTH;
use crate::enhance::EnhancementSettings;
use crate::error::SpeechError;

pub const DEFAULT_SPEAKER_ID: &str = "Sofia Hellen";
pub const DEFAULT_LANGUAGE_ID: &str = "ru";
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5002/api/tts";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Everything one synthesis request needs besides the text itself.
///
/// Build with [`SynthesisParametersBuilder`]; `build()` validates the
/// numeric limits and the enhancement settings.
///
/// ```rust
/// use std::time::Duration;
/// use tts_pipeline::SynthesisParametersBuilder;
///
/// let params = SynthesisParametersBuilder::default()
///     .speaker_id("Ana Florence")
///     .language_id("en")
///     .worker_count(4usize)
///     .retry_base_delay(Duration::from_millis(250))
///     .build()?;
/// assert_eq!(params.max_retries, 5);
/// # Ok::<(), tts_pipeline::config::SynthesisParametersBuilderError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SynthesisParameters {
    #[builder(setter(into), default = "DEFAULT_SPEAKER_ID.to_string()")]
    pub speaker_id: String,
    #[builder(setter(into), default = "DEFAULT_LANGUAGE_ID.to_string()")]
    pub language_id: String,
    /// Optional reference clip for voice style; empty means none.
    #[builder(setter(into), default)]
    pub style_reference: String,
    /// Total attempts per chunk, including the first one.
    #[builder(default = "DEFAULT_MAX_RETRIES")]
    pub max_retries: u32,
    /// Delay before attempt `k + 1` is `retry_base_delay * (k + 1)`.
    #[builder(default = "DEFAULT_RETRY_DELAY")]
    pub retry_base_delay: Duration,
    /// Upper bound for a single backend call.
    #[builder(default = "DEFAULT_REQUEST_TIMEOUT")]
    pub request_timeout: Duration,
    /// Chunks synthesized concurrently. 1 means serial.
    #[builder(default = "DEFAULT_WORKER_COUNT")]
    pub worker_count: usize,
    #[builder(default = "DEFAULT_MAX_CHUNK_LENGTH")]
    pub max_chunk_length: usize,
    #[builder(default)]
    pub enhancement: EnhancementSettings,
}

impl Default for SynthesisParameters {
    fn default() -> Self {
        Self {
            speaker_id: DEFAULT_SPEAKER_ID.to_string(),
            language_id: DEFAULT_LANGUAGE_ID.to_string(),
            style_reference: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            worker_count: DEFAULT_WORKER_COUNT,
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            enhancement: EnhancementSettings::default(),
        }
    }
}

impl SynthesisParameters {
    /// Check the limits again; fields are public and may have been edited
    /// after `build()`.
    pub fn validate(&self) -> Result<(), SpeechError> {
        check_limits(
            self.max_retries,
            self.worker_count,
            self.max_chunk_length,
            self.request_timeout,
        )
        .map_err(SpeechError::InvalidParameters)?;
        self.enhancement
            .validate()
            .map_err(|e| SpeechError::InvalidParameters(e.to_string()))
    }
}

impl SynthesisParametersBuilder {
    fn validate(&self) -> Result<(), String> {
        check_limits(
            self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            self.max_chunk_length.unwrap_or(DEFAULT_MAX_CHUNK_LENGTH),
            self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        )?;
        if let Some(enhancement) = &self.enhancement {
            enhancement.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

fn check_limits(
    max_retries: u32,
    worker_count: usize,
    max_chunk_length: usize,
    request_timeout: Duration,
) -> Result<(), String> {
    if max_retries == 0 {
        return Err("max_retries must be at least 1".into());
    }
    if worker_count == 0 {
        return Err("worker_count must be at least 1".into());
    }
    if worker_count > Semaphore::MAX_PERMITS {
        return Err(format!(
            "worker_count must be at most {}",
            Semaphore::MAX_PERMITS
        ));
    }
    if max_chunk_length == 0 {
        return Err("max_chunk_length must be at least 1".into());
    }
    if request_timeout.is_zero() {
        return Err("request_timeout must be greater than zero".into());
    }
    Ok(())
}

impl From<SynthesisParametersBuilderError> for SpeechError {
    fn from(err: SynthesisParametersBuilderError) -> Self {
        SpeechError::InvalidParameters(err.to_string())
    }
}

/// Configuration resolved once at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub service_url: String,
    pub max_chunk_length: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub worker_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl PipelineConfig {
    /// Load the configuration from a JSON file. Missing keys keep their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, SpeechError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SpeechError> {
        serde_json::from_str(content)
            .map_err(|e| SpeechError::Config(format!("Failed to parse JSON: {e}")))
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, SpeechError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults
    /// for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SpeechError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            service_url: lookup("TTS_SERVICE_URL").unwrap_or(defaults.service_url),
            max_chunk_length: parse_var(&lookup, "MAX_CHUNK_LENGTH", defaults.max_chunk_length)?,
            max_retries: parse_var(&lookup, "MAX_RETRIES", defaults.max_retries)?,
            retry_delay_secs: parse_var(&lookup, "RETRY_DELAY", defaults.retry_delay_secs)?,
            request_timeout_secs: parse_var(
                &lookup,
                "REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
            worker_count: parse_var(&lookup, "MAX_WORKERS", defaults.worker_count)?,
        })
    }

    /// A parameters builder prefilled from this configuration.
    pub fn parameters(&self) -> SynthesisParametersBuilder {
        let mut builder = SynthesisParametersBuilder::default();
        builder
            .max_retries(self.max_retries)
            .retry_base_delay(Duration::from_secs(self.retry_delay_secs))
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .worker_count(self.worker_count)
            .max_chunk_length(self.max_chunk_length);
        builder
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SpeechError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SpeechError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
