//! # tts-pipeline
//!
//! A Rust library that turns arbitrary-length text into speech by splitting
//! it into bounded chunks, synthesizing the chunks concurrently against a
//! speech backend and reassembling them in reading order.
//!
//! ## Features
//!
//! - **Chunking**: separator-aware splitting that prefers paragraph, line and
//!   sentence boundaries over clause breaks and plain spaces
//! - **Resilient synthesis**: bounded retries with linear backoff and a
//!   per-attempt timeout
//! - **All-or-nothing assembly**: a request either yields every chunk in order
//!   or fails naming the first failing chunk
//! - **Enhancement**: resampling, noise reduction, soft compression and
//!   BS.1770 loudness normalization, each opt-in
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tts-pipeline = { version = "2026.2", features = ["http"] }
//! ```
//!
//! ```ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use tts_pipeline::backends::http::HttpBackend;
//! use tts_pipeline::{SpeechPipeline, SynthesisParametersBuilder};
//!
//! let backend = HttpBackend::new("http://localhost:5002/api/tts")?;
//! let pipeline = SpeechPipeline::new(Arc::new(backend));
//! let params = SynthesisParametersBuilder::default().worker_count(4usize).build()?;
//!
//! let audio = pipeline.synthesize("Hello, world! How are you?", &params).await?;
//! audio.write_wav(Path::new("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod backends;
pub mod chunker;
pub mod client;
pub mod config;
pub mod enhance;
pub mod error;
pub mod pipeline;

#[cfg(feature = "archive")]
pub mod archive;

use async_trait::async_trait;

pub use audio::{AudioCodec, Pcm16Audio, PcmSignal, WavCodec};
pub use chunker::{ChunkPreview, TextChunk};
pub use client::{RetryPolicy, SynthesisClient};
pub use config::{PipelineConfig, SynthesisParameters, SynthesisParametersBuilder};
pub use enhance::{EnhancementPreset, EnhancementSettings};
pub use error::{
    BackendError, ChunkError, EnhancementError, SpeechError, SynthesisBackendError,
};
pub use pipeline::{OutputMode, SpeechPipeline, SynthesisOutcome};

#[cfg(feature = "archive")]
pub use archive::write_chunk_archive;

/// One chunk's worth of work for a synthesis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_id: String,
    pub language_id: String,
    /// Optional voice-style reference; empty when unused.
    pub style_reference: String,
}

impl SynthesisRequest {
    /// Request for `text` using the voice settings in `params`.
    pub fn new(text: impl Into<String>, params: &SynthesisParameters) -> Self {
        Self {
            text: text.into(),
            speaker_id: params.speaker_id.clone(),
            language_id: params.language_id.clone(),
            style_reference: params.style_reference.clone(),
        }
    }
}

/// Common interface for speech synthesis services.
///
/// A backend performs exactly one attempt per call and returns the encoded
/// audio for the chunk. Retrying, timeouts and ordering are handled by
/// [`SynthesisClient`] and [`SpeechPipeline`].
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize one chunk of text into encoded audio bytes.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, BackendError>;
}
