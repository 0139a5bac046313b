use std::time::Duration;

/// Failure of a single synthesis attempt against a backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned an empty audio payload")]
    EmptyResponse,
}

/// Terminal error raised once the retry budget for a chunk is spent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to generate speech after {attempts} attempts (last error: {last})")]
pub struct SynthesisBackendError {
    pub attempts: u32,
    pub last: BackendError,
}

/// Decode or signal-processing failure for one chunk's audio.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnhancementError {
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("failed to encode audio: {0}")]
    Encode(String),
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("invalid enhancement settings: {0}")]
    InvalidSettings(String),
}

/// Why a single chunk task produced no result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error(transparent)]
    Backend(#[from] SynthesisBackendError),
    #[error(transparent)]
    Enhancement(#[from] EnhancementError),
    #[error("worker task aborted: {0}")]
    Task(String),
    #[error("no result was reported")]
    Missing,
}

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("no valid text chunks found")]
    EmptyInput,
    #[error("invalid synthesis parameters: {0}")]
    InvalidParameters(String),
    #[error(
        "chunk {} of {} failed ({} failed in total): {}",
        .index + 1,
        .total,
        .failed,
        .cause
    )]
    PartialFailure {
        /// 0-based index of the first failing chunk.
        index: usize,
        failed: usize,
        total: usize,
        cause: ChunkError,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "archive")]
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl SpeechError {
    /// The failing chunk index, if this error belongs to a specific chunk.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::PartialFailure { index, .. } => Some(*index),
            _ => None,
        }
    }
}
