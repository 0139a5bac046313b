//! Chunked, concurrent synthesis with ordered, all-or-nothing assembly.
//!
//! A request is split into chunks, every chunk becomes one task on a tokio
//! [`JoinSet`], and a [`Semaphore`] holding `worker_count` permits bounds how
//! many tasks talk to the backend at once. Results are collected by chunk
//! index once every task has finished; a single failed chunk fails the whole
//! request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::audio::{AudioCodec, Pcm16Audio, PcmSignal, WavCodec};
use crate::chunker::{self, ChunkPreview, TextChunk};
use crate::client::{RetryPolicy, SynthesisClient};
use crate::config::SynthesisParameters;
use crate::enhance::{self, resample, EnhancementSettings};
use crate::error::{ChunkError, SpeechError};
use crate::{SynthesisBackend, SynthesisRequest};

/// How finished chunks are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Enhance every chunk and concatenate them into one track.
    #[default]
    Merged,
    /// Return the backend payloads untouched, in chunk order.
    RawList,
}

/// Terminal artifact of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Merged(Pcm16Audio),
    RawList(Vec<Vec<u8>>),
}

/// Text-to-speech orchestrator over a [`SynthesisBackend`].
///
/// One pipeline can serve many requests; nothing is shared between them
/// besides the backend and the codec.
pub struct SpeechPipeline {
    backend: Arc<dyn SynthesisBackend>,
    codec: Arc<dyn AudioCodec>,
}

impl SpeechPipeline {
    /// Pipeline over `backend`, decoding payloads as WAV.
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            backend,
            codec: Arc::new(WavCodec),
        }
    }

    /// Replace the codec used to decode backend payloads.
    pub fn with_codec(mut self, codec: Arc<dyn AudioCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Split `text` without contacting the backend.
    pub fn preview_chunks(&self, text: &str, max_length: usize) -> ChunkPreview {
        chunker::preview(text, max_length)
    }

    /// Synthesize `text` into a single enhanced track.
    pub async fn synthesize(
        &self,
        text: &str,
        params: &SynthesisParameters,
    ) -> Result<Pcm16Audio, SpeechError> {
        let chunks = Self::prepare(text, params)?;
        let client = self.client(params);
        let codec = Arc::clone(&self.codec);
        let settings = params.enhancement.clone();
        let parts = self
            .fan_out(chunks, params, move |request| {
                let client = client.clone();
                let codec = Arc::clone(&codec);
                let settings = settings.clone();
                async move {
                    let bytes = client.synthesize(&request).await?;
                    // Decoding and DSP are CPU-bound.
                    tokio::task::spawn_blocking(move || {
                        decode_and_enhance(codec.as_ref(), &bytes, &settings)
                    })
                    .await
                    .map_err(|e| ChunkError::Task(e.to_string()))?
                }
            })
            .await?;
        let merged = merge(parts)?;
        log::info!(
            "Merged audio: {:.2}s at {}Hz",
            merged.duration_secs(),
            merged.sample_rate
        );
        Ok(merged)
    }

    /// Synthesize `text` and return each chunk's raw payload in order.
    pub async fn synthesize_chunks(
        &self,
        text: &str,
        params: &SynthesisParameters,
    ) -> Result<Vec<Vec<u8>>, SpeechError> {
        let chunks = Self::prepare(text, params)?;
        let client = self.client(params);
        self.fan_out(chunks, params, move |request| {
            let client = client.clone();
            async move { client.synthesize(&request).await.map_err(ChunkError::from) }
        })
        .await
    }

    /// Synthesize `text` and return it in the shape selected by `mode`.
    ///
    /// Fails with [`SpeechError::EmptyInput`] when the text has no content
    /// and with [`SpeechError::PartialFailure`] when any chunk failed.
    pub async fn run(
        &self,
        text: &str,
        params: &SynthesisParameters,
        mode: OutputMode,
    ) -> Result<SynthesisOutcome, SpeechError> {
        match mode {
            OutputMode::Merged => self
                .synthesize(text, params)
                .await
                .map(SynthesisOutcome::Merged),
            OutputMode::RawList => self
                .synthesize_chunks(text, params)
                .await
                .map(SynthesisOutcome::RawList),
        }
    }

    fn prepare(text: &str, params: &SynthesisParameters) -> Result<Vec<TextChunk>, SpeechError> {
        params.validate()?;
        let chunks = chunker::split(text, params.max_chunk_length);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyInput);
        }
        log::info!("Split text into {} chunks", chunks.len());
        Ok(chunks)
    }

    fn client(&self, params: &SynthesisParameters) -> SynthesisClient {
        SynthesisClient::new(
            Arc::clone(&self.backend),
            RetryPolicy {
                max_attempts: params.max_retries,
                base_delay: params.retry_base_delay,
                attempt_timeout: params.request_timeout,
            },
        )
    }

    /// Run `task` once per chunk on a bounded pool and collect the results
    /// in chunk order. Every task runs to completion even after a failure;
    /// dropping the returned future aborts all of them.
    async fn fan_out<T, F, Fut>(
        &self,
        chunks: Vec<TextChunk>,
        params: &SynthesisParameters,
        task: F,
    ) -> Result<Vec<T>, SpeechError>
    where
        T: Send + 'static,
        F: Fn(SynthesisRequest) -> Fut,
        Fut: Future<Output = Result<T, ChunkError>> + Send + 'static,
    {
        let total = chunks.len();
        // validate() caps worker_count at Semaphore::MAX_PERMITS.
        let permits = Arc::new(Semaphore::new(params.worker_count.min(total).max(1)));
        let mut set = JoinSet::new();
        let mut indices: HashMap<Id, usize> = HashMap::with_capacity(total);

        for chunk in chunks {
            let index = chunk.index;
            let work = task(SynthesisRequest::new(chunk.text, params));
            let permits = Arc::clone(&permits);
            // Permit and work share one task; dropping the set aborts both.
            let handle = set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ChunkError::Task(e.to_string()))?;
                work.await
            });
            indices.insert(handle.id(), index);
        }

        let mut results: Vec<Option<Result<T, ChunkError>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        while let Some(joined) = set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(ChunkError::Task(e.to_string()))),
            };
            let Some(&index) = indices.get(&id) else {
                log::error!("Worker task {id} has no chunk index");
                continue;
            };
            if let Err(e) = &result {
                log::warn!("Chunk {}/{} failed: {}", index + 1, total, e);
            }
            if let Some(slot) = results.get_mut(index) {
                *slot = Some(result);
            }
        }

        collect_in_order(results)
    }
}

fn decode_and_enhance(
    codec: &dyn AudioCodec,
    bytes: &[u8],
    settings: &EnhancementSettings,
) -> Result<Pcm16Audio, ChunkError> {
    let signal = codec.decode(bytes)?;
    Ok(enhance::enhance(signal, settings)?)
}

/// All-or-nothing fan-in: every index must hold a success.
fn collect_in_order<T>(results: Vec<Option<Result<T, ChunkError>>>) -> Result<Vec<T>, SpeechError> {
    let total = results.len();
    let mut first_failure: Option<(usize, ChunkError)> = None;
    let mut failed = 0;
    let mut values = Vec::with_capacity(total);

    for (index, slot) in results.into_iter().enumerate() {
        let outcome = slot.unwrap_or(Err(ChunkError::Missing));
        match outcome {
            Ok(value) => values.push(value),
            Err(cause) => {
                failed += 1;
                if first_failure.is_none() {
                    first_failure = Some((index, cause));
                }
            }
        }
    }

    match first_failure {
        Some((index, cause)) => {
            log::error!("{failed} of {total} chunks failed, discarding the request");
            Err(SpeechError::PartialFailure {
                index,
                failed,
                total,
                cause,
            })
        }
        None => Ok(values),
    }
}

/// Concatenate chunks in order. Chunks at a lower sample rate than the
/// highest one are resampled up before they are appended.
fn merge(parts: Vec<Pcm16Audio>) -> Result<Pcm16Audio, SpeechError> {
    let total = parts.len();
    let Some(rate) = parts.iter().map(|p| p.sample_rate).max() else {
        return Err(SpeechError::EmptyInput);
    };
    let mut merged = Pcm16Audio {
        samples: Vec::with_capacity(parts.iter().map(|p| p.samples.len()).sum()),
        sample_rate: rate,
    };

    for (index, part) in parts.into_iter().enumerate() {
        if part.sample_rate == rate {
            merged.append(&part);
            continue;
        }
        log::warn!(
            "Chunk {} is {}Hz, resampling to {}Hz before merging",
            index + 1,
            part.sample_rate,
            rate
        );
        let signal = part.to_signal();
        let samples = resample::resample(&signal.samples, signal.sample_rate, rate).map_err(
            |e| SpeechError::PartialFailure {
                index,
                failed: 1,
                total,
                cause: e.into(),
            },
        )?;
        merged.append(&PcmSignal::new(samples, rate).to_pcm16());
    }
    Ok(merged)
}
