use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tts_pipeline::{
    AudioCodec, BackendError, ChunkError, EnhancementError, EnhancementSettings, OutputMode,
    Pcm16Audio, SpeechError, SpeechPipeline, SynthesisBackend, SynthesisOutcome,
    SynthesisParameters, SynthesisParametersBuilder, SynthesisRequest, WavCodec,
};

const RATE: u32 = 8000;

/// In-memory backend. Chunk `i` has the text `w{i:02}.` and is answered
/// with a WAV of `10 + i` samples, all equal to `100 * i`.
#[derive(Default)]
struct ScriptedBackend {
    chunks: usize,
    failing: HashSet<usize>,
    /// Make later chunks finish first.
    reverse_delays: bool,
    garbage: bool,
    panic_on: Option<usize>,
    calls: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    fn new(chunks: usize) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    fn calls_for(&self, index: usize) -> usize {
        self.calls.lock().unwrap().iter().filter(|&&i| i == index).count()
    }
}

fn chunk_payload(index: usize) -> Vec<u8> {
    let audio = Pcm16Audio {
        samples: vec![100 * index as i16; 10 + index],
        sample_rate: RATE,
    };
    WavCodec.encode(&audio).unwrap()
}

#[async_trait]
impl SynthesisBackend for ScriptedBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, BackendError> {
        let index: usize = request.text[1..3].parse().unwrap();
        self.calls.lock().unwrap().push(index);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = if self.reverse_delays {
            Duration::from_millis(5 * (self.chunks - index) as u64)
        } else {
            Duration::from_millis(5)
        };
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on == Some(index) {
            panic!("backend crashed on chunk {index}");
        }
        if self.failing.contains(&index) {
            return Err(BackendError::Status {
                status: 500,
                body: "internal error".into(),
            });
        }
        if self.garbage {
            return Ok(b"<html>not audio</html>".to_vec());
        }
        Ok(chunk_payload(index))
    }
}

fn script(chunks: usize) -> String {
    (0..chunks)
        .map(|i| format!("w{i:02}."))
        .collect::<Vec<_>>()
        .join("\n")
}

fn params(workers: usize) -> SynthesisParameters {
    SynthesisParametersBuilder::default()
        .max_chunk_length(5usize)
        .worker_count(workers)
        .max_retries(2u32)
        .retry_base_delay(Duration::from_millis(1))
        .build()
        .unwrap()
}

fn expected_samples(chunks: usize) -> Vec<i16> {
    (0..chunks)
        .flat_map(|i| std::iter::repeat(100 * i as i16).take(10 + i))
        .collect()
}

#[tokio::test]
async fn merged_output_follows_chunk_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = Arc::new(ScriptedBackend::new(6));
    let pipeline = SpeechPipeline::new(backend.clone());

    let audio = pipeline.synthesize(&script(6), &params(3)).await.unwrap();

    assert_eq!(audio.sample_rate, RATE);
    assert_eq!(audio.samples, expected_samples(6));
    for i in 0..6 {
        assert_eq!(backend.calls_for(i), 1);
    }
}

#[tokio::test]
async fn reverse_completion_gives_identical_output() {
    let serial = SpeechPipeline::new(Arc::new(ScriptedBackend::new(8)))
        .synthesize(&script(8), &params(1))
        .await
        .unwrap();

    let reversed = ScriptedBackend {
        reverse_delays: true,
        ..ScriptedBackend::new(8)
    };
    let concurrent = SpeechPipeline::new(Arc::new(reversed))
        .synthesize(&script(8), &params(8))
        .await
        .unwrap();

    assert_eq!(serial, concurrent);
    assert_eq!(
        WavCodec.encode(&serial).unwrap(),
        WavCodec.encode(&concurrent).unwrap()
    );
}

#[tokio::test]
async fn one_failing_chunk_fails_the_request_without_cancelling_others() {
    let backend = Arc::new(ScriptedBackend {
        failing: HashSet::from([3]),
        ..ScriptedBackend::new(6)
    });
    let pipeline = SpeechPipeline::new(backend.clone());

    let err = pipeline
        .run(&script(6), &params(2), OutputMode::Merged)
        .await
        .unwrap_err();

    match &err {
        SpeechError::PartialFailure {
            index,
            failed,
            total,
            cause: ChunkError::Backend(cause),
        } => {
            assert_eq!(*index, 3);
            assert_eq!(*failed, 1);
            assert_eq!(*total, 6);
            assert_eq!(cause.attempts, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.chunk_index(), Some(3));
    assert!(err.to_string().contains("chunk 4 of 6"), "{err}");

    assert_eq!(backend.calls_for(3), 2);
    for i in [0, 1, 2, 4, 5] {
        assert_eq!(backend.calls_for(i), 1, "chunk {i} was not attempted");
    }
}

#[tokio::test]
async fn first_failing_index_is_reported() {
    let backend = ScriptedBackend {
        failing: HashSet::from([4, 1]),
        ..ScriptedBackend::new(5)
    };
    let err = SpeechPipeline::new(Arc::new(backend))
        .synthesize_chunks(&script(5), &params(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SpeechError::PartialFailure {
            index: 1,
            failed: 2,
            total: 5,
            ..
        }
    ));
}

#[tokio::test]
async fn raw_list_returns_payloads_untouched() {
    let backend = Arc::new(ScriptedBackend::new(4));
    let pipeline = SpeechPipeline::new(backend);

    let outcome = pipeline
        .run(&script(4), &params(4), OutputMode::RawList)
        .await
        .unwrap();

    let expected: Vec<Vec<u8>> = (0..4).map(chunk_payload).collect();
    assert_eq!(outcome, SynthesisOutcome::RawList(expected));
}

#[tokio::test]
async fn raw_list_skips_decoding() {
    let backend = ScriptedBackend {
        garbage: true,
        ..ScriptedBackend::new(2)
    };
    let pipeline = SpeechPipeline::new(Arc::new(backend));

    let raw = pipeline.synthesize_chunks(&script(2), &params(1)).await.unwrap();
    assert_eq!(raw.len(), 2);

    let err = pipeline.synthesize(&script(2), &params(1)).await.unwrap_err();
    assert!(matches!(
        err,
        SpeechError::PartialFailure {
            index: 0,
            failed: 2,
            cause: ChunkError::Enhancement(EnhancementError::Decode(_)),
            ..
        }
    ));
}

#[tokio::test]
async fn worker_count_bounds_concurrency() {
    let backend = Arc::new(ScriptedBackend::new(10));
    let pipeline = SpeechPipeline::new(backend.clone());

    pipeline.synthesize(&script(10), &params(3)).await.unwrap();

    let peak = backend.peak_in_flight.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak in flight {peak}");
}

#[tokio::test]
async fn default_worker_count_is_serial() {
    let backend = Arc::new(ScriptedBackend::new(5));
    let pipeline = SpeechPipeline::new(backend.clone());
    let mut params = params(1);
    params.worker_count = SynthesisParameters::default().worker_count;

    pipeline.synthesize(&script(5), &params).await.unwrap();

    assert_eq!(backend.peak_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_request_stops_calling_the_backend() {
    let mut backend = ScriptedBackend::new(3);
    backend.failing = (0..3).collect();
    let backend = Arc::new(backend);
    let pipeline = SpeechPipeline::new(backend.clone());
    let mut params = params(1);
    params.max_retries = 5;
    params.retry_base_delay = Duration::from_millis(50);

    let timed_out =
        tokio::time::timeout(Duration::from_millis(20), pipeline.synthesize(&script(3), &params))
            .await;
    assert!(timed_out.is_err());
    let calls_at_drop = backend.calls.lock().unwrap().len();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(backend.calls.lock().unwrap().len(), calls_at_drop);
    assert_eq!(backend.peak_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_worker_count_is_rejected() {
    let backend = Arc::new(ScriptedBackend::new(2));
    let pipeline = SpeechPipeline::new(backend.clone());
    let mut params = params(1);
    params.worker_count = usize::MAX;

    let err = pipeline.synthesize(&script(2), &params).await.unwrap_err();

    assert!(matches!(err, SpeechError::InvalidParameters(_)), "{err:?}");
    assert!(backend.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn worker_count_above_chunk_count_runs_everything() {
    let backend = Arc::new(ScriptedBackend::new(3));
    let pipeline = SpeechPipeline::new(backend.clone());

    let merged = pipeline.synthesize(&script(3), &params(64)).await.unwrap();

    assert_eq!(merged.samples, expected_samples(3));
    assert!(backend.peak_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn blank_text_is_rejected_before_any_call() {
    let backend = Arc::new(ScriptedBackend::new(1));
    let pipeline = SpeechPipeline::new(backend.clone());

    let err = pipeline.synthesize("  \n\n   ", &params(1)).await.unwrap_err();

    assert!(matches!(err, SpeechError::EmptyInput));
    assert!(backend.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    let pipeline = SpeechPipeline::new(Arc::new(ScriptedBackend::new(1)));
    let mut params = params(1);
    params.worker_count = 0;

    let err = pipeline.synthesize(&script(1), &params).await.unwrap_err();
    assert!(matches!(err, SpeechError::InvalidParameters(_)));
}

#[tokio::test]
async fn panicking_backend_becomes_a_task_error() {
    let backend = ScriptedBackend {
        panic_on: Some(1),
        ..ScriptedBackend::new(3)
    };
    let err = SpeechPipeline::new(Arc::new(backend))
        .synthesize(&script(3), &params(3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SpeechError::PartialFailure {
            index: 1,
            cause: ChunkError::Task(_),
            ..
        }
    ));
}

#[tokio::test]
async fn enhancement_runs_per_chunk() {
    let backend = Arc::new(ScriptedBackend::new(3));
    let pipeline = SpeechPipeline::new(backend);
    let mut params = params(3);
    params.enhancement = EnhancementSettings {
        resample: true,
        target_sample_rate: 2 * RATE,
        ..Default::default()
    };

    let audio = pipeline.synthesize(&script(3), &params).await.unwrap();

    assert_eq!(audio.sample_rate, 2 * RATE);
    // Each chunk is resampled on its own: 20 + 22 + 24 samples.
    assert_eq!(audio.samples.len(), 66);
}

#[test]
fn preview_reports_chunks_without_backend_calls() {
    let backend = Arc::new(ScriptedBackend::new(1));
    let pipeline = SpeechPipeline::new(backend.clone());

    let preview = pipeline.preview_chunks("Hello world. This is a test sentence.", 20);

    assert_eq!(preview.original_length, 37);
    assert_eq!(preview.chunks[0].text, "Hello world.");
    assert_eq!(preview.num_chunks, preview.chunks.len());
    let json = serde_json::to_value(&preview).unwrap();
    assert_eq!(json["chunks"][0]["index"], 0);
    assert_eq!(json["chunks"][0]["length"], 12);
    assert!(backend.calls.lock().unwrap().is_empty());
}
