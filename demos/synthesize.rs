use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tts_pipeline::{
    backends::http::HttpBackend, EnhancementPreset, PipelineConfig, SpeechPipeline,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = PipelineConfig::from_env()?;
    let text = std::env::args().nth(1).unwrap_or_else(|| {
        "Hello! This is a chunked speech pipeline. Long passages are split on \
         paragraph, sentence and clause boundaries, synthesized concurrently, \
         and stitched back together in reading order."
            .to_string()
    });

    let backend = HttpBackend::with_timeout(
        &config.service_url,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let pipeline = SpeechPipeline::new(Arc::new(backend));

    let preview = pipeline.preview_chunks(&text, config.max_chunk_length);
    println!("{}", serde_json::to_string_pretty(&preview)?);

    let params = config
        .parameters()
        .enhancement(EnhancementPreset::TtsBalanced.settings())
        .build()?;

    let synth_start = Instant::now();
    let audio = pipeline.synthesize(&text, &params).await?;
    let synth_dur = synth_start.elapsed();
    println!(
        "Synthesized {:.2}s audio at {}Hz in {:.2?}",
        audio.duration_secs(),
        audio.sample_rate,
        synth_dur
    );

    audio.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    #[cfg(feature = "archive")]
    {
        let payloads = pipeline.synthesize_chunks(&text, &params).await?;
        tts_pipeline::write_chunk_archive(&payloads, std::fs::File::create("chunks.zip")?)?;
        println!("Saved {} chunks to chunks.zip", payloads.len());
    }

    Ok(())
}
