//! Audio containers and the decode/encode boundary.

use std::io::Cursor;
use std::path::Path;

use crate::error::EnhancementError;

/// Decoded mono audio as normalized `[-1, 1]` floats.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmSignal {
    /// Channel count of every signal inside the pipeline.
    pub const CHANNELS: u16 = 1;

    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a mono signal from interleaved frames by averaging channels.
    pub fn downmix(interleaved: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channels.max(1));
        if channels == 1 {
            return Self::new(interleaved.to_vec(), sample_rate);
        }
        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Convert to 16-bit PCM, clamping out-of-range samples.
    pub fn to_pcm16(&self) -> Pcm16Audio {
        Pcm16Audio {
            samples: self
                .samples
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                .collect(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Mono 16-bit PCM, the export-ready form of an enhanced signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pcm16Audio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Pcm16Audio {
    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Back to normalized floats; the inverse of [`PcmSignal::to_pcm16`].
    pub fn to_signal(&self) -> PcmSignal {
        PcmSignal::new(
            self.samples.iter().map(|&s| f32::from(s) / 32767.0).collect(),
            self.sample_rate,
        )
    }

    /// Append `other` without any cross-fade.
    pub fn append(&mut self, other: &Pcm16Audio) {
        self.samples.extend_from_slice(&other.samples);
    }

    /// Encode through an arbitrary codec, e.g. for export.
    pub fn encode_with(&self, codec: &dyn AudioCodec) -> Result<Vec<u8>, EnhancementError> {
        codec.encode(self)
    }

    /// Write the audio to a 16-bit mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = hound::WavWriter::create(path, pcm16_spec(self.sample_rate))?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Conversion between encoded audio payloads and [`PcmSignal`].
pub trait AudioCodec: Send + Sync {
    /// Decode a payload into a mono signal.
    fn decode(&self, bytes: &[u8]) -> Result<PcmSignal, EnhancementError>;

    /// Encode 16-bit PCM into this codec's container.
    fn encode(&self, audio: &Pcm16Audio) -> Result<Vec<u8>, EnhancementError>;
}

/// RIFF/WAVE codec backed by `hound`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavCodec;

impl AudioCodec for WavCodec {
    fn decode(&self, bytes: &[u8]) -> Result<PcmSignal, EnhancementError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| EnhancementError::Decode(e.to_string()))?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return Err(EnhancementError::Decode("sample rate is zero".into()));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| EnhancementError::Decode(e.to_string()))?,
            hound::SampleFormat::Int => {
                let bits = spec.bits_per_sample;
                if bits == 0 || bits > 32 {
                    return Err(EnhancementError::Decode(format!(
                        "unsupported bit depth {bits}"
                    )));
                }
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| EnhancementError::Decode(e.to_string()))?
            }
        };

        log::debug!(
            "Decoded {} frames at {}Hz ({} channel(s), {} bit)",
            interleaved.len() / usize::from(spec.channels.max(1)),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );

        Ok(PcmSignal::downmix(
            &interleaved,
            spec.channels,
            spec.sample_rate,
        ))
    }

    fn encode(&self, audio: &Pcm16Audio) -> Result<Vec<u8>, EnhancementError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, pcm16_spec(audio.sample_rate))
                .map_err(|e| EnhancementError::Encode(e.to_string()))?;
            for &sample in &audio.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| EnhancementError::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| EnhancementError::Encode(e.to_string()))?;
        }
        Ok(cursor.into_inner())
    }
}

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: PcmSignal::CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}
