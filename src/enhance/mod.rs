//! Deterministic audio enhancement applied to each synthesized chunk.
//!
//! Stages run in a fixed order and each one is opt-in:
//!
//! 1. resampling to a target rate,
//! 2. non-stationary noise reduction,
//! 3. soft-knee dynamic range compression,
//! 4. loudness normalization to a target LUFS,
//!
//! after which the signal is converted to 16-bit mono PCM.
//!
//! # Example
//!
//! ```rust
//! use tts_pipeline::audio::PcmSignal;
//! use tts_pipeline::enhance::{enhance, EnhancementSettings};
//!
//! let signal = PcmSignal::new(vec![0.0, 0.25, -0.25], 24000);
//! let settings = EnhancementSettings {
//!     dynamic_compression: true,
//!     ..Default::default()
//! };
//! let pcm = enhance(signal, &settings)?;
//! assert_eq!(pcm.sample_rate, 24000);
//! # Ok::<(), tts_pipeline::EnhancementError>(())
//! ```

pub mod denoise;
pub mod loudness;
pub mod resample;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audio::{Pcm16Audio, PcmSignal};
use crate::error::EnhancementError;

/// Default loudness target (EBU R128 broadcast level).
pub const DEFAULT_TARGET_LUFS: f64 = -23.0;

/// Default resampling target.
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 44100;

/// Which enhancement stages to run. Every stage is disabled by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    pub resample: bool,
    pub target_sample_rate: u32,
    pub noise_reduction: bool,
    pub dynamic_compression: bool,
    pub loudness_normalization: bool,
    pub target_lufs: f64,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            resample: false,
            target_sample_rate: DEFAULT_TARGET_SAMPLE_RATE,
            noise_reduction: false,
            dynamic_compression: false,
            loudness_normalization: false,
            target_lufs: DEFAULT_TARGET_LUFS,
        }
    }
}

impl EnhancementSettings {
    pub fn validate(&self) -> Result<(), EnhancementError> {
        if self.resample && self.target_sample_rate == 0 {
            return Err(EnhancementError::InvalidSettings(
                "target_sample_rate must be greater than zero".into(),
            ));
        }
        if self.loudness_normalization && !self.target_lufs.is_finite() {
            return Err(EnhancementError::InvalidSettings(format!(
                "target_lufs must be finite, got {}",
                self.target_lufs
            )));
        }
        Ok(())
    }

    /// True when no stage is enabled.
    pub fn is_passthrough(&self) -> bool {
        !(self.resample
            || self.noise_reduction
            || self.dynamic_compression
            || self.loudness_normalization)
    }
}

/// Named speech presets: a target rate plus a loudness target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementPreset {
    /// Minimal preset for long content.
    TtsBasic,
    /// Good quality at a compact size.
    TtsBalanced,
    /// Narrations and audiobooks.
    TtsHiRes,
    Podcast,
}

impl EnhancementPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TtsBasic => "tts_basic",
            Self::TtsBalanced => "tts_balanced",
            Self::TtsHiRes => "tts_hi_res",
            Self::Podcast => "podcast",
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::TtsBasic => 22050,
            Self::TtsBalanced => 32000,
            Self::TtsHiRes | Self::Podcast => 44100,
        }
    }

    pub fn target_lufs(&self) -> f64 {
        match self {
            Self::TtsBasic => -18.0,
            Self::TtsBalanced | Self::TtsHiRes | Self::Podcast => -16.0,
        }
    }

    pub fn settings(&self) -> EnhancementSettings {
        EnhancementSettings {
            resample: true,
            target_sample_rate: self.sample_rate(),
            loudness_normalization: true,
            target_lufs: self.target_lufs(),
            ..Default::default()
        }
    }
}

impl FromStr for EnhancementPreset {
    type Err = EnhancementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tts_basic" => Ok(Self::TtsBasic),
            "tts_balanced" => Ok(Self::TtsBalanced),
            "tts_hi_res" => Ok(Self::TtsHiRes),
            "podcast" => Ok(Self::Podcast),
            other => Err(EnhancementError::InvalidSettings(format!(
                "unknown preset '{other}'"
            ))),
        }
    }
}

/// Soft-knee compressor: `tanh(1.5 x) * 0.9`, sample-wise.
pub fn compress(samples: &mut [f32]) {
    for s in samples.iter_mut() {
        *s = (*s * 1.5).tanh() * 0.9;
    }
}

/// Run stages 1-4 on `signal`.
pub fn enhance_signal(
    mut signal: PcmSignal,
    settings: &EnhancementSettings,
) -> Result<PcmSignal, EnhancementError> {
    settings.validate()?;

    if settings.resample && signal.sample_rate != settings.target_sample_rate {
        log::info!(
            "Resampling from {}Hz to {}Hz.",
            signal.sample_rate,
            settings.target_sample_rate
        );
        signal.samples = resample::resample(
            &signal.samples,
            signal.sample_rate,
            settings.target_sample_rate,
        )?;
        signal.sample_rate = settings.target_sample_rate;
    }

    if settings.noise_reduction {
        log::info!("Applying noise reduction.");
        signal.samples = denoise::reduce_noise(&signal.samples, signal.sample_rate);
    }

    if settings.dynamic_compression {
        log::info!("Applying dynamic range compression.");
        compress(&mut signal.samples);
    }

    if settings.loudness_normalization {
        let measured = loudness::integrated_loudness(&signal.samples, signal.sample_rate);
        if measured == f64::NEG_INFINITY {
            log::warn!("Input audio is silent, skipping loudness normalization.");
        } else {
            log::info!(
                "Normalizing loudness from {:.2} LUFS to {:.2} LUFS.",
                measured,
                settings.target_lufs
            );
            loudness::apply_gain(&mut signal.samples, measured, settings.target_lufs);
            let peak = signal.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            if peak > 1.0 {
                log::warn!("Possible clipped samples in output (peak {peak:.3}).");
            }
        }
    }

    Ok(signal)
}

/// Run every enabled stage and convert the result to 16-bit mono PCM.
pub fn enhance(
    signal: PcmSignal,
    settings: &EnhancementSettings,
) -> Result<Pcm16Audio, EnhancementError> {
    Ok(enhance_signal(signal, settings)?.to_pcm16())
}
