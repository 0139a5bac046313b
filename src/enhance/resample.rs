//! Band-limited sample-rate conversion using Rubato's synchronous FFT resampler.

use rubato::{FftFixedIn, Resampler};

use crate::error::EnhancementError;

/// Input frames fed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Resample mono `input` from `from_rate` to `to_rate`.
///
/// The output has `round(len * to_rate / from_rate)` samples; the
/// resampler's internal delay is trimmed off the front.
pub fn resample(
    input: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, EnhancementError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(EnhancementError::Resample(format!(
            "invalid rates {from_rate}Hz -> {to_rate}Hz"
        )));
    }
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let expected =
        (input.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        2,
        1,
    )
    .map_err(|e| EnhancementError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let samples: Vec<f64> = input.iter().map(|&s| f64::from(s)).collect();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay);

    let mut pos = 0usize;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let frames = [&samples[pos..pos + needed]];
        let block = resampler
            .process(&frames[..], None)
            .map_err(|e| EnhancementError::Resample(e.to_string()))?;
        output.extend_from_slice(&block[0]);
        pos += needed;
    }

    if pos < samples.len() {
        let frames = [&samples[pos..]];
        let block = resampler
            .process_partial(Some(&frames[..]), None)
            .map_err(|e| EnhancementError::Resample(e.to_string()))?;
        output.extend_from_slice(&block[0]);
    }

    // Flush the delay line with silence until the tail is out.
    while output.len() < expected + delay {
        let block = resampler
            .process_partial(None::<&[&[f64]]>, None)
            .map_err(|e| EnhancementError::Resample(e.to_string()))?;
        if block[0].is_empty() {
            break;
        }
        output.extend_from_slice(&block[0]);
    }

    let mut result: Vec<f32> = output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect();
    result.resize(expected, 0.0);
    Ok(result)
}
