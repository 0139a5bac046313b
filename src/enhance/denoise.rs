//! Non-stationary spectral gating.
//!
//! The noise floor of every frequency bin is tracked with a slow
//! forward-backward smoother, bins that do not rise clearly above it are
//! gated, and the gate is smoothed in time and frequency before the signal
//! is rebuilt by weighted overlap-add.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const N_FFT: usize = 1024;
const HOP: usize = N_FFT / 4;

/// Time constant of the noise-floor smoother, in seconds.
const TIME_CONSTANT_SECS: f32 = 2.0;

/// A bin must exceed its floor by this multiple to pass the gate.
const THRESHOLD_MULT: f32 = 2.0;
const SIGMOID_SLOPE: f32 = 10.0;

const FREQ_MASK_SMOOTH_HZ: f32 = 500.0;
const TIME_MASK_SMOOTH_MS: f32 = 50.0;

/// Share of the gated energy that is removed (1.0 removes all of it).
const PROP_DECREASE: f32 = 1.0;

const EPSILON: f32 = 1e-10;

/// Remove non-stationary noise from a mono signal. The output has exactly
/// the input's length.
pub fn reduce_noise(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return samples.to_vec();
    }

    let window = hann(N_FFT);
    let mut spectrogram = stft(samples, &window);
    let bins = N_FFT / 2 + 1;
    let frames = spectrogram.len();

    let magnitude: Vec<Vec<f32>> = spectrogram
        .iter()
        .map(|frame| frame[..bins].iter().map(|c| c.norm()).collect())
        .collect();

    let floor = smooth_over_time(&magnitude, sample_rate);

    let mut mask = vec![vec![0.0f32; bins]; frames];
    for t in 0..frames {
        for f in 0..bins {
            let excess = (magnitude[t][f] - floor[t][f]) / floor[t][f].max(EPSILON);
            mask[t][f] = sigmoid(excess - THRESHOLD_MULT, SIGMOID_SLOPE);
        }
    }

    let freq_radius =
        (FREQ_MASK_SMOOTH_HZ / (sample_rate as f32 / (N_FFT as f32 / 2.0))) as usize;
    let time_radius =
        (TIME_MASK_SMOOTH_MS / (HOP as f32 / sample_rate as f32 * 1000.0)) as usize;
    let mask = smooth_mask(&mask, freq_radius, time_radius);

    for (frame, gains) in spectrogram.iter_mut().zip(&mask) {
        for f in 0..bins {
            let g = gains[f] * PROP_DECREASE + (1.0 - PROP_DECREASE);
            frame[f] *= g;
            // Keep the spectrum Hermitian so the inverse stays real.
            if f != 0 && f != N_FFT / 2 {
                frame[N_FFT - f] *= g;
            }
        }
    }

    istft(&mut spectrogram, &window, samples.len())
}

fn sigmoid(x: f32, slope: f32) -> f32 {
    1.0 / (1.0 + (-x * slope).exp())
}

fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
        .collect()
}

/// Frames are centered: the signal is zero-padded by half a window on the
/// left and enough on the right to cover the last sample.
fn stft(samples: &[f32], window: &[f32]) -> Vec<Vec<Complex<f32>>> {
    let pad = N_FFT / 2;
    let frames = samples.len().div_ceil(HOP) + 1;
    let mut padded = vec![0.0f32; (frames - 1) * HOP + N_FFT];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N_FFT);

    (0..frames)
        .map(|t| {
            let start = t * HOP;
            let mut buf: Vec<Complex<f32>> = padded[start..start + N_FFT]
                .iter()
                .zip(window)
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buf);
            buf
        })
        .collect()
}

fn istft(spectrogram: &mut [Vec<Complex<f32>>], window: &[f32], len: usize) -> Vec<f32> {
    let pad = N_FFT / 2;
    let frames = spectrogram.len();
    let total = (frames - 1) * HOP + N_FFT;
    let mut out = vec![0.0f32; total];
    let mut norm = vec![0.0f32; total];

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(N_FFT);
    let scale = 1.0 / N_FFT as f32;

    for (t, frame) in spectrogram.iter_mut().enumerate() {
        ifft.process(frame);
        let start = t * HOP;
        for (i, c) in frame.iter().enumerate() {
            out[start + i] += c.re * scale * window[i];
            norm[start + i] += window[i] * window[i];
        }
    }

    (pad..pad + len)
        .map(|i| {
            if i < total && norm[i] > EPSILON {
                out[i] / norm[i]
            } else {
                0.0
            }
        })
        .collect()
}

/// Per-bin noise floor: a one-pole low-pass run forward then backward over
/// the frame sequence, starting from the bin's mean magnitude.
fn smooth_over_time(magnitude: &[Vec<f32>], sample_rate: u32) -> Vec<Vec<f32>> {
    let t_frames = TIME_CONSTANT_SECS * sample_rate as f32 / HOP as f32;
    let b = ((1.0 + 4.0 * t_frames * t_frames).sqrt() - 1.0) / (2.0 * t_frames * t_frames);

    let frames = magnitude.len();
    let bins = magnitude.first().map_or(0, Vec::len);
    let mut out = vec![vec![0.0f32; bins]; frames];

    for f in 0..bins {
        let mut state = magnitude.iter().map(|frame| frame[f]).sum::<f32>() / frames as f32;
        for t in 0..frames {
            state = b * magnitude[t][f] + (1.0 - b) * state;
            out[t][f] = state;
        }
        let mut state = out[frames - 1][f];
        for t in (0..frames).rev() {
            state = b * out[t][f] + (1.0 - b) * state;
            out[t][f] = state;
        }
    }
    out
}

/// Triangular kernel of half-width `radius`, normalized to unit sum.
fn triangle(radius: usize) -> Vec<f32> {
    let peak = radius as f32 + 1.0;
    let raw: Vec<f32> = (0..=2 * radius)
        .map(|i| peak - (i as f32 - radius as f32).abs())
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// Separable 2-D smoothing of the mask with zero padding at the edges.
fn smooth_mask(mask: &[Vec<f32>], freq_radius: usize, time_radius: usize) -> Vec<Vec<f32>> {
    let frames = mask.len();
    let bins = mask.first().map_or(0, Vec::len);
    let kf = triangle(freq_radius);
    let kt = triangle(time_radius);

    let mut along_freq = vec![vec![0.0f32; bins]; frames];
    for t in 0..frames {
        for f in 0..bins {
            let mut acc = 0.0;
            for (k, w) in kf.iter().enumerate() {
                let idx = f as isize + k as isize - freq_radius as isize;
                if (0..bins as isize).contains(&idx) {
                    acc += w * mask[t][idx as usize];
                }
            }
            along_freq[t][f] = acc;
        }
    }

    let mut out = vec![vec![0.0f32; bins]; frames];
    for t in 0..frames {
        for f in 0..bins {
            let mut acc = 0.0;
            for (k, w) in kt.iter().enumerate() {
                let idx = t as isize + k as isize - time_radius as isize;
                if (0..frames as isize).contains(&idx) {
                    acc += w * along_freq[idx as usize][f];
                }
            }
            out[t][f] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic white noise in `[-amp, amp]`.
    fn noise(n: usize, amp: f32, mut seed: u64) -> Vec<f32> {
        (0..n)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                ((seed >> 11) as f32 / (1u64 << 53) as f32 * 2.0 - 1.0) * amp
            })
            .collect()
    }

    fn energy(x: &[f32]) -> f32 {
        x.iter().map(|s| s * s).sum()
    }

    #[test]
    fn length_is_preserved() {
        for n in [1, 100, 1023, 1024, 5000, 24000] {
            let x = noise(n, 0.1, 7);
            assert_eq!(reduce_noise(&x, 24000).len(), n);
        }
    }

    #[test]
    fn silence_stays_silent() {
        let y = reduce_noise(&vec![0.0; 4800], 24000);
        assert!(y.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn steady_noise_is_suppressed() {
        let x = noise(48000, 0.05, 42);
        let y = reduce_noise(&x, 24000);
        assert!(energy(&y) < 0.1 * energy(&x), "{} vs {}", energy(&y), energy(&x));
    }

    #[test]
    fn broadband_burst_survives_while_background_is_gated() {
        let rate = 24000u32;
        let n = rate as usize * 3;
        let mut x = noise(n, 0.005, 3);
        let start = n / 2;
        let len = rate as usize / 5;
        for (dst, b) in x[start..start + len].iter_mut().zip(noise(len, 0.5, 99)) {
            *dst += b;
        }

        let y = reduce_noise(&x, rate);

        let burst_kept = energy(&y[start..start + len]) / energy(&x[start..start + len]);
        let quiet = rate as usize / 2;
        let background_kept = energy(&y[..quiet]) / energy(&x[..quiet]);
        assert!(burst_kept > 0.25, "burst kept {burst_kept}");
        assert!(background_kept < 0.05, "background kept {background_kept}");
    }

    #[test]
    fn triangle_kernel_sums_to_one() {
        for r in [0, 1, 4, 10] {
            let k = triangle(r);
            assert_eq!(k.len(), 2 * r + 1);
            assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }
}
