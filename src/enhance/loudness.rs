//! ITU-R BS.1770 integrated loudness and gain normalization.

use std::f64::consts::PI;

/// Gating block length in seconds.
const BLOCK_SECS: f64 = 0.4;

/// Fraction of a block shared with the next one.
const BLOCK_OVERLAP: f64 = 0.75;

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;

/// Mono channel weighting offset.
const LUFS_REFERENCE_OFFSET: f64 = -0.691;

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// High-shelf stage of the K-weighting filter.
    fn k_shelf(sample_rate: f64) -> Self {
        let f0 = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;

        let k = (PI * f0 / sample_rate).tan();
        let vh = 10f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;

        Self {
            b0: (vh + vb * k / q + k * k) / a0,
            b1: 2.0 * (k * k - vh) / a0,
            b2: (vh - vb * k / q + k * k) / a0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / q + k * k) / a0,
        }
    }

    /// Revised low-frequency B-curve high-pass stage.
    fn rlb_highpass(sample_rate: f64) -> Self {
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (PI * f0 / sample_rate).tan();
        let a0 = 1.0 + k / q + k * k;

        Self {
            b0: 1.0,
            b1: -2.0,
            b2: 1.0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / q + k * k) / a0,
        }
    }

    fn filter(&self, input: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        input
            .iter()
            .map(|&x| {
                let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                x2 = x1;
                x1 = x;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }
}

fn k_weight(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let fs = f64::from(sample_rate);
    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let shelved = Biquad::k_shelf(fs).filter(&input);
    Biquad::rlb_highpass(fs).filter(&shelved)
}

fn mean_square_to_lufs(ms: f64) -> f64 {
    if ms <= 0.0 {
        return f64::NEG_INFINITY;
    }
    LUFS_REFERENCE_OFFSET + 10.0 * ms.log10()
}

fn lufs_to_mean_square(lufs: f64) -> f64 {
    10f64.powf((lufs - LUFS_REFERENCE_OFFSET) / 10.0)
}

/// Integrated loudness of a mono signal in LUFS.
///
/// Returns `f64::NEG_INFINITY` for digital silence or when no block passes
/// the absolute gate. Signals shorter than one gating block are measured
/// as a single block.
pub fn integrated_loudness(samples: &[f32], sample_rate: u32) -> f64 {
    if samples.is_empty() || sample_rate == 0 {
        return f64::NEG_INFINITY;
    }

    let weighted = k_weight(samples, sample_rate);
    let block = ((f64::from(sample_rate) * BLOCK_SECS).round() as usize).max(1);
    let hop = ((block as f64 * (1.0 - BLOCK_OVERLAP)).round() as usize).max(1);

    let blocks: Vec<f64> = if weighted.len() < block {
        vec![mean_square(&weighted)]
    } else {
        (0..=(weighted.len() - block) / hop)
            .map(|i| mean_square(&weighted[i * hop..i * hop + block]))
            .collect()
    };

    let absolute = lufs_to_mean_square(ABSOLUTE_GATE_LUFS);
    let above_absolute: Vec<f64> = blocks.into_iter().filter(|&z| z > absolute).collect();
    if above_absolute.is_empty() {
        return f64::NEG_INFINITY;
    }

    let relative_lufs = mean_square_to_lufs(average(&above_absolute)) + RELATIVE_GATE_LU;
    let relative = lufs_to_mean_square(relative_lufs);
    let gated: Vec<f64> = above_absolute.into_iter().filter(|&z| z > relative).collect();
    if gated.is_empty() {
        return f64::NEG_INFINITY;
    }

    mean_square_to_lufs(average(&gated))
}

/// Scale `samples` so their integrated loudness moves from `measured` to
/// `target` LUFS.
pub fn apply_gain(samples: &mut [f32], measured: f64, target: f64) {
    let gain = 10f64.powf((target - measured) / 20.0) as f32;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

fn mean_square(block: &[f64]) -> f64 {
    if block.is_empty() {
        return 0.0;
    }
    block.iter().map(|s| s * s).sum::<f64>() / block.len() as f64
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
