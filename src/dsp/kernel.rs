// Constant-Q kernel bank: log-spaced, Hamming-windowed complex exponentials.
//
// Rows are stored dense at `max_kernel_length` with zero padding past each
// bin's own length, so the transform can index every bin the same way. Each
// row is thresholded, then normalized to unit energy.

use crate::config::{ConfigError, CqtConfig};
use num_complex::Complex32;
use std::f32::consts::TAU;
use tracing::debug;

pub struct KernelBank {
    num_bins: usize,
    max_kernel_length: usize,
    q: f32,
    frequencies: Box<[f32]>,
    lengths: Box<[usize]>,
    coeffs: Box<[Complex32]>,
}

impl KernelBank {
    pub fn new(config: &CqtConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_bins = config.num_bins();
        let max_kernel_length = config.max_kernel_length();

        let frequencies: Box<[f32]> =
            (0..num_bins).map(|bin| config.bin_frequency(bin)).collect();
        let lengths: Box<[usize]> =
            (0..num_bins).map(|bin| config.kernel_length(bin)).collect();

        let mut coeffs = vec![Complex32::default(); num_bins * max_kernel_length];
        for bin in 0..num_bins {
            let row = &mut coeffs[bin * max_kernel_length..(bin + 1) * max_kernel_length];
            fill_row(
                row,
                frequencies[bin],
                lengths[bin],
                config.sample_rate,
                config.threshold,
            );
        }

        debug!(num_bins, max_kernel_length, q = config.q(), "generated constant-q kernel bank");
        Ok(Self {
            num_bins,
            max_kernel_length,
            q: config.q(),
            frequencies,
            lengths,
            coeffs: coeffs.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    #[inline]
    pub fn max_kernel_length(&self) -> usize {
        self.max_kernel_length
    }

    #[inline]
    pub fn q(&self) -> f32 {
        self.q
    }

    #[inline]
    pub fn frequency(&self, bin: usize) -> f32 {
        self.frequencies[bin]
    }

    #[inline]
    pub fn length(&self, bin: usize) -> usize {
        self.lengths[bin]
    }

    /// Full padded row for `bin`; entries past `length(bin)` are zero.
    #[inline]
    pub fn row(&self, bin: usize) -> &[Complex32] {
        &self.coeffs[bin * self.max_kernel_length..(bin + 1) * self.max_kernel_length]
    }

    /// Row truncated to the bin's own length; what the transform iterates.
    #[inline]
    pub fn taps(&self, bin: usize) -> &[Complex32] {
        &self.coeffs[bin * self.max_kernel_length..bin * self.max_kernel_length + self.lengths[bin]]
    }
}

fn fill_row(row: &mut [Complex32], frequency: f32, length: usize, sample_rate: f32, threshold: f32) {
    let window = cosine_window(length, &[0.54, -0.46]);
    for (n, &w) in window.iter().enumerate() {
        let phase = -TAU * frequency * n as f32 / sample_rate;
        let (sin, cos) = phase.sin_cos();
        let (re, im) = (w * cos, w * sin);
        if re.abs() > threshold || im.abs() > threshold {
            row[n] = Complex32::new(re, im);
        }
    }
    let energy: f64 = row.iter().map(|c| c.norm_sqr() as f64).sum();
    let norm = energy.sqrt() as f32;
    if norm > 0.0 {
        for c in &mut row[..length] {
            *c /= norm;
        }
    }
}

fn cosine_window(len: usize, c: &[f32]) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let s = TAU / (len - 1) as f32;
    (0..len)
        .map(|n| {
            let phi = n as f32 * s;
            c.iter()
                .enumerate()
                .fold(0.0, |a, (k, &v)| a + v * (phi * k as f32).cos())
        })
        .collect()
}
