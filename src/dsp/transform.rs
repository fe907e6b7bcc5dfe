// Data-parallel constant-Q transform executor.
//
// Every (bin, frame) cell of the output grid is independent: a frame's start
// offset is `(frame + frame_offset) * hop_length`, and the cell is the
// magnitude of the windowed correlation of the audio against that bin's
// kernel. Work is dispatched over a thread pool in frame groups; the serial
// schedule computes every cell with the same summation order, so both paths
// produce bit-identical output.

use crate::config::ConfigError;
use crate::dsp::kernel::KernelBank;
use crate::util::{load_complex_simd, load_f32_simd};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Frames per dispatched work tile; bins advance in SIMD-width runs inside.
pub const WORK_TILE_FRAMES: usize = 8;

pub struct TransformExecutor {
    kernels: Arc<KernelBank>,
    hop_length: usize,
    pool: Option<rayon::ThreadPool>,
    cancel: Arc<AtomicBool>,
}

impl TransformExecutor {
    /// Executor backed by its own named thread pool.
    pub fn parallel(
        kernels: Arc<KernelBank>,
        hop_length: usize,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, ConfigError> {
        assert!(hop_length > 0, "hop_length must be positive");
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("cqt-transform-{i}"))
            .build()?;
        Ok(Self {
            kernels,
            hop_length,
            pool: Some(pool),
            cancel,
        })
    }

    /// Single-threaded schedule; output is bit-identical to the parallel one.
    pub fn serial(kernels: Arc<KernelBank>, hop_length: usize, cancel: Arc<AtomicBool>) -> Self {
        assert!(hop_length > 0, "hop_length must be positive");
        Self {
            kernels,
            hop_length,
            pool: None,
            cancel,
        }
    }

    #[inline]
    pub fn kernels(&self) -> &KernelBank {
        &self.kernels
    }

    #[inline]
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// How many whole frames a window of `audio_len` samples supports,
    /// counting from the window start: `(audio_len - max_kernel) / hop + 1`.
    pub fn max_frames(&self, audio_len: usize) -> usize {
        let max_kernel = self.kernels.max_kernel_length();
        if audio_len < max_kernel {
            return 0;
        }
        (audio_len - max_kernel) / self.hop_length + 1
    }

    /// Correlate `audio` against the bank, writing one magnitude row per frame
    /// into `out` (row-major by frame, stride `num_bins`, no padding).
    /// Requests past the end of the window are clamped; the produced frame
    /// count is returned. A window shorter than the longest kernel yields 0.
    pub fn execute(
        &self,
        audio: &[f32],
        frame_offset: usize,
        num_frames: usize,
        out: &mut [f32],
    ) -> usize {
        let bins = self.kernels.num_bins();
        let available = self.max_frames(audio.len()).saturating_sub(frame_offset);
        let frames = num_frames.min(available);
        if frames == 0 || bins == 0 {
            return 0;
        }
        assert!(
            out.len() >= frames * bins,
            "output buffer holds {} cells, need {}",
            out.len(),
            frames * bins
        );
        let out = &mut out[..frames * bins];
        match &self.pool {
            Some(pool) => pool.install(|| {
                out.par_chunks_mut(bins * WORK_TILE_FRAMES)
                    .enumerate()
                    .for_each(|(tile, chunk)| {
                        if self.cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        self.fill_frames(audio, frame_offset + tile * WORK_TILE_FRAMES, chunk);
                    });
            }),
            None => {
                for (tile, chunk) in out.chunks_mut(bins * WORK_TILE_FRAMES).enumerate() {
                    if self.cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    self.fill_frames(audio, frame_offset + tile * WORK_TILE_FRAMES, chunk);
                }
            }
        }
        trace!(frames, frame_offset, "transform dispatch complete");
        frames
    }

    // Fill whole rows for the frames starting at `first_frame`.
    fn fill_frames(&self, audio: &[f32], first_frame: usize, chunk: &mut [f32]) {
        let bins = self.kernels.num_bins();
        for (row_idx, row) in chunk.chunks_mut(bins).enumerate() {
            let start = (first_frame + row_idx) * self.hop_length;
            for (bin, cell) in row.iter_mut().enumerate() {
                *cell = correlate(audio, start, self.kernels.taps(bin));
            }
        }
    }
}

// Magnitude of the complex dot product of the audio window at `start` with a
// kernel row. Stops at the end of the audio, which zero-pads the tail.
#[inline]
fn correlate(audio: &[f32], start: usize, taps: &[num_complex::Complex32]) -> f32 {
    let len = taps.len().min(audio.len().saturating_sub(start));
    let taps = &taps[..len];
    let mut re = wide::f32x8::splat(0.0);
    let mut im = wide::f32x8::splat(0.0);
    let mut n = 0;
    while n + 8 <= len {
        let a = load_f32_simd(audio, start + n);
        let (k_re, k_im) = load_complex_simd(taps, n);
        re = a.mul_add(k_re, re);
        im = a.mul_add(k_im, im);
        n += 8;
    }
    let (mut sum_re, mut sum_im) = (re.reduce_add(), im.reduce_add());
    for (i, c) in taps.iter().enumerate().skip(n) {
        sum_re += audio[start + i] * c.re;
        sum_im += audio[start + i] * c.im;
    }
    (sum_re * sum_re + sum_im * sum_im).sqrt()
}
