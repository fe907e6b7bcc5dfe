// Engine configuration and the constant-Q quantities derived from it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Default sample rate (Hz); callers normally pass the rate of their stream.
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;

// Amplitude floor for kernel coefficients, roughly -45 dB.
pub const DEFAULT_KERNEL_THRESHOLD: f32 = 0.0054;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample_rate must be positive and finite, got {0}")]
    SampleRate(f32),
    #[error("fmin must be positive and finite, got {0}")]
    Fmin(f32),
    #[error("fmax {fmax} must lie in ({fmin}, {nyquist}]")]
    Fmax { fmax: f32, fmin: f32, nyquist: f32 },
    #[error("bins_per_octave must be positive")]
    BinsPerOctave,
    #[error("hop_length must be positive")]
    HopLength,
    #[error("window_scale must be positive and finite, got {0}")]
    WindowScale(f32),
    #[error("block_size must be a power of two, got {0}")]
    BlockSize(usize),
    #[error("max_blocks must be positive")]
    MaxBlocks,
    #[error("analysis_buffer_size {size} is shorter than the longest kernel ({min})")]
    AnalysisWindowTooSmall { size: usize, min: usize },
    #[error("analysis_buffer_size {size} exceeds the accumulator ring ({capacity})")]
    AnalysisWindowTooLarge { size: usize, capacity: usize },
    #[error("tile_width must be a power of two, got {0}")]
    TileWidth(usize),
    #[error("tile_count must be at least 2, got {0}")]
    TileCount(usize),
    #[error("failed to build transform thread pool: {0}")]
    Dispatch(#[from] rayon::ThreadPoolBuildError),
}

/// Constant-Q analysis parameters, fixed at engine creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CqtConfig {
    pub sample_rate: f32,
    pub fmin: f32,
    pub fmax: f32,
    pub bins_per_octave: u32,
    /// Samples between successive columns; independent of the analysis buffer size.
    pub hop_length: usize,
    pub window_scale: f32,
    pub threshold: f32,
}

impl Default for CqtConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fmin: 32.7,
            fmax: DEFAULT_SAMPLE_RATE / 2.0,
            bins_per_octave: 12,
            hop_length: 512,
            window_scale: 1.0,
            threshold: DEFAULT_KERNEL_THRESHOLD,
        }
    }
}

impl CqtConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(self.fmin.is_finite() && self.fmin > 0.0) {
            return Err(ConfigError::Fmin(self.fmin));
        }
        let nyquist = self.nyquist();
        if !self.fmax.is_finite() || self.fmax > nyquist || self.fmax <= self.fmin {
            return Err(ConfigError::Fmax {
                fmax: self.fmax,
                fmin: self.fmin,
                nyquist,
            });
        }
        if self.bins_per_octave == 0 {
            return Err(ConfigError::BinsPerOctave);
        }
        if self.hop_length == 0 {
            return Err(ConfigError::HopLength);
        }
        if !(self.window_scale.is_finite() && self.window_scale > 0.0) {
            return Err(ConfigError::WindowScale(self.window_scale));
        }
        Ok(())
    }

    #[inline]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate / 2.0
    }

    /// Shared quality factor: `1 / (2^(1/bins_per_octave) - 1)`.
    pub fn q(&self) -> f32 {
        1.0 / ((1.0 / self.bins_per_octave as f32).exp2() - 1.0)
    }

    pub fn num_bins(&self) -> usize {
        (self.bins_per_octave as f32 * (self.fmax / self.fmin).log2()).ceil() as usize
    }

    /// Center frequency of `bin`: geometric spacing up from `fmin`.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        self.fmin * (bin as f32 / self.bins_per_octave as f32).exp2()
    }

    /// Kernel length of `bin`; inversely proportional to its center frequency.
    pub fn kernel_length(&self, bin: usize) -> usize {
        (self.q() * self.sample_rate * self.window_scale / self.bin_frequency(bin)).ceil() as usize
    }

    /// The longest kernel is always the lowest bin's.
    pub fn max_kernel_length(&self) -> usize {
        self.kernel_length(0)
    }
}

/// Spectrogram tile geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileConfig {
    /// Columns per tile; power of two.
    pub tile_width: usize,
    pub tile_count: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_width: 1024,
            tile_count: 4,
        }
    }
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tile_width.is_power_of_two() {
            return Err(ConfigError::TileWidth(self.tile_width));
        }
        if self.tile_count < 2 {
            return Err(ConfigError::TileCount(self.tile_count));
        }
        Ok(())
    }
}

/// Everything the engine needs at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cqt: CqtConfig,
    /// Accumulator cell size in samples; power of two.
    pub block_size: usize,
    /// Accumulator ring capacity in blocks.
    pub max_blocks: usize,
    /// Contiguous window length handed to the transform per dispatch.
    pub analysis_buffer_size: usize,
    pub tiles: TileConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cqt: CqtConfig::default(),
            block_size: 2048,
            max_blocks: 128,
            analysis_buffer_size: 32_768,
            tiles: TileConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cqt.validate()?;
        self.tiles.validate()?;
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        if self.max_blocks == 0 {
            return Err(ConfigError::MaxBlocks);
        }
        let min = self.cqt.max_kernel_length();
        if self.analysis_buffer_size < min {
            return Err(ConfigError::AnalysisWindowTooSmall {
                size: self.analysis_buffer_size,
                min,
            });
        }
        let capacity = self.block_size * self.max_blocks;
        if self.analysis_buffer_size > capacity {
            return Err(ConfigError::AnalysisWindowTooLarge {
                size: self.analysis_buffer_size,
                capacity,
            });
        }
        Ok(())
    }
}
