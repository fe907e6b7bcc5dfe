// Engine driver: accumulate, transform, tile, on an absolute column grid.
//
// Column `c` always covers samples `[c * hop, c * hop + kernel_len)` of the
// stream, no matter how the input was chunked or how many dispatches a buffer
// was split into. The accumulator's sample clock anchors every analysis
// window to that grid, so back-to-back windows emit contiguous column indices
// with no duplicated or missing frames. When the sample ring overruns a
// pending window the engine skips forward to the oldest column that is still
// fully resident and keeps going.

use crate::config::{ConfigError, EngineConfig};
use crate::dsp::accumulator::SampleAccumulator;
use crate::dsp::kernel::KernelBank;
use crate::dsp::MagnitudeRing;
use crate::dsp::transform::TransformExecutor;
use crate::dump::{self, DumpError};
use crate::render::colormap::Colormap;
use crate::render::tiles::TileRing;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

pub struct CqtEngine {
    config: EngineConfig,
    accumulator: SampleAccumulator,
    kernels: Arc<KernelBank>,
    executor: TransformExecutor,
    magnitudes: MagnitudeRing,
    tiles: TileRing,
    /// Contiguous analysis window assembled from completed blocks.
    window: Box<[f32]>,
    /// Dispatch output, copied into the magnitude ring afterwards.
    batch: Box<[f32]>,
    batch_frames: usize,
    /// Logical index of the next column to emit.
    next_column: u64,
    shutdown: Arc<AtomicBool>,
}

impl CqtEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_colormap(config, Colormap::default())
    }

    pub fn with_colormap(config: EngineConfig, colormap: Colormap) -> Result<Self, ConfigError> {
        config.validate()?;
        let kernels = Arc::new(KernelBank::new(&config.cqt)?);
        let shutdown = Arc::new(AtomicBool::new(false));
        let executor = TransformExecutor::parallel(
            Arc::clone(&kernels),
            config.cqt.hop_length,
            Arc::clone(&shutdown),
        )?;
        let batch_frames = executor.max_frames(config.analysis_buffer_size);
        let bins = kernels.num_bins();
        // hold at least the full display span and two dispatches of columns
        let source_frames = (config.tiles.tile_count * config.tiles.tile_width)
            .max(batch_frames * 2);
        let magnitudes = MagnitudeRing::new(bins, source_frames);
        let mut tiles = TileRing::new(&config.tiles, colormap);
        tiles.configure(bins, source_frames);
        debug!(
            bins,
            batch_frames,
            source_frames,
            block_size = config.block_size,
            max_blocks = config.max_blocks,
            "engine ready"
        );
        Ok(Self {
            accumulator: SampleAccumulator::new(config.block_size, config.max_blocks),
            kernels,
            executor,
            magnitudes,
            tiles,
            window: vec![0.0; config.analysis_buffer_size].into_boxed_slice(),
            batch: vec![0.0; batch_frames * bins].into_boxed_slice(),
            batch_frames,
            next_column: 0,
            shutdown,
            config,
        })
    }

    /// Feed a chunk of mono PCM in `[-1, 1]` at the configured sample rate,
    /// then run the transform for every analysis window that became ready.
    /// Returns the number of magnitude columns emitted.
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        if self.shutdown.load(Ordering::Relaxed) {
            return 0;
        }
        self.accumulator.add_samples(samples);
        self.drain_ready_windows()
    }

    fn drain_ready_windows(&mut self) -> usize {
        let hop = self.config.cqt.hop_length as u64;
        let window_len = self.window.len() as u64;
        let bins = self.kernels.num_bins();
        let mut emitted = 0;
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                self.tiles.reset();
                break;
            }
            // skip forward when the ring reclaimed part of the pending window
            if let Some(oldest) = self.accumulator.oldest_resident_start()
                && self.next_column * hop < oldest
            {
                let resumed = oldest.div_ceil(hop);
                warn!(
                    skipped = resumed - self.next_column,
                    overruns = self.accumulator.overrun_count(),
                    "analysis fell behind the sample ring; resuming at a later column"
                );
                self.next_column = resumed;
            }
            let start = self.next_column * hop;
            if start + window_len > self.accumulator.completed_through() {
                break;
            }
            if !self.accumulator.copy_completed(start, &mut self.window) {
                // reclaimed under us; the next drain re-resolves the skip target
                break;
            }
            let frames = self
                .executor
                .execute(&self.window, 0, self.batch_frames, &mut self.batch);
            if frames == 0 {
                break;
            }
            if self.shutdown.load(Ordering::Relaxed) {
                // discard the batch; ring indices were not advanced yet
                self.tiles.reset();
                break;
            }
            self.magnitudes
                .write_batch(self.next_column, &self.batch[..frames * bins]);
            self.tiles
                .update(&self.magnitudes, self.next_column, self.next_column + frames as u64);
            self.next_column += frames as u64;
            emitted += frames;
            trace!(frames, next_column = self.next_column, "emitted magnitude batch");
        }
        if emitted > 0 {
            self.accumulator.mark_processed();
        }
        emitted
    }

    /// Ask a running dispatch to wind down. In-flight cells finish harmlessly;
    /// their output is discarded and the tile ring rewinds.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Handle for signalling shutdown from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Back to a pristine engine: clock at zero, rings rewound, shutdown
    /// cleared. Backing memory is reused, not zeroed.
    pub fn reset(&mut self) {
        self.accumulator.reset();
        self.tiles.reset();
        self.next_column = 0;
        self.shutdown.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn kernels(&self) -> &KernelBank {
        &self.kernels
    }

    /// Columns emitted so far; column `columns_emitted() - 1` is the newest.
    #[inline]
    pub fn columns_emitted(&self) -> u64 {
        self.next_column
    }

    #[inline]
    pub fn magnitudes(&self) -> &MagnitudeRing {
        &self.magnitudes
    }

    #[inline]
    pub fn tiles(&self) -> &TileRing {
        &self.tiles
    }

    #[inline]
    pub fn overrun_count(&self) -> u64 {
        self.accumulator.overrun_count()
    }

    /// Write the resident magnitude columns as a raw diagnostic dump, oldest
    /// first: one row of `num_bins` values per column.
    pub fn dump_magnitudes<W: Write>(&self, writer: &mut W) -> Result<(), DumpError> {
        let bins = self.kernels.num_bins();
        let resident = self
            .next_column
            .min(self.magnitudes.capacity() as u64) as usize;
        let first = self.next_column - resident as u64;
        let mut values = Vec::with_capacity(resident * bins);
        for column in 0..resident {
            values.extend_from_slice(self.magnitudes.column(first + column as u64));
        }
        dump::write(writer, bins as u32, resident as u32, &values)
    }
}
