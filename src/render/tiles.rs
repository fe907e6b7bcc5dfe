// Spectrogram tile ring: distributes magnitude columns across RGBA8 tiles.
//
// Tiles are reused in ring order as the logical column index grows; the
// renderer observes them through the published atomic write position and a
// wrap-aware x offset, so the writer never blocks on a reader. Only rows
// `[0, num_bins)` of a tile are ever touched.

use crate::config::TileConfig;
use crate::dsp::MagnitudeRing;
use crate::dsp::ring::Ring;
use crate::render::colormap::Colormap;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Rgba8(pub [u8; 4]);

pub struct SpectrogramTile {
    width: usize,
    pixels: Box<[Rgba8]>,
}

impl SpectrogramTile {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            pixels: vec![Rgba8::default(); width * height].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgba8 {
        self.pixels[y * self.width + x]
    }

    /// Raw bytes in row-major RGBA8 order, ready for texture upload.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

pub struct TileRing {
    tiles: Ring<SpectrogramTile>,
    tile_width: usize,
    tile_height: usize,
    num_bins: usize,
    source_capacity: usize,
    colormap: Colormap,
    /// Logical column index of the next write; published for readers.
    write_position: Arc<AtomicU64>,
}

impl TileRing {
    pub fn new(config: &TileConfig, colormap: Colormap) -> Self {
        let mut ring = Self {
            tiles: Ring::from_fn(config.tile_count, |_| SpectrogramTile::new(1, 1)),
            tile_width: config.tile_width,
            tile_height: 1,
            num_bins: 0,
            source_capacity: 0,
            colormap,
            write_position: Arc::new(AtomicU64::new(0)),
        };
        ring.configure(0, 0);
        ring
    }

    /// Bind to a magnitude source. Reallocates the tiles to
    /// `tile_width x next_power_of_two(num_bins)` and rewinds the ring.
    pub fn configure(&mut self, num_bins: usize, max_frames_in_source: usize) {
        self.tile_height = num_bins.next_power_of_two();
        self.num_bins = num_bins;
        self.source_capacity = max_frames_in_source;
        let (width, height) = (self.tile_width, self.tile_height);
        self.tiles = Ring::from_fn(self.tiles.capacity(), |_| SpectrogramTile::new(width, height));
        self.write_position.store(0, Ordering::Release);
        debug!(
            num_bins,
            tile_width = width,
            tile_height = height,
            tile_count = self.tiles.capacity(),
            "configured spectrogram tile ring"
        );
    }

    /// Shade the source columns `[start_frame, end_frame)` (interpreted modulo
    /// the source capacity) into the ring, walking from the current write
    /// position and advancing to the next tile whenever one fills.
    pub fn update(&mut self, source: &MagnitudeRing, start_frame: u64, end_frame: u64) {
        debug_assert_eq!(source.num_bins(), self.num_bins, "tile ring bound to a different source");
        if self.num_bins == 0 || end_frame <= start_frame {
            return;
        }
        let mut position = self.write_position.load(Ordering::Relaxed);
        for logical in start_frame..end_frame {
            let x = (position % self.tile_width as u64) as usize;
            let column = source.column(logical % self.source_capacity.max(1) as u64);
            let tile = self.tiles.current_write_cell();
            for (y, &magnitude) in column.iter().enumerate() {
                tile.pixels[y * tile.width + x] = Rgba8(self.colormap.shade(magnitude));
            }
            position += 1;
            if x + 1 == self.tile_width {
                self.tiles.advance_write();
            }
        }
        self.write_position.store(position, Ordering::Release);
    }

    /// Rewind the logical column counter; tile pixels are left as-is.
    pub fn reset(&mut self) {
        self.tiles.reset();
        self.write_position.store(0, Ordering::Release);
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles.capacity()
    }

    #[inline]
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    #[inline]
    pub fn tile_height(&self) -> usize {
        self.tile_height
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Next logical column to be written; columns `< write_position` are done.
    #[inline]
    pub fn write_position(&self) -> u64 {
        self.write_position.load(Ordering::Acquire)
    }

    /// Shared handle for a reader on another thread.
    pub fn write_position_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.write_position)
    }

    /// Physical tile holding logical column `column`.
    #[inline]
    pub fn tile_of(&self, column: u64) -> usize {
        ((column / self.tile_width as u64) % self.tiles.capacity() as u64) as usize
    }

    /// Direct access by physical tile index.
    pub fn tile(&self, index: usize) -> &SpectrogramTile {
        self.tiles.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINS: usize = 5;

    fn ring(width: usize, count: usize) -> (TileRing, MagnitudeRing) {
        let mut tiles = TileRing::new(
            &TileConfig {
                tile_width: width,
                tile_count: count,
            },
            Colormap::Hot,
        );
        let source = MagnitudeRing::new(BINS, 64);
        tiles.configure(BINS, source.capacity());
        (tiles, source)
    }

    // one loud bin per column makes columns distinguishable in pixel form
    fn write_marker_columns(source: &mut MagnitudeRing, first: u64, count: usize) {
        for i in 0..count {
            let mut column = vec![0.0f32; BINS];
            column[(first as usize + i) % BINS] = 10.0;
            source.write_batch(first + i as u64, &column);
        }
    }

    fn marker_row(tiles: &TileRing, physical: usize, x: usize) -> usize {
        (0..BINS)
            .find(|&y| tiles.tile(physical).pixel(x, y).0 == [255, 255, 255, 255])
            .expect("no marker pixel in column")
    }

    #[test]
    fn height_is_next_power_of_two() {
        let (tiles, _) = ring(8, 3);
        assert_eq!(tiles.tile_height(), 8);
        let mut other = TileRing::new(&TileConfig { tile_width: 8, tile_count: 2 }, Colormap::Hot);
        other.configure(129, 16);
        assert_eq!(other.tile_height(), 256);
    }

    #[test]
    fn columns_fill_tiles_in_ring_order() {
        let (mut tiles, mut source) = ring(4, 3);
        write_marker_columns(&mut source, 0, 10);
        tiles.update(&source, 0, 10);
        assert_eq!(tiles.write_position(), 10);
        // columns 0..4 tile 0, 4..8 tile 1, 8..10 tile 2
        assert_eq!(marker_row(&tiles, 0, 1), 1);
        assert_eq!(marker_row(&tiles, 1, 2), (4 + 2) % BINS);
        assert_eq!(marker_row(&tiles, 2, 1), (8 + 1) % BINS);
        assert_eq!(tiles.tile_of(9), 2);
    }

    #[test]
    fn wrap_reuses_oldest_tile_with_fresh_columns() {
        let (mut tiles, mut source) = ring(8, 3);
        let total = 3 * 8 + 3;
        write_marker_columns(&mut source, 0, total);
        tiles.update(&source, 0, total as u64);
        // the write wrapped back onto physical tile 0; its first columns now
        // hold the most recent data, not columns 0..3
        for x in 0..3 {
            assert_eq!(marker_row(&tiles, 0, x), (24 + x) % BINS);
        }
        // untouched columns of the reused tile still show the previous pass
        assert_eq!(marker_row(&tiles, 0, 5), 5 % BINS);
        // the other tiles hold their own passes
        assert_eq!(marker_row(&tiles, 1, 0), 8 % BINS);
        assert_eq!(marker_row(&tiles, 2, 7), 23 % BINS);
    }

    #[test]
    fn rows_above_num_bins_stay_untouched() {
        let (mut tiles, mut source) = ring(4, 2);
        write_marker_columns(&mut source, 0, 4);
        tiles.update(&source, 0, 4);
        for y in BINS..tiles.tile_height() {
            for x in 0..4 {
                assert_eq!(tiles.tile(0).pixel(x, y).0, [0, 0, 0, 0]);
            }
        }
    }

    #[test]
    fn reset_rewinds_but_keeps_pixels() {
        let (mut tiles, mut source) = ring(4, 2);
        write_marker_columns(&mut source, 0, 2);
        tiles.update(&source, 0, 2);
        let before = tiles.tile(0).pixel(0, 0);
        tiles.reset();
        assert_eq!(tiles.write_position(), 0);
        assert_eq!(tiles.tile(0).pixel(0, 0), before);
    }

    #[test]
    fn split_updates_continue_where_they_left_off() {
        let (mut tiles, mut source) = ring(4, 2);
        write_marker_columns(&mut source, 0, 6);
        tiles.update(&source, 0, 3);
        tiles.update(&source, 3, 6);
        assert_eq!(tiles.write_position(), 6);
        assert_eq!(marker_row(&tiles, 1, 1), 5 % BINS);
    }
}
