pub mod accumulator;
pub mod kernel;
pub mod ring;
pub mod transform;

/// Circular store of magnitude columns, shared between the transform executor
/// that fills it and the tile ring that shades it. Columns are addressed by
/// their monotonically increasing logical index, mapped modulo the capacity.
pub struct MagnitudeRing {
    values: Box<[f32]>,
    num_bins: usize,
    capacity: usize,
}

impl MagnitudeRing {
    pub fn new(num_bins: usize, capacity: usize) -> Self {
        assert!(num_bins > 0, "num_bins must be positive");
        assert!(capacity > 0, "capacity must be positive");
        Self {
            values: vec![0.0; num_bins * capacity].into_boxed_slice(),
            num_bins,
            capacity,
        }
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Capacity in frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn column(&self, logical: u64) -> &[f32] {
        let cell = (logical % self.capacity as u64) as usize;
        &self.values[cell * self.num_bins..(cell + 1) * self.num_bins]
    }

    /// Store a row-major batch beginning at logical column `first`, following
    /// ring wrap. `batch` must be a whole number of columns.
    pub fn write_batch(&mut self, first: u64, batch: &[f32]) {
        assert!(
            batch.len() % self.num_bins == 0,
            "batch of {} values is not a whole number of {}-bin columns",
            batch.len(),
            self.num_bins
        );
        for (i, column) in batch.chunks_exact(self.num_bins).enumerate() {
            let cell = ((first + i as u64) % self.capacity as u64) as usize;
            self.values[cell * self.num_bins..(cell + 1) * self.num_bins].copy_from_slice(column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_ring_wraps_logical_columns() {
        let mut ring = MagnitudeRing::new(4, 8);
        let batch: Vec<f32> = (0..3 * 4).map(|v| v as f32).collect();
        ring.write_batch(6, &batch);
        assert_eq!(ring.column(6), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(ring.column(7), &[4.0, 5.0, 6.0, 7.0]);
        // column 8 wrapped onto cell 0
        assert_eq!(ring.column(8), &[8.0, 9.0, 10.0, 11.0]);
        assert_eq!(ring.column(0), ring.column(8));
    }

    #[test]
    #[should_panic(expected = "whole number")]
    fn ragged_batch_is_a_caller_bug() {
        let mut ring = MagnitudeRing::new(4, 8);
        ring.write_batch(0, &[0.0; 6]);
    }
}
