// Streaming sample accumulator over a contiguous block arena.
//
// Incoming chunks of any size are copied into fixed-size blocks laid out in a
// single allocation of `max_blocks * block_size` samples. Completed blocks form
// a contiguous valid span in ring order; when the writer catches up with the
// span's tail the oldest block is discarded rather than blocking the stream.

use tracing::trace;

pub struct SampleAccumulator {
    samples: Box<[f32]>,
    block_size: usize,
    max_blocks: usize,
    write_block: usize,
    write_offset: usize,
    first_valid: Option<usize>,
    last_valid: Option<usize>,
    first_unprocessed: Option<usize>,
    /// Logical start of the completed block in each cell; None until completed
    /// or after the cell has been reclaimed.
    block_starts: Box<[Option<u64>]>,
    /// Monotonic sample clock: total samples ever accepted.
    consumed: u64,
    completed_blocks: u64,
    overruns: u64,
}

impl SampleAccumulator {
    pub fn new(block_size: usize, max_blocks: usize) -> Self {
        assert!(block_size > 0, "block_size must be positive");
        assert!(max_blocks > 0, "max_blocks must be positive");
        Self {
            samples: vec![0.0; block_size * max_blocks].into_boxed_slice(),
            block_size,
            max_blocks,
            write_block: 0,
            write_offset: 0,
            first_valid: None,
            last_valid: None,
            first_unprocessed: None,
            block_starts: vec![None; max_blocks].into_boxed_slice(),
            consumed: 0,
            completed_blocks: 0,
            overruns: 0,
        }
    }

    /// Copy a chunk of mono samples into the ring. Returns the number of
    /// blocks completed during this call.
    pub fn add_samples(&mut self, src: &[f32]) -> usize {
        let mut completed = 0;
        let mut remaining = src;
        while !remaining.is_empty() {
            let space = self.block_size - self.write_offset;
            let take = space.min(remaining.len());
            let base = self.write_block * self.block_size + self.write_offset;
            self.samples[base..base + take].copy_from_slice(&remaining[..take]);
            self.write_offset += take;
            remaining = &remaining[take..];
            if self.write_offset == self.block_size {
                self.complete_block();
                completed += 1;
            }
        }
        self.consumed += src.len() as u64;
        completed
    }

    fn complete_block(&mut self) {
        let block = self.write_block;
        self.block_starts[block] = Some(self.completed_blocks * self.block_size as u64);
        self.completed_blocks += 1;
        self.last_valid = Some(block);
        if self.first_valid.is_none() {
            self.first_valid = Some(block);
        }
        if self.first_unprocessed.is_none() {
            self.first_unprocessed = Some(block);
        }
        self.write_block = (block + 1) % self.max_blocks;
        self.write_offset = 0;
        if self.first_valid == Some(self.write_block) {
            self.discard_oldest();
            self.overruns += 1;
            trace!(block = self.write_block, overruns = self.overruns, "overran oldest block");
        }
    }

    // Drop the oldest valid block (the writer is about to reuse its cell).
    fn discard_oldest(&mut self) {
        let Some(oldest) = self.first_valid else {
            return;
        };
        self.block_starts[oldest] = None;
        let next = (oldest + 1) % self.max_blocks;
        if self.first_unprocessed == Some(oldest) {
            self.first_unprocessed = if self.last_valid == Some(oldest) {
                None
            } else {
                Some(next)
            };
        }
        if self.last_valid == Some(oldest) {
            self.first_valid = None;
            self.last_valid = None;
        } else {
            self.first_valid = Some(next);
        }
    }

    /// Everything completed so far has been consumed downstream. Idempotent.
    pub fn mark_processed(&mut self) {
        self.first_unprocessed = None;
    }

    /// Indices and counters back to the initial state; sample memory untouched.
    pub fn reset(&mut self) {
        self.write_block = 0;
        self.write_offset = 0;
        self.first_valid = None;
        self.last_valid = None;
        self.first_unprocessed = None;
        self.block_starts.fill(None);
        self.consumed = 0;
        self.completed_blocks = 0;
        self.overruns = 0;
    }

    /// Direct read of a physical ring cell. Out-of-range indices are a caller bug.
    pub fn get_block(&self, index: usize) -> &[f32] {
        assert!(
            index < self.max_blocks,
            "block index {index} out of range ({})",
            self.max_blocks
        );
        &self.samples[index * self.block_size..(index + 1) * self.block_size]
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    #[inline]
    pub fn first_valid(&self) -> Option<usize> {
        self.first_valid
    }

    #[inline]
    pub fn last_valid(&self) -> Option<usize> {
        self.last_valid
    }

    #[inline]
    pub fn first_unprocessed(&self) -> Option<usize> {
        self.first_unprocessed
    }

    #[inline]
    pub fn write_block(&self) -> usize {
        self.write_block
    }

    #[inline]
    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    /// Total samples ever accepted, including any not yet in a completed block.
    #[inline]
    pub fn samples_consumed(&self) -> u64 {
        self.consumed
    }

    /// Logical sample index up to which completed blocks extend.
    #[inline]
    pub fn completed_through(&self) -> u64 {
        self.completed_blocks * self.block_size as u64
    }

    #[inline]
    pub fn overrun_count(&self) -> u64 {
        self.overruns
    }

    /// Logical start of the oldest block still resident, if any.
    pub fn oldest_resident_start(&self) -> Option<u64> {
        self.first_valid.and_then(|cell| self.block_starts[cell])
    }

    /// Assemble `dst.len()` samples beginning at logical index `start` from
    /// completed blocks, following ring wrap. Returns false when any part of
    /// the range is not resident (reclaimed already, or not yet completed).
    pub fn copy_completed(&self, start: u64, dst: &mut [f32]) -> bool {
        if dst.is_empty() {
            return true;
        }
        if start + dst.len() as u64 > self.completed_through() {
            return false;
        }
        let block_size = self.block_size as u64;
        let mut pos = start;
        let mut written = 0;
        while written < dst.len() {
            let block_start = pos - pos % block_size;
            let cell = ((pos / block_size) % self.max_blocks as u64) as usize;
            if self.block_starts[cell] != Some(block_start) {
                return false;
            }
            let offset = (pos - block_start) as usize;
            let take = (self.block_size - offset).min(dst.len() - written);
            let base = cell * self.block_size + offset;
            dst[written..written + take].copy_from_slice(&self.samples[base..base + take]);
            written += take;
            pos += take as u64;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    // Valid span and write indices stay coherent after arbitrary call sequences.
    fn check_invariants(acc: &SampleAccumulator) {
        assert!(acc.write_offset() < acc.block_size());
        match (acc.first_valid(), acc.last_valid()) {
            (Some(first), Some(last)) => {
                let span_len = (last + acc.max_blocks() - first) % acc.max_blocks() + 1;
                assert!(span_len <= acc.max_blocks());
                if let Some(unprocessed) = acc.first_unprocessed() {
                    let offset = (unprocessed + acc.max_blocks() - first) % acc.max_blocks();
                    assert!(offset < span_len, "first_unprocessed outside valid span");
                }
            }
            (None, None) => assert_eq!(acc.first_unprocessed(), None),
            (first, last) => panic!("half-empty valid span: {first:?}..{last:?}"),
        }
    }

    #[test]
    fn stream_is_preserved_regardless_of_chunking() {
        let signal: Vec<f32> = (0..10_000).map(|i| (i as f32 * 0.37).sin()).collect();
        for chunk_sizes in [vec![1usize; 0], vec![1; 10_000], vec![7, 128, 2048, 3, 977]] {
            let mut acc = SampleAccumulator::new(256, 64);
            if chunk_sizes.is_empty() {
                acc.add_samples(&signal);
            } else {
                let mut fed = 0;
                let mut i = 0;
                while fed < signal.len() {
                    let take = chunk_sizes[i % chunk_sizes.len()].min(signal.len() - fed);
                    acc.add_samples(&signal[fed..fed + take]);
                    fed += take;
                    i += 1;
                }
            }
            check_invariants(&acc);
            let whole_blocks = signal.len() / 256;
            let mut restored = vec![0.0; whole_blocks * 256];
            assert!(acc.copy_completed(0, &mut restored));
            assert_eq!(restored, signal[..whole_blocks * 256]);
        }
    }

    #[test]
    fn exact_fill_lands_on_expected_blocks() {
        let mut acc = SampleAccumulator::new(2048, 128);
        let completed = acc.add_samples(&ramp(32_768));
        assert_eq!(completed, 16);
        assert_eq!(acc.last_valid(), Some(15));
        assert_eq!(acc.first_valid(), Some(0));
        assert_eq!(acc.get_block(7)[0], 14_336.0 / 32_768.0);
        assert_eq!(acc.get_block(7)[2047], 16_383.0 / 32_768.0);
        check_invariants(&acc);
    }

    #[test]
    fn full_ring_overwrites_oldest() {
        let mut acc = SampleAccumulator::new(2048, 4);
        let signal: Vec<f32> = (0..5 * 2048).map(|i| i as f32).collect();
        acc.add_samples(&signal);
        check_invariants(&acc);
        assert_ne!(acc.first_valid(), Some(0), "oldest block should be discarded");
        assert_eq!(acc.overrun_count(), 2);
        // cell 0 was reused for the fifth block
        assert_eq!(acc.get_block(0)[0], 8192.0);
        assert_eq!(acc.get_block(0)[2047], 10_239.0);
        // the overrun range is no longer readable
        let mut buf = vec![0.0; 2048];
        assert!(!acc.copy_completed(0, &mut buf));
        assert!(acc.copy_completed(4 * 2048, &mut buf));
        assert_eq!(buf[0], 8192.0);
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let mut acc = SampleAccumulator::new(64, 8);
        acc.add_samples(&vec![0.5; 200]);
        assert_eq!(acc.first_unprocessed(), Some(0));
        acc.mark_processed();
        let snapshot = (acc.first_valid(), acc.last_valid(), acc.first_unprocessed());
        acc.mark_processed();
        assert_eq!(
            (acc.first_valid(), acc.last_valid(), acc.first_unprocessed()),
            snapshot
        );
        assert_eq!(acc.first_unprocessed(), None);
        // the next completed block re-arms it
        acc.add_samples(&vec![0.5; 64]);
        assert_eq!(acc.first_unprocessed(), Some(3));
    }

    #[test]
    fn sample_clock_counts_partial_blocks() {
        let mut acc = SampleAccumulator::new(128, 4);
        acc.add_samples(&vec![0.0; 100]);
        assert_eq!(acc.samples_consumed(), 100);
        assert_eq!(acc.completed_through(), 0);
        acc.add_samples(&vec![0.0; 100]);
        assert_eq!(acc.samples_consumed(), 200);
        assert_eq!(acc.completed_through(), 128);
    }

    #[test]
    fn copy_refuses_incomplete_tail() {
        let mut acc = SampleAccumulator::new(128, 4);
        acc.add_samples(&vec![1.0; 130]);
        let mut buf = vec![0.0; 130];
        assert!(!acc.copy_completed(0, &mut buf), "tail block is not complete");
        let mut head = vec![0.0; 128];
        assert!(acc.copy_completed(0, &mut head));
    }

    #[test]
    fn reset_restores_initial_indices() {
        let mut acc = SampleAccumulator::new(64, 4);
        acc.add_samples(&vec![1.0; 500]);
        acc.reset();
        assert_eq!(acc.write_block(), 0);
        assert_eq!(acc.write_offset(), 0);
        assert_eq!(acc.first_valid(), None);
        assert_eq!(acc.samples_consumed(), 0);
        assert_eq!(acc.completed_through(), 0);
        check_invariants(&acc);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_block_panics() {
        let acc = SampleAccumulator::new(64, 4);
        acc.get_block(4);
    }
}
