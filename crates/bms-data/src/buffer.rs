//! Slow-side staging ring for samples drained from the inter-core queue.
//!
//! The ring is owned by the slow-core task; the aggregator consumes from
//! it in exact 1-second chunks, zeroing consumed slots before advancing
//! the head.

use crate::Sample;

/// Ring buffer staging raw samples for one aggregation pass.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    head: usize,
    count: usize,
}

impl SampleBuffer {
    /// Allocate a ring with the given capacity, all slots zeroed.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![Sample::default(); capacity],
            head: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == self.samples.len()
    }

    /// Buffer index for an offset from the head, wrapping at capacity.
    /// Offset `count` is the slot right behind the last valid sample.
    fn index_of(&self, offset: usize) -> usize {
        (self.head + offset) % self.samples.len()
    }

    /// Sample at `offset` from the head. Offsets at or past `count` read
    /// whatever the slot holds (zeroed remains of consumed samples).
    pub fn get(&self, offset: usize) -> &Sample {
        &self.samples[self.index_of(offset)]
    }

    /// Append one sample behind the last valid entry. Returns `false`
    /// when the ring is full; the caller leaves the rest in the queue.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        let idx = self.index_of(self.count);
        self.samples[idx] = sample;
        self.count += 1;
        true
    }

    /// Zero the first `n` valid samples without consuming them.
    pub fn zero_range(&mut self, n: usize) {
        let n = n.min(self.count);
        for offset in 0..n {
            let idx = self.index_of(offset);
            self.samples[idx].zero();
        }
    }

    /// Advance the head past `n` samples. Call after `zero_range` so the
    /// consumed slots cannot be re-processed.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.count);
        self.head = self.index_of(n);
        self.count -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64) -> Sample {
        Sample {
            timestamp: ts,
            ..Sample::default()
        }
    }

    #[test]
    fn push_until_full() {
        let mut buf = SampleBuffer::with_capacity(3);
        assert!(buf.push(sample(1)));
        assert!(buf.push(sample(2)));
        assert!(buf.push(sample(3)));
        assert!(!buf.push(sample(4)));
        assert_eq!(buf.count(), 3);
    }

    #[test]
    fn consume_wraps_head() {
        let mut buf = SampleBuffer::with_capacity(4);
        for ts in 1..=4 {
            buf.push(sample(ts));
        }
        buf.zero_range(3);
        buf.consume(3);
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.get(0).timestamp, 4);

        // Freed slots are reusable and ordering is preserved across the wrap.
        assert!(buf.push(sample(5)));
        assert!(buf.push(sample(6)));
        assert_eq!(buf.get(0).timestamp, 4);
        assert_eq!(buf.get(1).timestamp, 5);
        assert_eq!(buf.get(2).timestamp, 6);
    }

    #[test]
    fn zero_range_clears_in_place() {
        let mut buf = SampleBuffer::with_capacity(2);
        buf.push(Sample {
            cell_v: [1.0; crate::NUM_CELLS],
            pack_v: 5.0,
            pack_i: 1.0,
            timestamp: 42,
        });
        buf.zero_range(1);
        assert_eq!(*buf.get(0), Sample::default());
        assert_eq!(buf.count(), 1);
    }
}
