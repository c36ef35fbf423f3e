//! Bounded FIFO of samples between the fast and slow cores.
//!
//! Single producer (fast-core sampler), single consumer (slow-core state
//! machine). Overflow is not handled here: push reports `false` and the
//! fast path treats a full queue as the signal to stop feeding the
//! watchdog.

use std::collections::VecDeque;

use parking_lot::Mutex;

use bms_data::{Sample, QUEUE_LEN};

/// Bounded inter-core sample queue, capacity [`QUEUE_LEN`].
#[derive(Debug)]
pub struct IntercoreQueue {
    inner: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl Default for IntercoreQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IntercoreQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push one sample to the back. Returns `false` when the queue is
    /// full; never blocks or suspends.
    pub fn push(&self, sample: &Sample) -> bool {
        let mut q = self.inner.lock();
        if q.len() >= self.capacity {
            return false;
        }
        q.push_back(*sample);
        true
    }

    /// Pop the oldest sample. `None` when empty; never blocks.
    pub fn pop(&self) -> Option<Sample> {
        self.inner.lock().pop_front()
    }

    /// Free slots left before the queue is full. Zero means the next
    /// push fails, which the fast path reads as a reset signal.
    pub fn free_slots(&self) -> usize {
        self.capacity - self.inner.lock().len()
    }

    /// Samples currently waiting for the consumer.
    pub fn items_waiting(&self) -> usize {
        self.inner.lock().len()
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
    fn fifo_order_is_preserved() {
        let q = IntercoreQueue::with_capacity(16);
        for ts in 0..10 {
            assert!(q.push(&sample(ts)));
        }
        for ts in 0..10 {
            assert_eq!(q.pop().unwrap().timestamp, ts);
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn popped_sequence_is_prefix_under_interleaving() {
        let q = IntercoreQueue::with_capacity(8);
        let mut next_push = 0u64;
        let mut next_pop = 0u64;

        // Interleave pushes and pops; pops must come out in push order.
        for round in 0..50 {
            for _ in 0..(round % 4) {
                if q.push(&sample(next_push)) {
                    next_push += 1;
                }
            }
            for _ in 0..(round % 3) {
                if let Some(s) = q.pop() {
                    assert_eq!(s.timestamp, next_pop);
                    next_pop += 1;
                }
            }
        }
    }

    #[test]
    fn bounded_at_capacity() {
        let q = IntercoreQueue::new();
        for ts in 0..QUEUE_LEN as u64 {
            assert!(q.push(&sample(ts)));
        }
        assert_eq!(q.free_slots(), 0);
        assert!(!q.push(&sample(600)), "601st push must fail");

        assert_eq!(q.pop().unwrap().timestamp, 0);
        assert!(q.push(&sample(600)), "one pop frees one slot");
        assert_eq!(q.items_waiting(), QUEUE_LEN);
    }

    #[test]
    fn cross_thread_producer_consumer() {
        use std::sync::Arc;

        let q = Arc::new(IntercoreQueue::with_capacity(64));
        let producer_q = Arc::clone(&q);
        let producer = std::thread::spawn(move || {
            let mut pushed = 0u64;
            while pushed < 500 {
                if producer_q.push(&sample(pushed)) {
                    pushed += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut expect = 0u64;
        while expect < 500 {
            if let Some(s) = q.pop() {
                assert_eq!(s.timestamp, expect);
                expect += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
