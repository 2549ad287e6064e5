//! Per-thread single-producer/single-consumer byte ring buffer.
//!
//! This is the producer's staging area: one instance per (logger, producing
//! thread) pair. Cursors are free-running `usize` counters masked only at
//! index time, which (unlike the original's mod-capacity cursors) lets the
//! buffer hold the full `capacity` bytes rather than `capacity - 1`; see
//! DESIGN.md for the rationale.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

const SPIN_LIMIT: u32 = 1_000;

/// Fixed-size circular byte buffer with SPSC semantics.
///
/// Exactly one thread may call [`RingBuffer::produce`] and exactly one
/// (possibly different) thread may call [`RingBuffer::consume`]; mixing
/// callers for either role is undefined behavior the type does not guard
/// against at runtime, matching the contract in the spec.
pub struct RingBuffer {
    buffer: UnsafeCell<Box<[u8]>>,
    mask: usize,
    capacity: usize,
    producer_pos: AtomicUsize,
    consumer_pos: AtomicUsize,
}

// SAFETY: `buffer` is only ever written by the single producer (in the byte
// range between `consumer_pos` and `producer_pos`) and only ever read by the
// single consumer (in the range already published by the producer). The
// atomics establish the happens-before edges that make those ranges disjoint
// at any instant.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Allocates a buffer of at least `capacity` bytes, rounded up to the
    /// next power of two (the spec permits rejecting non-power-of-two sizes
    /// or rounding up; this implementation rounds up).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        RingBuffer {
            buffer: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            mask: capacity - 1,
            capacity,
            producer_pos: AtomicUsize::new(0),
            consumer_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the number of bytes available to the consumer. Issues an
    /// acquire fence (via the atomic load) before reading either cursor.
    pub fn used_size(&self) -> usize {
        let produced = self.producer_pos.load(Ordering::Acquire);
        let consumed = self.consumer_pos.load(Ordering::Acquire);
        produced.wrapping_sub(consumed)
    }

    pub fn unused_size(&self) -> usize {
        self.capacity - self.used_size()
    }

    /// Resets both cursors to zero. Only legal when no producer or consumer
    /// is concurrently using the buffer.
    pub fn reset(&self) {
        self.producer_pos.store(0, Ordering::Relaxed);
        self.consumer_pos.store(0, Ordering::Relaxed);
    }

    /// Copies all of `src` into the buffer, busy-spinning while there is not
    /// enough free space. A `src` longer than `capacity` is a contract
    /// violation: debug builds assert, release builds truncate (see §7).
    pub fn produce(&self, src: &[u8]) {
        debug_assert!(
            src.len() <= self.capacity,
            "produce: {} bytes exceeds ring buffer capacity {}",
            src.len(),
            self.capacity
        );
        let n = src.len().min(self.capacity);
        let src = &src[..n];

        let mut spins: u32 = 0;
        while self.unused_size() < n {
            spins = spins.saturating_add(1);
            if spins > SPIN_LIMIT {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }

        let producer_pos = self.producer_pos.load(Ordering::Relaxed);
        let start = producer_pos & self.mask;
        let head = n.min(self.capacity - start);

        // SAFETY: the wait above guarantees `n` bytes starting at `start`
        // are not in the range the consumer may still read.
        let buffer = unsafe { &mut *self.buffer.get() };
        buffer[start..start + head].copy_from_slice(&src[..head]);
        if head < n {
            buffer[..n - head].copy_from_slice(&src[head..]);
        }

        self.producer_pos
            .store(producer_pos.wrapping_add(n), Ordering::Release);
    }

    /// Copies up to `dst.len()` bytes into `dst`, never blocking. Returns the
    /// number of bytes copied and advances the consumer cursor by that much.
    pub fn consume(&self, dst: &mut [u8]) -> usize {
        let n = self.used_size().min(dst.len());
        if n == 0 {
            return 0;
        }

        let consumer_pos = self.consumer_pos.load(Ordering::Relaxed);
        let start = consumer_pos & self.mask;
        let head = n.min(self.capacity - start);

        // SAFETY: `n` bytes starting at `start` were published by the
        // producer (observed via the acquire load inside `used_size`).
        let buffer = unsafe { &*self.buffer.get() };
        dst[..head].copy_from_slice(&buffer[start..start + head]);
        if head < n {
            dst[head..n].copy_from_slice(&buffer[..n - head]);
        }

        self.consumer_pos
            .store(consumer_pos.wrapping_add(n), Ordering::Release);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_seed_scenario_wraps_correctly() {
        let rb = RingBuffer::new(8);
        rb.produce(b"abcdef");
        let mut out = [0u8; 4];
        assert_eq!(rb.consume(&mut out), 4);
        assert_eq!(&out, b"abcd");

        rb.produce(b"ghijk");
        let mut out2 = [0u8; 7];
        assert_eq!(rb.consume(&mut out2), 7);
        assert_eq!(&out2, b"efghijk");
    }

    #[test]
    fn used_plus_unused_equals_capacity() {
        let rb = RingBuffer::new(16);
        assert_eq!(rb.used_size() + rb.unused_size(), rb.capacity());
        rb.produce(b"0123456789");
        assert_eq!(rb.used_size() + rb.unused_size(), rb.capacity());
        let mut buf = [0u8; 3];
        rb.consume(&mut buf);
        assert_eq!(rb.used_size() + rb.unused_size(), rb.capacity());
    }

    #[test]
    fn non_power_of_two_capacity_rounds_up() {
        let rb = RingBuffer::new(10);
        assert_eq!(rb.capacity(), 16);
    }

    #[test]
    fn consume_never_returns_more_than_requested() {
        let rb = RingBuffer::new(8);
        rb.produce(b"abc");
        let mut dst = [0u8; 1];
        assert_eq!(rb.consume(&mut dst), 1);
        assert_eq!(&dst, b"a");
    }

    #[test]
    fn reset_zeroes_cursors() {
        let rb = RingBuffer::new(8);
        rb.produce(b"abc");
        rb.reset();
        assert_eq!(rb.used_size(), 0);
        assert_eq!(rb.unused_size(), rb.capacity());
    }

    #[test]
    fn two_threads_preserve_fifo_order() {
        use std::sync::Arc;
        let rb = Arc::new(RingBuffer::new(64));
        let producer_rb = rb.clone();
        let total: usize = 10_000;

        let producer = std::thread::spawn(move || {
            for i in 0..total {
                let byte = (i % 256) as u8;
                producer_rb.produce(&[byte]);
            }
        });

        let mut received = Vec::with_capacity(total);
        while received.len() < total {
            let mut buf = [0u8; 32];
            let n = rb.consume(&mut buf);
            received.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();

        for (i, byte) in received.iter().enumerate() {
            assert_eq!(*byte, (i % 256) as u8);
        }
    }
}
