//! Single-producer single-consumer byte ring for the audio path.
//!
//! The host audio library's callback thread consumes frames while the core
//! thread produces them. Offsets grow monotonically and are masked into the
//! buffer; with one producer and one consumer the offset increments commute,
//! so no locking is needed. The offset stores/loads pair release with
//! acquire so the consumed bytes are visible across the two threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner {
    data: Box<[std::cell::UnsafeCell<u8>]>,
    read: AtomicUsize,
    write: AtomicUsize,
}

// the producer and consumer touch disjoint regions, guarded by the offsets
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Inner {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn available(&self) -> usize {
        self.write.load(Ordering::Acquire) - self.read.load(Ordering::Acquire)
    }
}

pub struct Producer {
    inner: Arc<Inner>,
}

pub struct Consumer {
    inner: Arc<Inner>,
}

/// Create a ring of `capacity` bytes (rounded up to a power of two).
pub fn ring_buffer(capacity: usize) -> (Producer, Consumer) {
    let capacity = capacity.next_power_of_two();
    let data = (0..capacity)
        .map(|_| std::cell::UnsafeCell::new(0u8))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let inner = Arc::new(Inner {
        data,
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
    });
    (
        Producer {
            inner: inner.clone(),
        },
        Consumer { inner },
    )
}

impl Producer {
    /// Space left for writing.
    pub fn remaining(&self) -> usize {
        self.inner.size() - self.inner.available()
    }

    /// Copy as much of `buf` as fits; returns the number of bytes written.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let inner = &self.inner;
        let n = buf.len().min(self.remaining());
        let write = inner.write.load(Ordering::Relaxed);
        let mask = inner.size() - 1;

        for (i, &b) in buf[..n].iter().enumerate() {
            unsafe {
                *inner.data[(write + i) & mask].get() = b;
            }
        }

        inner.write.store(write + n, Ordering::Release);
        n
    }
}

impl Consumer {
    /// Bytes buffered for reading.
    pub fn available(&self) -> usize {
        self.inner.available()
    }

    /// Copy up to `buf.len()` buffered bytes out; returns the count read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let inner = &self.inner;
        let n = buf.len().min(self.available());
        let read = inner.read.load(Ordering::Relaxed);
        let mask = inner.size() - 1;

        for (i, b) in buf[..n].iter_mut().enumerate() {
            unsafe {
                *b = *inner.data[(read + i) & mask].get();
            }
        }

        inner.read.store(read + n, Ordering::Release);
        n
    }

    /// Discard `n` buffered bytes without copying them.
    pub fn advance_read(&mut self, n: usize) {
        let n = n.min(self.available());
        self.inner.read.fetch_add(n, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let (mut tx, mut rx) = ring_buffer(16);
        assert_eq!(tx.write(b"hello"), 5);
        assert_eq!(rx.available(), 5);

        let mut out = [0u8; 5];
        assert_eq!(rx.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn writes_stop_at_capacity() {
        let (mut tx, mut rx) = ring_buffer(8);
        assert_eq!(tx.write(&[1u8; 12]), 8);
        assert_eq!(tx.remaining(), 0);

        let mut out = [0u8; 4];
        rx.read(&mut out);
        assert_eq!(tx.remaining(), 4);
    }

    #[test]
    fn advance_read_moves_the_read_offset() {
        let (mut tx, mut rx) = ring_buffer(8);
        tx.write(&[1, 2, 3, 4]);

        rx.advance_read(2);
        assert_eq!(rx.available(), 2);

        let mut out = [0u8; 2];
        rx.read(&mut out);
        assert_eq!(out, [3, 4]);
    }

    #[test]
    fn offsets_wrap_around() {
        let (mut tx, mut rx) = ring_buffer(8);
        for round in 0u8..10 {
            let chunk = [round; 6];
            assert_eq!(tx.write(&chunk), 6);
            let mut out = [0u8; 6];
            assert_eq!(rx.read(&mut out), 6);
            assert_eq!(out, chunk);
        }
    }

    #[test]
    fn producer_and_consumer_run_on_separate_threads() {
        let (mut tx, mut rx) = ring_buffer(64);
        let total: usize = 10_000;

        let writer = std::thread::spawn(move || {
            let mut sent = 0u8;
            let mut count = 0;
            while count < total {
                if tx.write(&[sent]) == 1 {
                    sent = sent.wrapping_add(1);
                    count += 1;
                }
            }
        });

        let mut expect = 0u8;
        let mut seen = 0;
        while seen < total {
            let mut b = [0u8; 1];
            if rx.read(&mut b) == 1 {
                assert_eq!(b[0], expect);
                expect = expect.wrapping_add(1);
                seen += 1;
            }
        }

        writer.join().unwrap();
    }
}
