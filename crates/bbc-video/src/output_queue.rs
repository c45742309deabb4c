//! Lock-free single-producer/single-consumer ring buffer.
//!
//! The producer calls [`OutputQueue::producer_buffer`] for writable spans,
//! fills them in place, then calls [`OutputQueue::produce`] to publish the
//! write. The consumer mirrors this with [`OutputQueue::consumer_buffer`] and
//! [`OutputQueue::consume`]. Both sides may run concurrently on separate
//! threads without any lock; only the two position counters are shared, and
//! they live on separate cache lines to avoid false sharing.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// ~1 frame of 2 MHz video output.
pub const DEFAULT_CAPACITY: usize = 262_144;

#[repr(align(64))]
struct CachePadded<T>(T);

/// Two spans covering the writable or readable region of the queue; the
/// buffer wraps, so a request may be split into a leading and trailing part.
pub struct Spans<'a, T> {
    pub a: &'a mut [T],
    pub b: &'a mut [T],
}

impl<'a, T> Spans<'a, T> {
    #[must_use]
    pub fn total(&self) -> usize {
        self.a.len() + self.b.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Single-producer/single-consumer ring buffer of `T`.
pub struct OutputQueue<T> {
    capacity: usize,
    buffer: UnsafeCell<Box<[T]>>,
    read_pos: CachePadded<AtomicU64>,
    write_pos: CachePadded<AtomicU64>,
}

// Safety: exactly one thread ever calls the producer methods and exactly one
// (possibly different) thread ever calls the consumer methods; the regions
// they touch are disjoint, established by the read_pos/write_pos protocol.
unsafe impl<T: Send> Sync for OutputQueue<T> {}

impl<T: Copy + Default> OutputQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let buffer = vec![T::default(); capacity].into_boxed_slice();
        Self {
            capacity,
            buffer: UnsafeCell::new(buffer),
            read_pos: CachePadded(AtomicU64::new(0)),
            write_pos: CachePadded(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer_mut(&self) -> &mut [T] {
        // Safety: producer and consumer only ever index disjoint ranges of
        // this slice (enforced by the position counters above), and only one
        // thread plays each role.
        unsafe { &mut *self.buffer.get() }
    }

    /// Writable spans covering the current free region. Empty if full.
    pub fn producer_buffer(&self) -> Spans<'_, T> {
        let read_pos = self.read_pos.0.load(Ordering::Acquire);
        let write_pos = self.write_pos.0.load(Ordering::Relaxed);
        let used = (write_pos - read_pos) as usize;
        let free = self.capacity - used;
        if free == 0 {
            return Spans { a: &mut [], b: &mut [] };
        }

        let begin = (write_pos as usize) % self.capacity;
        let end = begin + free;
        let buf = self.buffer_mut();
        if end <= self.capacity {
            let (_, rest) = buf.split_at_mut(begin);
            Spans { a: &mut rest[..free], b: &mut [] }
        } else {
            let (b, a) = buf.split_at_mut(begin);
            let tail = end - self.capacity;
            Spans { a, b: &mut b[..tail] }
        }
    }

    /// Commit `n` items written via [`Self::producer_buffer`].
    pub fn produce(&self, n: usize) {
        self.write_pos.0.fetch_add(n as u64, Ordering::Release);
    }

    /// Write a single item. Returns false without blocking if the queue is full.
    pub fn push(&self, item: T) -> bool {
        let spans = self.producer_buffer();
        if spans.is_empty() {
            return false;
        }
        spans.a[0] = item;
        self.produce(1);
        true
    }

    /// Readable spans covering the currently filled region. Empty if drained.
    pub fn consumer_buffer(&self) -> Spans<'_, T> {
        let read_pos = self.read_pos.0.load(Ordering::Relaxed);
        let write_pos = self.write_pos.0.load(Ordering::Acquire);
        let used = (write_pos - read_pos) as usize;
        if used == 0 {
            return Spans { a: &mut [], b: &mut [] };
        }

        let begin = (read_pos as usize) % self.capacity;
        let end = begin + used;
        let buf = self.buffer_mut();
        if end <= self.capacity {
            let (_, rest) = buf.split_at_mut(begin);
            Spans { a: &mut rest[..used], b: &mut [] }
        } else {
            let (b, a) = buf.split_at_mut(begin);
            let tail = end - self.capacity;
            Spans { a, b: &mut b[..tail] }
        }
    }

    /// Release `n` items read via [`Self::consumer_buffer`].
    pub fn consume(&self, n: usize) {
        self.read_pos.0.fetch_add(n as u64, Ordering::Release);
    }

    /// Read and remove a single item. Returns None without blocking if empty.
    pub fn pop(&self) -> Option<T> {
        let spans = self.consumer_buffer();
        let item = if !spans.a.is_empty() {
            spans.a[0]
        } else {
            return None;
        };
        self.consume(1);
        Some(item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let read_pos = self.read_pos.0.load(Ordering::Acquire);
        let write_pos = self.write_pos.0.load(Ordering::Acquire);
        (write_pos - read_pos) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let q: OutputQueue<u32> = OutputQueue::new(4);
        assert!(q.push(1));
        assert!(q.push(2));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let q: OutputQueue<u32> = OutputQueue::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));
    }

    #[test]
    fn wraps_around_capacity() {
        let q: OutputQueue<u32> = OutputQueue::new(4);
        for i in 0..4 {
            assert!(q.push(i));
        }
        assert_eq!(q.pop(), Some(0));
        assert_eq!(q.pop(), Some(1));
        assert!(q.push(4));
        assert!(q.push(5));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), Some(5));
    }

    #[test]
    fn producer_buffer_reports_two_spans_when_wrapped() {
        let q: OutputQueue<u32> = OutputQueue::new(4);
        assert!(q.push(0));
        assert!(q.push(1));
        assert!(q.push(2));
        assert_eq!(q.pop(), Some(0));
        let spans = q.producer_buffer();
        assert_eq!(spans.total(), 2);
        assert_eq!(spans.a.len(), 1);
        assert_eq!(spans.b.len(), 1);
    }

    #[test]
    fn bulk_produce_and_consume() {
        let q: OutputQueue<u32> = OutputQueue::new(8);
        {
            let spans = q.producer_buffer();
            assert_eq!(spans.total(), 8);
            for (i, slot) in spans.a.iter_mut().enumerate() {
                *slot = i as u32;
            }
        }
        q.produce(8);
        assert_eq!(q.len(), 8);
        {
            let spans = q.consumer_buffer();
            assert_eq!(spans.a, &[0, 1, 2, 3, 4, 5, 6, 7]);
        }
        q.consume(8);
        assert!(q.is_empty());
    }
}
