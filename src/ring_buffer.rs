//! A fixed-capacity single-producer, single-consumer (SPSC) byte ring.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// A circular byte buffer with `head`/`tail` indices and a `data`/`room` accounting pair.
///
/// Unlike the classic "one slot empty" ring, all `N` slots are usable: emptiness and fullness
/// are told apart by the counters, not by comparing indices. For every reachable state
/// `len() + room() == N`, as long as each counter pair update is made atomic with respect to the
/// other side.
///
/// The buffer is *not* internally synchronized. Every field is an atomic accessed with plain
/// `load`/`store`, so concurrent access is never undefined behavior, but keeping the
/// counter pair consistent is the job of the caller:
///
/// - `head` is only advanced by the producer and `tail` only by the consumer.
/// - Whichever side can be preempted by the other must update `data`/`room` inside a critical
///   section.
///
/// No read-modify-write atomics are used, which keeps the type usable on cores without CAS.
pub struct RingBuffer<const N: usize> {
    buf: [AtomicU8; N],
    /// Where the next byte is written. Always `< N`.
    head: AtomicUsize,
    /// Where the next byte is read. Always `< N`.
    tail: AtomicUsize,
    /// Number of unread bytes between `tail` and `head`.
    data: AtomicUsize,
    /// Number of free slots.
    room: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        const { assert!(N > 0, "ring buffer capacity must be non-zero") };
        RingBuffer {
            buf: [const { AtomicU8::new(0) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            data: AtomicUsize::new(0),
            room: AtomicUsize::new(N),
        }
    }

    /// Total number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes waiting to be read.
    #[inline]
    pub fn len(&self) -> usize {
        // Acquire: pairs with the Release store in `commit_push`, so a non-zero count
        // guarantees the staged byte is visible.
        self.data.load(Ordering::Acquire)
    }

    /// Number of free slots.
    #[inline]
    pub fn room(&self) -> usize {
        // Acquire: pairs with the Release store in `commit_pop`.
        self.room.load(Ordering::Acquire)
    }

    /// Returns `true` if there is nothing to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot holds an unread byte.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.room() == 0
    }

    /// Appends `byte`, or hands it back if there is no room.
    ///
    /// Producer side only.
    #[inline]
    pub fn push(&self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            return Err(byte);
        }
        self.stage(byte);
        self.commit_push();
        Ok(())
    }

    /// Removes the oldest byte, if any.
    ///
    /// Consumer side only.
    #[inline]
    pub fn pop(&self) -> Option<u8> {
        let byte = self.peek()?;
        self.commit_pop();
        Some(byte)
    }

    /// Writes `byte` into the slot at `head` without publishing it.
    ///
    /// The caller must have checked `room() > 0`: with a full buffer `head == tail` and this
    /// overwrites the oldest unread byte.
    #[inline]
    pub(crate) fn stage(&self, byte: u8) {
        debug_assert!(self.room.load(Ordering::Relaxed) > 0);
        // Relaxed: producer owns `head`.
        let head = self.head.load(Ordering::Relaxed);
        self.buf[head].store(byte, Ordering::Relaxed);
    }

    /// Publishes the byte written by [`RingBuffer::stage`]: advances `head`, bumps `data` and
    /// drops `room`.
    #[inline]
    pub(crate) fn commit_push(&self) {
        let head = self.head.load(Ordering::Relaxed);
        self.head.store((head + 1) % N, Ordering::Relaxed);
        let room = self.room.load(Ordering::Relaxed);
        self.room.store(room - 1, Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        // Release: the staged byte must be visible before the consumer can see the new count.
        self.data.store(data + 1, Ordering::Release);
    }

    /// Reads the byte at `tail` without consuming it.
    #[inline]
    pub(crate) fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        // Relaxed: consumer owns `tail`.
        let tail = self.tail.load(Ordering::Relaxed);
        Some(self.buf[tail].load(Ordering::Relaxed))
    }

    /// Consumes the byte returned by [`RingBuffer::peek`]: advances `tail`, drops `data` and
    /// bumps `room`.
    #[inline]
    pub(crate) fn commit_pop(&self) {
        debug_assert!(self.data.load(Ordering::Relaxed) > 0);
        let tail = self.tail.load(Ordering::Relaxed);
        self.tail.store((tail + 1) % N, Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        self.data.store(data - 1, Ordering::Relaxed);
        let room = self.room.load(Ordering::Relaxed);
        // Release: our read of the slot happens before the producer may reuse it.
        self.room.store(room + 1, Ordering::Release);
    }

    /// Current `head` index.
    #[cfg(test)]
    pub(crate) fn head(&self) -> usize {
        self.head.load(Ordering::Relaxed)
    }

    /// Current `tail` index.
    #[cfg(test)]
    pub(crate) fn tail(&self) -> usize {
        self.tail.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BUF_SIZE: usize = 4;

    fn assert_accounting<const N: usize>(b: &RingBuffer<N>) {
        assert_eq!(b.len() + b.room(), N);
        let occupied = (b.head() + N - b.tail()) % N;
        if b.is_full() {
            assert_eq!(occupied, 0);
        } else {
            assert_eq!(occupied, b.len());
        }
    }

    #[test]
    fn starts_empty() {
        let b = RingBuffer::<BUF_SIZE>::new();
        assert!(b.is_empty());
        assert!(!b.is_full());
        assert_eq!(b.room(), BUF_SIZE);
        assert_eq!(b.capacity(), BUF_SIZE);
        assert_eq!(b.pop(), None);
        assert_accounting(&b);
    }

    #[test]
    fn fill_simple() {
        let b = RingBuffer::<BUF_SIZE>::new();
        b.push(1).unwrap();
        b.push(2).unwrap();
        b.push(3).unwrap();
        assert_eq!(b.len(), 3);
        assert_accounting(&b);

        assert_eq!(b.pop(), Some(1));
        assert_eq!(b.pop(), Some(2));
        assert_eq!(b.pop(), Some(3));
        assert_eq!(b.pop(), None);
        assert_accounting(&b);
    }

    #[test]
    fn every_slot_is_usable() {
        let b = RingBuffer::<BUF_SIZE>::new();
        for i in 0..BUF_SIZE as u8 {
            b.push(i).unwrap();
            assert_accounting(&b);
        }
        assert!(b.is_full());
        assert_eq!(b.head(), b.tail());
        assert_eq!(b.push(9), Err(9));

        // The rejected byte must not have clobbered the oldest one.
        assert_eq!(b.pop(), Some(0));
    }

    #[test]
    fn fill_crossing_end() {
        let b = RingBuffer::<BUF_SIZE>::new();
        // Move both indices close to the end.
        for i in 0..BUF_SIZE as u8 - 1 {
            b.push(i).unwrap();
            b.pop().unwrap();
        }
        assert_eq!(b.head(), BUF_SIZE - 1);

        b.push(1).unwrap();
        b.push(2).unwrap();
        b.push(3).unwrap();
        assert_eq!(b.head(), 2);
        assert_accounting(&b);

        assert_eq!(b.pop(), Some(1));
        assert_eq!(b.pop(), Some(2));
        assert_eq!(b.pop(), Some(3));
        assert!(b.is_empty());
        assert_accounting(&b);
    }

    #[test]
    fn fifo_over_many_wraps() {
        let b = RingBuffer::<BUF_SIZE>::new();
        let mut next_out = 0u8;
        for i in 0..=255u8 {
            if b.is_full() {
                assert_eq!(b.pop(), Some(next_out));
                next_out = next_out.wrapping_add(1);
            }
            b.push(i).unwrap();
            assert_accounting(&b);
        }
        while let Some(byte) = b.pop() {
            assert_eq!(byte, next_out);
            next_out = next_out.wrapping_add(1);
        }
        assert_eq!(next_out, 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let b = RingBuffer::<BUF_SIZE>::new();
        b.push(7).unwrap();
        assert_eq!(b.peek(), Some(7));
        assert_eq!(b.peek(), Some(7));
        assert_eq!(b.len(), 1);
        b.commit_pop();
        assert_eq!(b.peek(), None);
    }

    #[test]
    fn staged_byte_is_invisible_until_committed() {
        let b = RingBuffer::<BUF_SIZE>::new();
        b.stage(5);
        assert!(b.is_empty());
        assert_eq!(b.pop(), None);
        b.commit_push();
        assert_eq!(b.pop(), Some(5));
    }

    #[test]
    fn single_slot() {
        let b = RingBuffer::<1>::new();
        b.push(1).unwrap();
        assert!(b.is_full());
        assert_eq!(b.push(2), Err(2));
        assert_eq!(b.pop(), Some(1));
        b.push(3).unwrap();
        assert_eq!(b.pop(), Some(3));
        assert_accounting(&b);
    }
}
