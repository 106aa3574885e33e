//! Fixed-capacity circular queue addressed through masked monotonic cursors.
//!
//! The buffer is a bounded multi-producer multi-consumer queue. Each slot
//! carries a sequence stamp that tells producers and consumers whether the
//! slot is free for the current lap, so the queue holds exactly `capacity`
//! items and never needs a lock.

use crossbeam::utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot<T> {
    /// `2 * pos` while free for the write at cursor `pos`, `2 * pos + 1` once
    /// that write landed. Reading the value back frees the slot for cursor
    /// `pos + capacity`. The states stay distinct even with a single slot.
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded FIFO queue whose capacity is a power of two.
///
/// Cursors only ever grow; the slot for cursor `c` is `c & (capacity - 1)`.
/// At every instant `0 <= write - read <= capacity`.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::RingBuffer;
///
/// let buffer = RingBuffer::new(3);
/// assert_eq!(buffer.capacity(), 4);
///
/// buffer.try_enqueue("a").unwrap();
/// buffer.try_enqueue("b").unwrap();
/// assert_eq!(buffer.try_dequeue(), Some("a"));
/// assert_eq!(buffer.len(), 1);
/// ```
pub struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: u64,
    write: CachePadded<AtomicU64>,
    read: CachePadded<AtomicU64>,
}

// SAFETY: a slot value is only touched by the thread that won the cursor CAS
// for it, and the stamp hand-off orders that access against the next owner.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at least `requested` items.
    ///
    /// The capacity is rounded up to the next power of two, and a request of
    /// zero yields a capacity of one.
    pub fn new(requested: usize) -> Self {
        let capacity = requested.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|index| Slot {
                stamp: AtomicU64::new(free_stamp(index as u64)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            slots,
            mask: (capacity - 1) as u64,
            write: CachePadded::new(AtomicU64::new(0)),
            read: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Maximum number of items the buffer holds.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `item` at the tail.
    ///
    /// Returns the item back when the buffer is full so the caller can decide
    /// whether to drop, retry or report it.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let lap = self.capacity() as u64;
        let mut pos = self.write.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == free_stamp(pos) {
                match self.write.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS grants exclusive access to
                        // this slot until the stamp is published below.
                        unsafe { (*slot.value.get()).write(item) };
                        slot.stamp.store(written_stamp(pos), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        pos = current;
                        backoff.spin();
                    }
                }
            } else if stamp < free_stamp(pos) {
                // Slot still holds last lap's value.
                if self.read.load(Ordering::SeqCst) + lap <= pos {
                    return Err(item);
                }
                backoff.spin();
                pos = self.write.load(Ordering::Relaxed);
            } else {
                backoff.snooze();
                pos = self.write.load(Ordering::Relaxed);
            }
        }
    }

    /// Removes the item at the head, or returns `None` when empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        let lap = self.capacity() as u64;
        let mut pos = self.read.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[(pos & self.mask) as usize];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == written_stamp(pos) {
                match self.read.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the stamp proves a completed write, and the
                        // CAS makes this thread its only reader.
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp.store(free_stamp(pos + lap), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => {
                        pos = current;
                        backoff.spin();
                    }
                }
            } else if stamp == free_stamp(pos) {
                // Nothing written here yet for this lap.
                if self.write.load(Ordering::SeqCst) == pos {
                    return None;
                }
                backoff.snooze();
                pos = self.read.load(Ordering::Relaxed);
            } else {
                backoff.snooze();
                pos = self.read.load(Ordering::Relaxed);
            }
        }
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        loop {
            let write = self.write.load(Ordering::SeqCst);
            let read = self.read.load(Ordering::SeqCst);
            // A consistent pair is one where `write` did not move meanwhile.
            if self.write.load(Ordering::SeqCst) == write {
                return write.saturating_sub(read).min(self.capacity() as u64) as usize;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Drops every queued item and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        while self.try_dequeue().is_some() {
            removed += 1;
        }
        removed
    }
}

fn free_stamp(pos: u64) -> u64 {
    pos << 1
}

fn written_stamp(pos: u64) -> u64 {
    (pos << 1) | 1
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(RingBuffer::<u8>::new(0).capacity(), 1);
        assert_eq!(RingBuffer::<u8>::new(1).capacity(), 1);
        assert_eq!(RingBuffer::<u8>::new(5).capacity(), 8);
        assert_eq!(RingBuffer::<u8>::new(8).capacity(), 8);
        assert_eq!(RingBuffer::<u8>::new(4097).capacity(), 8192);
    }

    #[test]
    fn test_fifo_order_and_bounds() {
        let buffer = RingBuffer::new(4);
        for value in 0..4 {
            assert!(buffer.try_enqueue(value).is_ok());
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.try_enqueue(99), Err(99));

        for expected in 0..4 {
            assert_eq!(buffer.try_dequeue(), Some(expected));
        }
        assert_eq!(buffer.try_dequeue(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_wraps_across_many_laps() {
        let buffer = RingBuffer::new(4);
        for round in 0..1_000u32 {
            buffer.try_enqueue(round).unwrap();
            buffer.try_enqueue(round + 1).unwrap();
            assert_eq!(buffer.len(), 2);
            assert_eq!(buffer.try_dequeue(), Some(round));
            assert_eq!(buffer.try_dequeue(), Some(round + 1));
        }
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_single_slot_buffer() {
        let buffer = RingBuffer::new(0);
        assert!(buffer.try_enqueue('x').is_ok());
        assert_eq!(buffer.try_enqueue('y'), Err('y'));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.try_dequeue(), Some('x'));
        assert_eq!(buffer.try_dequeue(), None);
        assert!(buffer.try_enqueue('y').is_ok());
        assert_eq!(buffer.try_dequeue(), Some('y'));
    }

    #[test]
    fn test_single_slot_buffer_across_laps_and_drop() {
        let marker = Arc::new(());
        let buffer = RingBuffer::new(1);
        for _ in 0..100 {
            buffer.try_enqueue(Arc::clone(&marker)).unwrap();
            let rejected = buffer.try_enqueue(Arc::clone(&marker));
            assert!(rejected.is_err());
            drop(rejected);
            assert_eq!(Arc::strong_count(&marker), 2);
            assert!(buffer.try_dequeue().is_some());
        }

        buffer.try_enqueue(Arc::clone(&marker)).unwrap();
        drop(buffer);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_clear_and_drop_release_items() {
        let marker = Arc::new(());
        let buffer = RingBuffer::new(8);
        for _ in 0..5 {
            buffer.try_enqueue(Arc::clone(&marker)).unwrap();
        }
        assert_eq!(Arc::strong_count(&marker), 6);

        assert_eq!(buffer.clear(), 5);
        assert_eq!(Arc::strong_count(&marker), 1);

        for _ in 0..3 {
            buffer.try_enqueue(Arc::clone(&marker)).unwrap();
        }
        drop(buffer);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_single_producer_single_consumer_keeps_order() {
        let buffer = Arc::new(RingBuffer::new(64));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for value in 0..10_000u32 {
                    let mut item = value;
                    while let Err(back) = buffer.try_enqueue(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        };

        let mut expected = 0u32;
        while expected < 10_000 {
            if let Some(value) = buffer.try_dequeue() {
                assert_eq!(value, expected);
                expected += 1;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_producers_lose_nothing() {
        let buffer = Arc::new(RingBuffer::new(128));
        let producers: Vec<_> = (0..4u64)
            .map(|producer| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for offset in 0..2_500u64 {
                        let mut item = producer * 10_000 + offset;
                        while let Err(back) = buffer.try_enqueue(item) {
                            item = back;
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            match buffer.try_dequeue() {
                Some(value) => received.push(value),
                None => thread::yield_now(),
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }

        received.sort_unstable();
        received.dedup();
        assert_eq!(received.len(), 10_000);
    }
}
