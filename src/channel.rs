//! Fixed-capacity FIFO shared between threads.
//!
//! A [`BoundedChannel`] is the only piece of shared mutable state between the connection
//! handlers, the dispatcher, the match workers and the summarizer. It is made of two parts:
//!
//! - a ring buffer guarded by a mutex, holding the queued elements
//! - a counting semaphore tracking how many elements can be read
//!
//! Readers wait on the semaphore, never on the buffer lock, so a reader blocked on an empty
//! channel does not stop writers from making progress.
//!
//! Writes never block on a full channel: they fail immediately and hand the element back
//! (see [`Full`]). Size the channel so that it exceeds the expected number of in-flight
//! elements if dropping is not acceptable.
//!
//! # Example
//!
//! ```
//! use rps_tournament::channel::BoundedChannel;
//!
//! let channel = BoundedChannel::new(2);
//! channel.write("first").unwrap();
//! channel.write("second").unwrap();
//! assert!(channel.write("third").is_err());
//!
//! assert_eq!(channel.snapshot().iter().count(), 2);
//! assert_eq!(channel.read(), "first");
//! ```

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A bounded, thread-safe FIFO queue.
///
/// Any number of threads may [`write`](Self::write) and [`read`](Self::read) concurrently; every
/// element is delivered to exactly one reader.
pub struct BoundedChannel<T> {
    buffer: Mutex<RingBuffer<T>>,
    available: Semaphore,
}

impl<T> BoundedChannel<T> {
    /// Creates an empty channel able to hold `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(RingBuffer::with_capacity(capacity)),
            available: Semaphore::new(),
        }
    }

    /// Maximum number of elements the channel can hold.
    pub fn capacity(&self) -> usize {
        lock(&self.buffer).capacity()
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        lock(&self.buffer).len
    }

    /// True if no element is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues `item` without blocking.
    ///
    /// # Errors
    /// Returns [`Full`] (holding `item`) when the channel is at capacity. This is an expected
    /// outcome; the caller decides whether to retry, drop or escalate.
    pub fn write(&self, item: T) -> Result<(), Full<T>> {
        let mut buffer = lock(&self.buffer);
        if let Err(item) = buffer.push(item) {
            return Err(Full {
                item,
                capacity: buffer.capacity(),
            });
        }
        drop(buffer);

        // the element must be visible before a reader can take its permit
        self.available.release();
        Ok(())
    }

    /// Dequeues the oldest element, blocking until one is available.
    ///
    /// There is no timeout: with no writer, this waits forever.
    pub fn read(&self) -> T {
        loop {
            self.available.acquire();
            if let Some(item) = lock(&self.buffer).pop() {
                return item;
            }
        }
    }

    /// Locks the channel and gives a read-only view of the queued elements, oldest first.
    ///
    /// Nothing is removed. Writers and readers wait until the returned guard is dropped, so keep
    /// it short-lived.
    pub fn snapshot(&self) -> Snapshot<'_, T> {
        Snapshot {
            buffer: lock(&self.buffer),
        }
    }

    /// Destroys the channel, handing every remaining element to `clean` in FIFO order.
    ///
    /// Dropping the channel releases the remaining elements without a callback.
    pub fn destroy(self, mut clean: impl FnMut(T)) {
        let mut buffer = self
            .buffer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        while let Some(item) = buffer.pop() {
            clean(item);
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = lock(&self.buffer);
        f.debug_struct("BoundedChannel")
            .field("len", &buffer.len)
            .field("capacity", &buffer.capacity())
            .finish()
    }
}

/// Error returned by [`BoundedChannel::write`] when the channel is full.
pub struct Full<T> {
    item: T,
    capacity: usize,
}

impl<T> Full<T> {
    /// Gives back the element that could not be written.
    pub fn into_inner(self) -> T {
        self.item
    }

    /// Capacity of the channel that rejected the write.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Full")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel is full ({} elements)", self.capacity)
    }
}

impl<T> std::error::Error for Full<T> {}

/// Read-only view of a locked [`BoundedChannel`].
pub struct Snapshot<'a, T> {
    buffer: MutexGuard<'a, RingBuffer<T>>,
}

impl<T> Snapshot<'_, T> {
    /// Queued elements, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buffer.iter()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.buffer.len
    }

    /// True if no element is queued.
    pub fn is_empty(&self) -> bool {
        self.buffer.len == 0
    }
}

struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        if self.len == self.capacity() {
            return Err(item);
        }
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        item
    }

    fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % self.capacity()].as_ref())
    }
}

/// Counting semaphore: one permit per readable element.
struct Semaphore {
    permits: Mutex<usize>,
    signal: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            permits: Mutex::new(0),
            signal: Condvar::new(),
        }
    }

    fn release(&self) {
        *lock(&self.permits) += 1;
        self.signal.notify_one();
    }

    fn acquire(&self) {
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            permits = self
                .signal
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }
}

// A panic while holding one of these locks cannot leave the bookkeeping half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod channel_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn reads_in_write_order() {
        let channel = BoundedChannel::new(5);
        for i in 1..=5 {
            channel.write(i).unwrap();
        }
        let read: Vec<_> = (0..5).map(|_| channel.read()).collect();
        assert_eq!(read, vec![1, 2, 3, 4, 5]);
        assert!(channel.is_empty());
    }

    #[test]
    fn full_channel_rejects_write() {
        let channel = BoundedChannel::new(3);
        for i in 0..3 {
            channel.write(i).unwrap();
        }
        let err = channel.write(99).unwrap_err();
        assert_eq!(err.capacity(), 3);
        assert_eq!(err.into_inner(), 99);
        assert_eq!(channel.len(), 3);
        assert_eq!(channel.snapshot().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let channel = BoundedChannel::new(0);
        assert!(channel.write("x").is_err());
        assert!(channel.is_empty());
    }

    #[test]
    fn wraps_around_the_ring() {
        let channel = BoundedChannel::new(3);
        for round in 0..10 {
            channel.write(round * 2).unwrap();
            channel.write(round * 2 + 1).unwrap();
            assert_eq!(channel.read(), round * 2);
            assert_eq!(channel.read(), round * 2 + 1);
        }
        channel.write(100).unwrap();
        channel.write(101).unwrap();
        channel.write(102).unwrap();
        assert_eq!(
            channel.snapshot().iter().copied().collect::<Vec<_>>(),
            vec![100, 101, 102]
        );
    }

    #[test]
    fn read_blocks_until_write() {
        let channel = Arc::new(BoundedChannel::new(4));
        let reader = {
            let channel = channel.clone();
            thread::spawn(move || channel.read())
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!reader.is_finished(), "read returned on an empty channel");

        channel.write(42).unwrap();
        assert_eq!(reader.join().unwrap(), 42);
        assert!(channel.is_empty());
    }

    #[test]
    fn one_write_wakes_one_reader() {
        let channel = Arc::new(BoundedChannel::new(4));
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || channel.read())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        channel.write(1).unwrap();
        thread::sleep(Duration::from_millis(100));
        let finished = readers.iter().filter(|r| r.is_finished()).count();
        assert_eq!(finished, 1);

        channel.write(2).unwrap();
        let mut got: Vec<_> = readers.into_iter().map(|r| r.join().unwrap()).collect();
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn snapshot_does_not_consume() {
        let channel = BoundedChannel::new(4);
        channel.write("a").unwrap();
        channel.write("b").unwrap();

        for _ in 0..3 {
            let snapshot = channel.snapshot();
            assert_eq!(snapshot.len(), 2);
            assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        }
        assert_eq!(channel.read(), "a");
    }

    #[test]
    fn destroy_hands_back_remaining_elements() {
        let channel = BoundedChannel::new(8);
        for word in ["x", "y", "z"] {
            channel.write(word.to_string()).unwrap();
        }
        let _ = channel.read();

        let mut cleaned = vec![];
        channel.destroy(|item| cleaned.push(item));
        assert_eq!(cleaned, vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let channel = Arc::new(BoundedChannel::new(PRODUCERS * PER_PRODUCER));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let channel = channel.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        channel.write((p, i)).unwrap();
                    }
                })
            })
            .collect();

        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || {
                (0..PRODUCERS * PER_PRODUCER)
                    .map(|_| channel.read())
                    .collect::<Vec<_>>()
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let received = consumer.join().unwrap();
        let unique: HashSet<_> = received.iter().copied().collect();
        assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);

        // per-producer order survives interleaving
        for p in 0..PRODUCERS {
            let sequence: Vec<_> = received
                .iter()
                .filter(|(q, _)| *q == p)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(sequence, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }

    #[test]
    fn concurrent_readers_split_elements() {
        let channel = Arc::new(BoundedChannel::new(1000));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let channel = channel.clone();
                thread::spawn(move || (0..250).map(|_| channel.read()).collect::<Vec<u32>>())
            })
            .collect();
        for i in 0..1000 {
            channel.write(i).unwrap();
        }
        let mut all: Vec<_> = readers.into_iter().flat_map(|r| r.join().unwrap()).collect();
        all.sort();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
