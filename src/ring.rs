//! Fixed-capacity single-producer/single-consumer byte ring
//!
//! The ring is split into a [`Producer`] and a [`Consumer`] handle. Each side
//! owns one index and only publishes it with release ordering; the other side
//! reads it with acquire ordering. Slots are `AtomicU8` so the buffer can be
//! shared without `unsafe`.
//!
//! One slot is always left free to tell a full ring from an empty one, so a
//! ring created with capacity `C` holds at most `C - 1` bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

#[derive(Debug)]
struct Shared {
    slots: Box<[AtomicU8]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl Shared {
    const fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn occupied(&self, head: usize, tail: usize) -> usize {
        (head + self.capacity() - tail) % self.capacity()
    }
}

/// Create a ring with `capacity` slots and split it into its two handles
///
/// # Panics
///
/// Panics if `capacity` is less than 2 (a one-slot ring could never hold data)
#[must_use]
pub fn ring_buffer(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity >= 2, "ring capacity must be at least 2");

    let slots = (0..capacity).map(|_| AtomicU8::new(0)).collect();
    let shared = Arc::new(Shared {
        slots,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

/// Writing half of the ring
#[derive(Debug)]
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Push one byte, returning `false` if the ring is full
    pub fn push(&mut self, byte: u8) -> bool {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let next = (head + 1) % shared.capacity();

        if next == shared.tail.load(Ordering::Acquire) {
            return false;
        }

        shared.slots[head].store(byte, Ordering::Relaxed);
        shared.head.store(next, Ordering::Release);
        true
    }

    /// Push as many bytes from `data` as fit, returning the count written
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let shared = &*self.shared;
        let cap = shared.capacity();
        let mut head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);

        let free = cap - 1 - shared.occupied(head, tail);
        let count = free.min(data.len());

        for &byte in &data[..count] {
            shared.slots[head].store(byte, Ordering::Relaxed);
            head = (head + 1) % cap;
        }

        shared.head.store(head, Ordering::Release);
        count
    }

    /// Number of bytes that can be pushed right now
    #[must_use]
    pub fn free_len(&self) -> usize {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        shared.capacity() - 1 - shared.occupied(head, tail)
    }

    /// Total slot count (usable capacity is one less)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading half of the ring
#[derive(Debug)]
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Pop the oldest byte, if any
    pub fn pop(&mut self) -> Option<u8> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);

        if tail == shared.head.load(Ordering::Acquire) {
            return None;
        }

        let byte = shared.slots[tail].load(Ordering::Relaxed);
        shared
            .tail
            .store((tail + 1) % shared.capacity(), Ordering::Release);
        Some(byte)
    }

    /// Pop up to `buf.len()` bytes in FIFO order, returning the count read
    pub fn pop_slice(&mut self, buf: &mut [u8]) -> usize {
        let shared = &*self.shared;
        let cap = shared.capacity();
        let mut tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);

        let count = shared.occupied(head, tail).min(buf.len());
        for out in &mut buf[..count] {
            *out = shared.slots[tail].load(Ordering::Relaxed);
            tail = (tail + 1) % cap;
        }

        shared.tail.store(tail, Ordering::Release);
        count
    }

    /// Discard everything currently buffered
    pub fn clear(&mut self) {
        let head = self.shared.head.load(Ordering::Acquire);
        self.shared.tail.store(head, Ordering::Release);
    }

    /// Number of buffered bytes
    #[must_use]
    pub fn len(&self) -> usize {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        shared.occupied(head, tail)
    }

    /// True iff head == tail
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.tail.load(Ordering::Relaxed) == self.shared.head.load(Ordering::Acquire)
    }

    /// Total slot count (usable capacity is one less)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
