//! Single-producer/single-consumer ring buffer of fixed-size items.
//!
//! Two atomic indices guard the slots: the producer owns `[write, read+cap)`, the consumer
//! owns `[read, write)`. Capacity `N` yields `N-1` usable slots (the ring is full when
//! `write+1 == read`) so that `write == read` unambiguously means empty.
//!
//! The single-producer/single-consumer contract is enforced by the type system rather than
//! a runtime check: `new` hands back a `Producer<T>`/`Consumer<T>` pair, neither of which is
//! `Clone`, so there can only ever be one of each in a program.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RingInner<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    write_idx: AtomicUsize,
    read_idx: AtomicUsize,
}

unsafe impl<T: Send> Send for RingInner<T> {}
unsafe impl<T: Send> Sync for RingInner<T> {}

impl<T> RingInner<T> {
    #[inline(always)]
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.capacity
    }
}

/// `capacity` is the number of slots backing the ring; usable capacity is `capacity - 1`.
/// Splits ownership into a producer and a consumer half so only one thread may push and only
/// one thread may pop.
pub fn ring<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity >= 2, "ring capacity must be at least 2");

    let mut buffer = Vec::with_capacity(capacity);
    for _ in 0..capacity {
        buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
    }

    let inner = Arc::new(RingInner {
        buffer: buffer.into_boxed_slice(),
        capacity,
        write_idx: AtomicUsize::new(0),
        read_idx: AtomicUsize::new(0),
    });

    (
        Producer {
            inner: inner.clone(),
            _not_sync: PhantomData,
        },
        Consumer {
            inner,
            _not_sync: PhantomData,
        },
    )
}

/// The push half of a ring. `Send` but intentionally not `Sync` and not `Clone`: only one
/// thread may ever hold it.
pub struct Producer<T> {
    inner: Arc<RingInner<T>>,
    _not_sync: PhantomData<*const ()>,
}

unsafe impl<T: Send> Send for Producer<T> {}

/// The pop half of a ring. `Send` but intentionally not `Sync` and not `Clone`.
pub struct Consumer<T> {
    inner: Arc<RingInner<T>>,
    _not_sync: PhantomData<*const ()>,
}

unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Producer<T> {
    /// Pushes `item` into the ring. Fails (returning the item back) if the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let inner = &*self.inner;
        let write_idx = inner.write_idx.load(Ordering::Relaxed);
        let read_idx = inner.read_idx.load(Ordering::Acquire);
        let next_write_idx = inner.next(write_idx);

        if next_write_idx == read_idx {
            return Err(item);
        }

        unsafe {
            (*inner.buffer[write_idx].get()).write(item);
        }
        inner.write_idx.store(next_write_idx, Ordering::Release);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        let inner = &*self.inner;
        let write_idx = inner.write_idx.load(Ordering::Relaxed);
        let read_idx = inner.read_idx.load(Ordering::Acquire);
        inner.next(write_idx) == read_idx
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl<T> Consumer<T> {
    /// Pops the head item. Returns `None` if the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let inner = &*self.inner;
        let write_idx = inner.write_idx.load(Ordering::Acquire);
        let read_idx = inner.read_idx.load(Ordering::Relaxed);

        if read_idx == write_idx {
            return None;
        }

        let item = unsafe { (*inner.buffer[read_idx].get()).as_ptr().read() };
        inner.read_idx.store(inner.next(read_idx), Ordering::Release);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        let inner = &*self.inner;
        inner.read_idx.load(Ordering::Acquire) == inner.write_idx.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn head(&self) -> usize {
        self.inner.read_idx.load(Ordering::Acquire)
    }

    pub fn tail(&self) -> usize {
        self.inner.write_idx.load(Ordering::Acquire)
    }
}

impl<T: Copy> Consumer<T> {
    /// Reads the head item without advancing the read index.
    pub fn peek(&self) -> Option<T> {
        let inner = &*self.inner;
        let write_idx = inner.write_idx.load(Ordering::Acquire);
        let read_idx = inner.read_idx.load(Ordering::Relaxed);

        if read_idx == write_idx {
            return None;
        }

        Some(unsafe { (*inner.buffer[read_idx].get()).as_ptr().read() })
    }
}

impl<T> Drop for RingInner<T> {
    fn drop(&mut self) {
        // Drain whatever is left so element destructors run exactly once.
        let mut read_idx = *self.read_idx.get_mut();
        let write_idx = *self.write_idx.get_mut();
        while read_idx != write_idx {
            unsafe {
                (*self.buffer[read_idx].get()).as_mut_ptr().drop_in_place();
            }
            read_idx = self.next(read_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn push_pop_fifo() {
        let (p, c) = ring::<u32>(8);
        for i in 0..5 {
            p.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(c.pop(), Some(i));
        }
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn full_at_capacity_minus_one() {
        let (p, c) = ring::<u32>(4);
        assert!(p.push(1).is_ok());
        assert!(p.push(2).is_ok());
        assert!(p.push(3).is_ok());
        assert!(p.is_full());
        assert_eq!(p.push(4), Err(4));

        assert_eq!(c.pop(), Some(1));
        assert!(!p.is_full());
        assert!(p.push(4).is_ok());
    }

    #[test]
    fn peek_does_not_advance() {
        let (p, c) = ring::<u32>(4);
        p.push(42).unwrap();
        assert_eq!(c.peek(), Some(42));
        assert_eq!(c.peek(), Some(42));
        assert_eq!(c.pop(), Some(42));
        assert_eq!(c.peek(), None);
    }

    #[test]
    fn empty_ring_pop_fails() {
        let (_p, c) = ring::<u32>(4);
        assert!(c.is_empty());
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn drops_remaining_items() {
        use std::sync::atomic::AtomicUsize as Counter;
        static DROPS: Counter = Counter::new(0);

        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        {
            let (p, c) = ring::<Counted>(4);
            p.push(Counted).unwrap();
            p.push(Counted).unwrap();
            assert_eq!(c.pop().is_some(), true);
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        let (p, c) = ring::<u64>(64);
        let total = 10_000u64;

        let writer = thread::spawn(move || {
            let mut i = 0;
            while i < total {
                if p.push(i).is_ok() {
                    i += 1;
                }
            }
        });

        let mut expected = 0u64;
        while expected < total {
            if let Some(v) = c.pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }

        writer.join().unwrap();
    }
}
