use crate::overflow::Slot;
use core::cell::{RefCell, UnsafeCell};
use core::fmt;
use critical_section::Mutex;
use heapless::Deque;

/// Number of buffers in the capture pool.
pub const DEFAULT_BUFFER_COUNT: usize = 4;

/// Size in bytes of every capture buffer, one high speed bulk packet.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Identity of a buffer that the DMA engine may write into.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferId {
    /// Buffer `n` of the pool.
    Pool(u8),
    /// The discard buffer of a DMA slot.
    Overflow(Slot),
}

/// Exclusive ownership of one pool buffer.
///
/// Only the pool creates these, and there is exactly one per buffer, so holding a `Buffer` is
/// holding the only way to touch its bytes. A `Buffer` must go back to its pool with
/// [`BufferPool::give_empty`] or [`BufferPool::give_full`]; dropping it takes the buffer out of
/// circulation for good.
#[must_use = "a dropped Buffer is lost to the pool"]
pub struct Buffer<'p, const SIZE: usize> {
    index: u8,
    data: &'p mut [u8; SIZE],
}

impl<'p, const SIZE: usize> Buffer<'p, SIZE> {
    /// The identity of this buffer.
    pub fn id(&self) -> BufferId {
        BufferId::Pool(self.index)
    }

    /// Position of this buffer in the pool.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The buffer contents.
    pub fn bytes(&self) -> &[u8; SIZE] {
        &*self.data
    }

    /// The buffer contents, for writing.
    pub fn bytes_mut(&mut self) -> &mut [u8; SIZE] {
        &mut *self.data
    }

    /// Start of the buffer, for handing to a DMA engine. The engine may only write through it while
    /// this token is held by its driver.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }
}

impl<const SIZE: usize> fmt::Debug for Buffer<'_, SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("index", &self.index).finish()
    }
}

struct Queues<const N: usize> {
    empty: Deque<u8, N>,
    full: Deque<u8, N>,
    initialized: bool,
}

/// A fixed set of `N` buffers of `SIZE` bytes and two FIFO queues, "empty" and "full".
///
/// Every buffer is at all times in exactly one of: the empty queue, the full queue, or a
/// [`Buffer`] token held by the DMA receiver or the consumer. All operations take a short critical
/// section and never block, except [`take_full_blocking`](BufferPool::take_full_blocking) which
/// must only be used from task context.
///
/// ``` ignore
/// static POOL: BufferPool<4, 512> = BufferPool::new();
/// POOL.init();
/// ```
pub struct BufferPool<const N: usize, const SIZE: usize> {
    storage: UnsafeCell<[[u8; SIZE]; N]>,
    queues: Mutex<RefCell<Queues<N>>>,
}

// SAFETY: a buffer's bytes are only reached through its unique `Buffer` token, or by
// `snapshot_full` while the buffer sits in the full queue and the queues are locked. Queue state
// is behind a critical section.
unsafe impl<const N: usize, const SIZE: usize> Sync for BufferPool<N, SIZE> {}

impl<const N: usize, const SIZE: usize> BufferPool<N, SIZE> {
    /// Creates an uninitialized pool. Both queues are empty until [`init`](BufferPool::init).
    pub const fn new() -> Self {
        assert!(N > 0 && N <= u8::MAX as usize, "pool size must be 1..=255");

        BufferPool {
            storage: UnsafeCell::new([[0; SIZE]; N]),
            queues: Mutex::new(RefCell::new(Queues {
                empty: Deque::new(),
                full: Deque::new(),
                initialized: false,
            })),
        }
    }

    /// Puts every buffer on the empty queue. Calling it again has no effect.
    pub fn init(&self) {
        critical_section::with(|cs| {
            let mut queues = self.queues.borrow_ref_mut(cs);

            if queues.initialized {
                return;
            }

            for index in 0..N as u8 {
                // Cannot fail, the queue holds N entries.
                queues.empty.push_back(index).ok();
            }

            queues.initialized = true;
        });

        usb_debug!("buffer pool initialized with {} buffers", N);
    }

    /// Number of buffers in the pool.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Number of buffers waiting on the empty queue.
    pub fn empty_len(&self) -> usize {
        critical_section::with(|cs| self.queues.borrow_ref(cs).empty.len())
    }

    /// Number of buffers waiting on the full queue.
    pub fn full_len(&self) -> usize {
        critical_section::with(|cs| self.queues.borrow_ref(cs).full.len())
    }

    /// Takes a buffer to fill. Returns `None` if there is none. Safe to call from an interrupt.
    pub fn try_take_empty(&self) -> Option<Buffer<'_, SIZE>> {
        critical_section::with(|cs| self.queues.borrow_ref_mut(cs).empty.pop_front())
            .map(|index| self.token(index))
    }

    /// Returns a buffer to the empty queue.
    ///
    /// # Panics
    ///
    /// If `buffer` was taken from another pool, or the empty queue is already full.
    pub fn give_empty(&self, buffer: Buffer<'_, SIZE>) {
        let index = self.release(buffer);

        critical_section::with(|cs| self.queues.borrow_ref_mut(cs).empty.push_back(index))
            .expect("empty queue overflow");
    }

    /// Takes the oldest filled buffer. Returns `None` if there is none.
    pub fn try_take_full(&self) -> Option<Buffer<'_, SIZE>> {
        critical_section::with(|cs| self.queues.borrow_ref_mut(cs).full.pop_front())
            .map(|index| self.token(index))
    }

    /// Takes the oldest filled buffer, spinning until one is available. Task context only.
    pub fn take_full_blocking(&self) -> Buffer<'_, SIZE> {
        loop {
            if let Some(buffer) = self.try_take_full() {
                return buffer;
            }

            core::hint::spin_loop();
        }
    }

    /// Queues a filled buffer for the consumer.
    ///
    /// # Panics
    ///
    /// If `buffer` was taken from another pool, or the full queue is already full.
    pub fn give_full(&self, buffer: Buffer<'_, SIZE>) {
        let index = self.release(buffer);

        critical_section::with(|cs| self.queues.borrow_ref_mut(cs).full.push_back(index))
            .expect("full queue overflow");
    }

    /// The identity of the oldest filled buffer, without taking it. The buffer may be taken by the
    /// consumer as soon as this returns; use [`snapshot_full`](BufferPool::snapshot_full) to look
    /// at its contents.
    pub fn peek_full(&self) -> Option<BufferId> {
        critical_section::with(|cs| self.queues.borrow_ref(cs).full.front().copied())
            .map(BufferId::Pool)
    }

    /// Copies the contents of the oldest filled buffer into `out` and returns its identity,
    /// without taking it.
    pub fn snapshot_full(&self, out: &mut [u8; SIZE]) -> Option<BufferId> {
        critical_section::with(|cs| {
            let queues = self.queues.borrow_ref(cs);
            let index = *queues.full.front()?;

            // SAFETY: the buffer is queued, so no token for it exists, and it cannot be dequeued
            // while the critical section is held.
            out.copy_from_slice(unsafe { &*self.slot(index) });

            Some(BufferId::Pool(index))
        })
    }

    fn slot(&self, index: u8) -> *mut [u8; SIZE] {
        assert!((index as usize) < N, "buffer index {} out of range", index);

        // SAFETY: index < N keeps the pointer inside the storage array.
        unsafe { self.storage.get().cast::<[u8; SIZE]>().add(index as usize) }
    }

    fn token(&self, index: u8) -> Buffer<'_, SIZE> {
        Buffer {
            index,
            // SAFETY: the index was just removed from a queue, so this is the only token for it.
            data: unsafe { &mut *self.slot(index) },
        }
    }

    // Not a debug assertion: `token` trusts every queued index.
    fn release(&self, buffer: Buffer<'_, SIZE>) -> u8 {
        let owned = (buffer.index as usize) < N
            && core::ptr::eq(buffer.data as *const [u8; SIZE], self.slot(buffer.index));

        assert!(owned, "buffer {} belongs to another pool", buffer.index);

        buffer.index
    }
}

impl<const N: usize, const SIZE: usize> Default for BufferPool<N, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
