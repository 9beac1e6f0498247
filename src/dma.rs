use crate::buffer_pool::{Buffer, BufferId, BufferPool};
use crate::overflow::{OverflowBuffers, Slot};
use crate::{Result, UsbError};
use portable_atomic::{AtomicU32, Ordering};

/// A region of memory the DMA engine writes into.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DmaTarget {
    /// Start of the region.
    pub ptr: *mut u8,
    /// Length of the region in bytes.
    pub len: usize,
}

/// A ping-pong DMA engine with two target registers. Implement this for the peripheral that
/// produces the capture data.
///
/// The engine fills slot A, raises the half-complete interrupt for A and continues with slot B,
/// then back to A, without software intervention. Every target stays owned by the
/// [`DoubleBufferReceiver`] until it is replaced with [`set_target`](DoubleBufferDma::set_target)
/// or the engine is stopped.
pub trait DoubleBufferDma {
    /// Starts continuous reception, filling `a` first.
    ///
    /// # Errors
    ///
    /// * [`HardwareFailure`](crate::UsbError::HardwareFailure) - The engine could not be started.
    fn start(&mut self, a: DmaTarget, b: DmaTarget) -> Result<()>;

    /// Stops reception. No target is written after this returns.
    fn stop(&mut self);

    /// The slot the engine is currently filling. This is the hardware's view, read from its
    /// control register.
    fn active_slot(&self) -> Slot;

    /// Reprograms the target of `slot`. Only called for the slot the engine is not filling.
    fn set_target(&mut self, slot: Slot, target: DmaTarget);
}

/// Counters shared between the capture interrupts and the consumer.
pub struct CaptureEvents {
    completions: AtomicU32,
    dropped: AtomicU32,
}

impl CaptureEvents {
    /// Both counters at zero.
    pub const fn new() -> Self {
        CaptureEvents {
            completions: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Number of half-complete interrupts handled so far.
    pub fn completions(&self) -> u32 {
        self.completions.load(Ordering::Acquire)
    }

    /// Number of halves that were captured into an overflow buffer and discarded.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Spins until the completion counter differs from `seen` and returns the new value.
    pub fn wait_completion(&self, seen: u32) -> u32 {
        loop {
            let completions = self.completions();

            if completions != seen {
                return completions;
            }

            core::hint::spin_loop();
        }
    }

    fn completed(&self) {
        self.completions.fetch_add(1, Ordering::Release);
    }

    fn discarded(&self) {
        self.dropped.fetch_add(1, Ordering::Release);
    }
}

impl Default for CaptureEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a [`DoubleBufferDma`] engine from its two half-complete interrupts, moving filled
/// buffers to the pool's full queue and keeping both slots pointed at writable memory.
///
/// A slot holds either a pool [`Buffer`] or, when the pool had nothing to give, its overflow
/// buffer. The receiver never waits: capture continues and the overflowed data is lost.
pub struct DoubleBufferReceiver<'p, D: DoubleBufferDma, const N: usize, const SIZE: usize> {
    dma: D,
    pool: &'p BufferPool<N, SIZE>,
    overflow: &'p OverflowBuffers<SIZE>,
    events: &'p CaptureEvents,
    targets: [Option<Buffer<'p, SIZE>>; 2],
    running: bool,
}

impl<'p, D: DoubleBufferDma, const N: usize, const SIZE: usize> DoubleBufferReceiver<'p, D, N, SIZE> {
    /// Creates a stopped receiver.
    pub fn new(
        dma: D,
        pool: &'p BufferPool<N, SIZE>,
        overflow: &'p OverflowBuffers<SIZE>,
        events: &'p CaptureEvents,
    ) -> Self {
        DoubleBufferReceiver {
            dma,
            pool,
            overflow,
            events,
            targets: [None, None],
            running: false,
        }
    }

    /// Takes two empty buffers from the pool, or the overflow buffers if the pool is short, and
    /// starts the engine.
    ///
    /// # Errors
    ///
    /// * [`InvalidState`](crate::UsbError::InvalidState) - Already running.
    /// * Whatever the engine reports. The buffers go back to the pool.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(UsbError::InvalidState);
        }

        let a = self.prime(Slot::A);
        let b = self.prime(Slot::B);

        if let Err(err) = self.dma.start(a, b) {
            usb_warn!("DMA start failed: {:?}", err);
            self.release_targets();
            return Err(err);
        }

        self.running = true;
        usb_debug!("capture started");

        Ok(())
    }

    /// Stops the engine and returns the buffers it held to the empty queue. Their contents are
    /// discarded.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        self.dma.stop();
        self.running = false;
        self.release_targets();

        usb_debug!("capture stopped");
    }

    /// Whether the engine is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The buffer currently targeted by `slot`.
    pub fn target_id(&self, slot: Slot) -> BufferId {
        match &self.targets[slot.index()] {
            Some(buffer) => buffer.id(),
            None => BufferId::Overflow(slot),
        }
    }

    /// The DMA engine.
    pub fn dma(&self) -> &D {
        &self.dma
    }

    /// The DMA engine, for peripheral-specific operations.
    pub fn dma_mut(&mut self) -> &mut D {
        &mut self.dma
    }

    /// Call from the interrupt raised when slot A is full.
    pub fn on_half_a_complete(&mut self) {
        self.on_half_complete(Slot::A);
    }

    /// Call from the interrupt raised when slot B is full.
    pub fn on_half_b_complete(&mut self) {
        self.on_half_complete(Slot::B);
    }

    /// Handles the completion of `completed`: queues its buffer as full, unless it was the
    /// overflow buffer, and retargets the slot at a fresh empty buffer or the overflow buffer.
    ///
    /// An interrupt that was latched before [`stop`](DoubleBufferReceiver::stop) is ignored.
    ///
    /// # Panics
    ///
    /// If the engine is not now filling the other slot. That means the interrupts and the
    /// hardware disagree about which half completed, and the buffers can no longer be trusted.
    pub fn on_half_complete(&mut self, completed: Slot) {
        if !self.running {
            usb_debug!("ignoring completion of slot {:?} while stopped", completed);
            return;
        }

        let active = self.dma.active_slot();

        assert_eq!(
            active,
            completed.other(),
            "DMA reports slot {:?} active after {:?} completed",
            active,
            completed
        );

        match self.targets[completed.index()].take() {
            Some(buffer) => self.pool.give_full(buffer),
            None => self.events.discarded(),
        }

        let target = self.prime(completed);

        if self.targets[completed.index()].is_none() {
            usb_warn!("no empty buffer, slot {:?} captures into overflow", completed);
        }

        self.dma.set_target(completed, target);
        self.events.completed();
    }

    fn prime(&mut self, slot: Slot) -> DmaTarget {
        match self.pool.try_take_empty() {
            Some(mut buffer) => {
                let target = DmaTarget {
                    ptr: buffer.as_mut_ptr(),
                    len: SIZE,
                };
                self.targets[slot.index()] = Some(buffer);
                target
            }
            None => self.overflow.target(slot),
        }
    }

    fn release_targets(&mut self) {
        for target in self.targets.iter_mut() {
            if let Some(buffer) = target.take() {
                self.pool.give_empty(buffer);
            }
        }
    }
}

impl<D: DoubleBufferDma, const N: usize, const SIZE: usize> Drop
    for DoubleBufferReceiver<'_, D, N, SIZE>
{
    fn drop(&mut self) {
        self.stop();
    }
}
