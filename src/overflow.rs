use crate::dma::DmaTarget;
use core::cell::UnsafeCell;

/// One of the two target slots of a ping-pong DMA engine.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// The first target, filled first after start.
    A,
    /// The second target.
    B,
}

impl Slot {
    /// The slot the engine switches to after this one completes.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// 0 for A, 1 for B.
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// Two discard buffers, one per DMA slot, used as targets when the pool has no empty buffer.
///
/// Software never reads them: whatever the engine writes there is lost. They live outside the
/// receiver so that their addresses stay fixed while the engine holds them, e.g. in a `static`:
///
/// ``` ignore
/// static OVERFLOW: OverflowBuffers<512> = OverflowBuffers::new();
/// ```
pub struct OverflowBuffers<const SIZE: usize> {
    bufs: UnsafeCell<[[u8; SIZE]; 2]>,
}

// SAFETY: the contents are only ever written by the DMA engine through the raw pointers handed
// out by `target`; no reference to the bytes is ever created.
unsafe impl<const SIZE: usize> Sync for OverflowBuffers<SIZE> {}

impl<const SIZE: usize> OverflowBuffers<SIZE> {
    /// Reserves two zeroed discard buffers.
    pub const fn new() -> Self {
        OverflowBuffers {
            bufs: UnsafeCell::new([[0; SIZE]; 2]),
        }
    }

    /// The DMA target for the discard buffer of `slot`.
    pub fn target(&self, slot: Slot) -> DmaTarget {
        let base = self.bufs.get().cast::<[u8; SIZE]>();

        DmaTarget {
            // SAFETY: slot.index() is 0 or 1, inside the two-element array.
            ptr: unsafe { base.add(slot.index()) }.cast::<u8>(),
            len: SIZE,
        }
    }
}

impl<const SIZE: usize> Default for OverflowBuffers<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
