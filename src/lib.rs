//! Device-side USB stack for a single-configuration capture device, plus the interrupt-driven
//! double-buffer DMA pipeline that feeds it.
//!
//! The crate has two halves that meet at the [`BufferPool`](buffer_pool::BufferPool):
//!
//! * The capture side. A [`DoubleBufferReceiver`](dma::DoubleBufferReceiver) is driven by the two
//!   half-complete interrupts of a ping-pong DMA engine. It hands every filled buffer to the pool's
//!   full queue and re-targets the finished half at a fresh empty buffer, or at one of the two
//!   [`OverflowBuffers`](overflow::OverflowBuffers) when the consumer has fallen behind.
//! * The USB side. [`UsbDevice`](device::UsbDevice) runs the endpoint 0 control state machine
//!   (enumeration, standard requests, STALL on anything unsupported) and dispatches class and
//!   vendor requests and endpoint events to registered [`UsbClass`](class::UsbClass) handlers.
//!   [`BulkPipe`](bulk::BulkPipe) drains full buffers from the pool onto the bulk IN endpoint.
#![no_std]
#![warn(missing_docs)]

#[macro_use]
mod macros;

/// A USB stack error.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// An operation would block because the device is currently busy or there is no data available.
    WouldBlock,

    /// Parsing failed due to invalid input.
    ParseError,

    /// A buffer too short for the data to read was passed, or provided data cannot fit within
    /// length constraints.
    BufferOverflow,

    /// Classes attempted to use an endpoint that is not open or does not exist.
    InvalidEndpoint,

    /// Operation is not valid in device's current state.
    InvalidState,

    /// Operation is not supported by device or configuration.
    Unsupported,

    /// The bulk endpoints were closed by a bus reset or SET_CONFIGURATION(0) while a transfer was
    /// in progress, or before it could start.
    NotConfigured,

    /// A peripheral failed to start.
    HardwareFailure,
}

/// Result for USB operations.
pub type Result<T> = core::result::Result<T, UsbError>;

/// USB data flow direction.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum UsbDirection {
    /// Host to device (OUT)
    Out = 0x00,
    /// Device to host (IN)
    In = 0x80,
}

impl From<u8> for UsbDirection {
    fn from(value: u8) -> Self {
        if value & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

/// USB control transfers and the SETUP packet.
pub mod control;

/// For implementing peripheral drivers.
pub mod bus;

/// For implementing standard as well as vendor-specific USB classes.
pub mod class;

/// USB endpoints.
pub mod endpoint;

/// USB descriptors and the descriptor writer.
pub mod descriptor;

/// The USB device and its control state machine.
pub mod device;

/// Vendor request 0 handler.
pub mod vendor;

/// Fixed pool of capture buffers shared between interrupt and task context.
pub mod buffer_pool;

/// Statically reserved discard targets for the DMA engine.
pub mod overflow;

/// Double-buffered DMA reception.
pub mod dma;

/// Bulk data consumer.
pub mod bulk;

/// Identity and wiring of the capture device.
pub mod capture;

mod control_pipe;
mod control_transfer;
mod device_builder;

/// Prelude for device implementors.
pub mod prelude {
    pub use crate::buffer_pool::{Buffer, BufferId, BufferPool};
    pub use crate::bulk::{BulkClass, BulkEndpoints, BulkPipe, BulkSignals};
    pub use crate::device::{UsbDevice, UsbDeviceBuilder, UsbDeviceState, UsbVidPid};
    pub use crate::dma::{CaptureEvents, DmaTarget, DoubleBufferDma, DoubleBufferReceiver};
    pub use crate::overflow::{OverflowBuffers, Slot};
    pub use crate::vendor::VendorEcho;
    pub use crate::UsbError;
}

/// Prelude for class implementors.
pub mod class_prelude {
    pub use crate::bus::{PollResult, UsbBus};
    pub use crate::class::{ControlIn, ControlOut, UsbClass};
    pub use crate::control;
    pub use crate::descriptor::{lang_id, DescriptorWriter};
    pub use crate::endpoint::{EndpointAddress, EndpointType};
    pub use crate::{UsbDirection, UsbError};
}
