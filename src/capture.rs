//! The capture device: its USB identity and the pipeline sizes it ships with.
//!
//! ``` ignore
//! static POOL: CapturePool = CapturePool::new();
//! static OVERFLOW: CaptureOverflow = CaptureOverflow::new();
//! static EVENTS: CaptureEvents = CaptureEvents::new();
//! static SIGNALS: BulkSignals = BulkSignals::new();
//!
//! POOL.init();
//!
//! let mut usb_dev = capture::make_device(&bus)?;
//! let mut vendor = VendorEcho::new();
//! let mut bulk = BulkClass::new(&SIGNALS, usb_dev.bulk_endpoints());
//! let mut receiver = DoubleBufferReceiver::new(dma, &POOL, &OVERFLOW, &EVENTS);
//! receiver.start()?;
//!
//! // USB interrupt
//! usb_dev.poll(&mut [&mut vendor, &mut bulk]);
//!
//! // DMA half-complete interrupts
//! receiver.on_half_a_complete();
//! receiver.on_half_b_complete();
//!
//! // Consumer task
//! let mut pipe = BulkPipe::new(&bus, &POOL, &SIGNALS, BulkEndpoints::HIGH_SPEED);
//! pipe.wait_configured();
//! loop {
//!     pipe.transmit_next().ok();
//! }
//! ```

use crate::buffer_pool::{BufferPool, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE};
use crate::bus::UsbBus;
use crate::device::{UsbDevice, UsbDeviceBuilder, UsbVidPid};
use crate::overflow::OverflowBuffers;
use crate::Result;

/// Vendor ID of the capture device.
pub const VENDOR_ID: u16 = 0x1f00;

/// Product ID of the capture device.
pub const PRODUCT_ID: u16 = 0x2012;

/// bcdDevice of the capture device.
pub const DEVICE_RELEASE: u16 = 0x0001;

/// String descriptor 1.
pub const MANUFACTURER: &str = "MBr";

/// String descriptor 2.
pub const PRODUCT: &str = "EVK";

/// String descriptor 3.
pub const SERIAL_NUMBER: &str = "0001";

/// Bus current drawn, in milliamps.
pub const MAX_POWER_MA: usize = 100;

/// The buffer pool of the capture pipeline.
pub type CapturePool = BufferPool<DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE>;

/// The overflow buffers of the capture pipeline.
pub type CaptureOverflow = OverflowBuffers<DEFAULT_BUFFER_SIZE>;

/// The word the SPI master sends over and over, `"spi "` read little endian. The master is not
/// synchronized with the capture, so it arrives at an arbitrary bit offset.
pub const RX_PATTERN: u32 = u32::from_le_bytes(*b"spi ");

/// Whether `data` starts with [`RX_PATTERN`] at any of its 32 bit rotations.
pub fn rx_pattern_recognised(data: &[u8]) -> bool {
    let word = match data.get(..4).and_then(|b| <[u8; 4]>::try_from(b).ok()) {
        Some(bytes) => u32::from_le_bytes(bytes),
        None => return false,
    };

    (0..u32::BITS).any(|shift| RX_PATTERN.rotate_left(shift) == word)
}

/// Checks the oldest full buffer of `pool` for [`RX_PATTERN`] without taking it, copying it into
/// `scratch` first. Returns `None` if no buffer is full.
pub fn find_rx_pattern<const N: usize, const SIZE: usize>(
    pool: &BufferPool<N, SIZE>,
    scratch: &mut [u8; SIZE],
) -> Option<bool> {
    let id = pool.snapshot_full(scratch)?;
    let recognised = rx_pattern_recognised(&scratch[..]);

    if !recognised {
        usb_warn!("rx pattern unrecognised in {:?}", id);
    }

    Some(recognised)
}

/// Builds the capture device on `bus`: bus powered in its descriptor, but reporting self powered
/// in GET_STATUS like the hardware it describes, with endpoint 0 at 64 bytes and a 512 byte bulk
/// endpoint pair.
pub fn make_device<B: UsbBus>(bus: &B) -> Result<UsbDevice<'_, B>> {
    let mut device = UsbDeviceBuilder::new(bus, UsbVidPid(VENDOR_ID, PRODUCT_ID))
        .device_release(DEVICE_RELEASE)
        .manufacturer(MANUFACTURER)
        .product(PRODUCT)
        .serial_number(SERIAL_NUMBER)
        .max_packet_size_0(64)
        .max_power(MAX_POWER_MA)
        .build()?;

    device.set_self_powered(true);

    Ok(device)
}
