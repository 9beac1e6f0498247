use crate::endpoint::{EndpointAddress, EndpointType};
use crate::{Result, UsbError};

/// The USB peripheral of the capture device, seen one packet at a time.
///
/// One `&UsbBus` is handed to the [`UsbDevice`](crate::device::UsbDevice) in the USB interrupt
/// and another to the [`BulkPipe`](crate::bulk::BulkPipe) in task context, so every method takes
/// `&self` and implementations keep their state behind interior mutability. Endpoint 0 is only
/// ever used by the device and the bulk endpoints only by the pipe.
pub trait UsbBus: Sized {
    /// Powers up the peripheral and connects to the bus. The host resets the device shortly after.
    ///
    /// # Errors
    ///
    /// * [`HardwareFailure`](crate::UsbError::HardwareFailure) - The peripheral did not come up.
    ///   Nothing at runtime recovers from this.
    fn enable(&self) -> Result<()>;

    /// Returns the peripheral to its just-enumerating state after a bus reset: address 0, every
    /// endpoint closed, no STALL. The device opens endpoint 0 again right after.
    fn reset(&self);

    /// Programs the device address the peripheral answers to.
    fn set_device_address(&self, addr: u8);

    /// Configures `ep_addr` for `ep_type` transfers of up to `max_packet_size` bytes per packet.
    /// An OUT endpoint accepts a packet from the moment it is open. Reopening an open endpoint
    /// reconfigures it and clears its STALL.
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - The hardware has no such endpoint,
    ///   or it cannot carry `ep_type` transfers.
    fn open_endpoint(
        &self,
        ep_addr: EndpointAddress,
        ep_type: EndpointType,
        max_packet_size: u16,
    ) -> Result<()>;

    /// Disables `ep_addr` and drops whatever packets it still holds.
    fn close_endpoint(&self, ep_addr: EndpointAddress);

    /// Queues one packet on IN endpoint `ep_addr`. Returns the number of bytes queued.
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - `ep_addr` is not an open IN
    ///   endpoint.
    /// * [`WouldBlock`](crate::UsbError::WouldBlock) - The previous packet has not gone out yet.
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - `buf` is larger than the endpoint's
    ///   packet size.
    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize>;

    /// Takes the oldest received packet from OUT endpoint `ep_addr` into `buf` and rearms the
    /// endpoint. Returns the packet length, which is 0 for a zero-length packet.
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - `ep_addr` is not an open OUT
    ///   endpoint.
    /// * [`WouldBlock`](crate::UsbError::WouldBlock) - Nothing has been received.
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - The packet does not fit in `buf`.
    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize>;

    /// Sets or clears STALL on `ep_addr`. A cleared OUT endpoint accepts packets again.
    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool);

    /// Whether `ep_addr` answers with STALL.
    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool;

    /// Enters low power mode after the device saw [`PollResult::Suspend`].
    fn suspend(&self) {}

    /// Leaves low power mode. Only called while suspended.
    fn resume(&self) {}

    /// Reports what happened on the bus since the last call.
    fn poll(&self) -> PollResult;

    /// Drops off the bus and reconnects so the host enumerates the device again.
    ///
    /// # Errors
    ///
    /// * [`Unsupported`](crate::UsbError::Unsupported) - The peripheral cannot do this. This is
    ///   what the provided implementation returns.
    fn force_reset(&self) -> Result<()> {
        Err(UsbError::Unsupported)
    }

    /// Set when the peripheral needs its new address before the status stage of SET_ADDRESS
    /// goes out. By default the address is applied once the status stage completes.
    const QUIRK_SET_ADDRESS_BEFORE_STATUS: bool = false;
}

/// Bus events reported by [`UsbBus::poll`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PollResult {
    /// Nothing happened.
    None,

    /// The host reset the bus.
    Reset,

    /// Endpoint activity. Bit `n` of each field stands for endpoint `n`.
    Data {
        /// An OUT packet is waiting. Reported until the packet is read.
        ep_out: u16,

        /// An IN packet was taken by the host. Reported once per packet.
        ep_in_complete: u16,

        /// A SETUP packet is waiting. Reported until the packet is read. The `ep_out` bit of the
        /// same endpoint is ignored meanwhile.
        ep_setup: u16,
    },

    /// The bus went idle, or a self powered device lost VBUS.
    Suspend,

    /// Bus activity resumed after a suspend.
    Resume,
}
