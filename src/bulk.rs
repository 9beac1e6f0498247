//! Bulk data consumer.
//!
//! [`BulkClass`] runs in the context that polls the [`UsbDevice`](crate::device::UsbDevice) and
//! turns endpoint events into [`BulkSignals`]. [`BulkPipe`] runs in a task: it waits on those
//! signals while it moves full buffers from the pool to the bulk IN endpoint, or reads the bulk
//! OUT endpoint into a caller's buffer. Only one transfer per direction is ever in flight.

use crate::buffer_pool::BufferPool;
use crate::bus::UsbBus;
use crate::class::UsbClass;
use crate::endpoint::EndpointAddress;
use crate::{Result, UsbError};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Addresses and packet size of the bulk endpoint pair.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkEndpoints {
    /// Bulk IN endpoint, device to host.
    pub in_address: EndpointAddress,
    /// Bulk OUT endpoint, host to device.
    pub out_address: EndpointAddress,
    /// wMaxPacketSize of both endpoints.
    pub max_packet_size: u16,
}

impl BulkEndpoints {
    /// Endpoints `0x81` and `0x01`, 512 byte packets.
    pub const HIGH_SPEED: BulkEndpoints = BulkEndpoints {
        in_address: EndpointAddress::from_parts(1, crate::UsbDirection::In),
        out_address: EndpointAddress::from_parts(1, crate::UsbDirection::Out),
        max_packet_size: 512,
    };

    pub(crate) fn contains(&self, ep_addr: EndpointAddress) -> bool {
        ep_addr == self.in_address || ep_addr == self.out_address
    }
}

impl Default for BulkEndpoints {
    fn default() -> Self {
        Self::HIGH_SPEED
    }
}

/// Flags raised by [`BulkClass`] and consumed by [`BulkPipe`].
pub struct BulkSignals {
    configured: AtomicBool,
    generation: AtomicU32,
    in_complete: AtomicBool,
    out_ready: AtomicBool,
}

impl BulkSignals {
    /// Not configured, nothing pending.
    pub const fn new() -> Self {
        BulkSignals {
            configured: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            in_complete: AtomicBool::new(false),
            out_ready: AtomicBool::new(false),
        }
    }

    /// Whether the host has selected the configuration and the bulk endpoints are open.
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    fn set_configured(&self, configured: bool) {
        // Any transfer started under the previous configuration is void.
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.in_complete.store(false, Ordering::Release);
        self.out_ready.store(false, Ordering::Release);
        self.configured.store(configured, Ordering::Release);
    }

    fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    // Ok while the configuration that was current at `generation` is still in place.
    fn check(&self, generation: u32) -> Result<()> {
        if self.is_configured() && self.generation() == generation {
            Ok(())
        } else {
            Err(UsbError::NotConfigured)
        }
    }
}

impl Default for BulkSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The interrupt side of the bulk consumer. Register it with
/// [`UsbDevice::poll`](crate::device::UsbDevice::poll).
pub struct BulkClass<'s> {
    signals: &'s BulkSignals,
    endpoints: BulkEndpoints,
}

impl<'s> BulkClass<'s> {
    /// Creates a handler that reports events on `endpoints` to `signals`.
    pub fn new(signals: &'s BulkSignals, endpoints: BulkEndpoints) -> Self {
        BulkClass { signals, endpoints }
    }
}

impl<B: UsbBus> UsbClass<B> for BulkClass<'_> {
    fn reset(&mut self) {
        self.signals.set_configured(false);
    }

    fn configured(&mut self, configured: bool) {
        self.signals.set_configured(configured);
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if addr == self.endpoints.out_address {
            self.signals.out_ready.store(true, Ordering::Release);
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.endpoints.in_address {
            self.signals.in_complete.store(true, Ordering::Release);
        }
    }
}

/// The task side of the bulk consumer.
pub struct BulkPipe<'a, B: UsbBus, const N: usize, const SIZE: usize> {
    bus: &'a B,
    pool: &'a BufferPool<N, SIZE>,
    signals: &'a BulkSignals,
    endpoints: BulkEndpoints,
}

impl<'a, B: UsbBus, const N: usize, const SIZE: usize> BulkPipe<'a, B, N, SIZE> {
    /// Creates a pipe on `endpoints`, which must be the endpoints `signals` is fed from.
    pub fn new(
        bus: &'a B,
        pool: &'a BufferPool<N, SIZE>,
        signals: &'a BulkSignals,
        endpoints: BulkEndpoints,
    ) -> Self {
        BulkPipe {
            bus,
            pool,
            signals,
            endpoints,
        }
    }

    /// Spins until the host has selected the configuration.
    pub fn wait_configured(&self) {
        while !self.signals.is_configured() {
            core::hint::spin_loop();
        }
    }

    /// Takes the oldest full buffer, waiting for one if needed, and sends it on the bulk IN
    /// endpoint one packet at a time. Returns the number of bytes sent. The buffer goes back to
    /// the empty queue whether or not the transfer succeeded.
    ///
    /// No zero-length packet follows: the host reads fixed `SIZE` byte transfers.
    ///
    /// # Errors
    ///
    /// * [`NotConfigured`](crate::UsbError::NotConfigured) - The device is not configured, or it
    ///   was reset or deconfigured during the transfer.
    /// * Whatever the bus reports for the write.
    pub fn transmit_next(&mut self) -> Result<usize> {
        let generation = self.signals.generation();
        self.signals.check(generation)?;

        let buffer = self.pool.take_full_blocking();
        let result = self.transmit(buffer.bytes(), generation);
        self.pool.give_empty(buffer);

        if let Err(_err) = result {
            usb_debug!("bulk IN transfer failed: {:?}", _err);
        }

        result
    }

    /// Receives one bulk OUT transfer into `buf`: packets are read until a short packet arrives or
    /// `buf` is full. Returns the number of bytes received.
    ///
    /// `buf` should be a multiple of the endpoint's packet size, otherwise a full packet that does
    /// not fit fails with `BufferOverflow`.
    ///
    /// # Errors
    ///
    /// * [`NotConfigured`](crate::UsbError::NotConfigured) - The device is not configured, or it
    ///   was reset or deconfigured during the transfer.
    /// * Whatever the bus reports for the read.
    pub fn receive_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let generation = self.signals.generation();
        self.signals.check(generation)?;

        let max_packet_size = self.endpoints.max_packet_size as usize;
        let mut received = 0;

        while received < buf.len() {
            self.wait_out_ready(generation)?;

            match self
                .bus
                .read(self.endpoints.out_address, &mut buf[received..])
            {
                Ok(count) => {
                    received += count;

                    if count < max_packet_size {
                        break;
                    }
                }
                Err(UsbError::WouldBlock) => {}
                Err(err) => {
                    usb_debug!("bulk OUT transfer failed: {:?}", err);
                    return Err(err);
                }
            }
        }

        Ok(received)
    }

    fn transmit(&self, data: &[u8], generation: u32) -> Result<usize> {
        let max_packet_size = self.endpoints.max_packet_size as usize;

        for packet in data.chunks(max_packet_size) {
            self.signals.in_complete.store(false, Ordering::Release);

            loop {
                self.signals.check(generation)?;

                match self.bus.write(self.endpoints.in_address, packet) {
                    Ok(_) => break,
                    Err(UsbError::WouldBlock) => core::hint::spin_loop(),
                    Err(err) => return Err(err),
                }
            }

            while !self.signals.in_complete.swap(false, Ordering::AcqRel) {
                self.signals.check(generation)?;
                core::hint::spin_loop();
            }
        }

        Ok(data.len())
    }

    fn wait_out_ready(&self, generation: u32) -> Result<()> {
        while !self.signals.out_ready.swap(false, Ordering::AcqRel) {
            self.signals.check(generation)?;
            core::hint::spin_loop();
        }

        self.signals.check(generation)
    }
}
