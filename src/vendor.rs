//! Vendor request 0: a bidirectional echo used by the host tooling to check the control pipe.
//!
//! Host to device, the payload is kept in a small receive buffer and compared with the expected
//! payload once the data stage is complete. Device to host, a fixed reply is returned, truncated
//! to the request's wLength.

use crate::bus::UsbBus;
use crate::class::{ControlIn, ControlOut, UsbClass};
use crate::control::{Recipient, RequestType};

/// Request code of the echo request.
pub const ECHO_REQUEST: u8 = 0;

/// The payload the host sends with the OUT echo request.
pub const EXPECTED_PAYLOAD: &[u8] = b"some data\0";

/// The reply to the IN echo request.
pub const REPLY: &[u8] = b"send request\0";

/// Capacity of the receive buffer. Longer payloads are truncated.
pub const RECEIVE_CAPACITY: usize = 64;

/// Handler for vendor request 0.
pub struct VendorEcho {
    buf: [u8; RECEIVE_CAPACITY],
    len: usize,
    received: bool,
    matches: u32,
    mismatches: u32,
}

impl VendorEcho {
    /// Creates a handler with an empty receive buffer.
    pub fn new() -> VendorEcho {
        VendorEcho {
            buf: [0; RECEIVE_CAPACITY],
            len: 0,
            received: false,
            matches: 0,
            mismatches: 0,
        }
    }

    /// The payload of the last OUT echo request, if one was received since the last reset.
    pub fn received(&self) -> Option<&[u8]> {
        if self.received {
            Some(&self.buf[..self.len])
        } else {
            None
        }
    }

    /// Number of OUT payloads that matched [`EXPECTED_PAYLOAD`].
    pub fn matches(&self) -> u32 {
        self.matches
    }

    /// Number of OUT payloads that did not match [`EXPECTED_PAYLOAD`].
    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    fn validate(&mut self) {
        if self.received && &self.buf[..self.len] == EXPECTED_PAYLOAD {
            self.matches += 1;
        } else {
            usb_warn!("vendor payload mismatch, {} bytes", self.len);
            self.mismatches += 1;
        }
    }
}

impl Default for VendorEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: UsbBus> UsbClass<B> for VendorEcho {
    fn reset(&mut self) {
        self.received = false;
        self.len = 0;
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if !(req.request_type == RequestType::Vendor && req.recipient == Recipient::Device) {
            return;
        }

        if req.request != ECHO_REQUEST {
            xfer.reject().ok();
            return;
        }

        let data = xfer.data();
        let len = data.len().min(RECEIVE_CAPACITY);

        self.buf[..len].copy_from_slice(&data[..len]);
        self.len = len;
        self.received = true;

        self.validate();

        xfer.accept().ok();
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if !(req.request_type == RequestType::Vendor && req.recipient == Recipient::Device) {
            return;
        }

        if req.request == ECHO_REQUEST {
            xfer.accept_with(REPLY).ok();
        } else {
            xfer.reject().ok();
        }
    }
}
