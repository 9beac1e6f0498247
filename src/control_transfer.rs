use crate::bus::UsbBus;
use crate::control;
use crate::control_pipe::ControlPipe;
use crate::{Result, UsbError};

/// A device-to-host request offered to a handler. Answer it with data or a STALL by consuming the
/// handle. Dropping it unanswered leaves the request to the next handler, and finally to the
/// standard request handling of the device.
pub struct ControlIn<'p, 'a, B: UsbBus> {
    pipe: &'p mut ControlPipe<'a, B>,
    req: control::Request,
}

impl<'p, 'a, B: UsbBus> ControlIn<'p, 'a, B> {
    pub(crate) fn new(pipe: &'p mut ControlPipe<'a, B>, req: control::Request) -> Self {
        ControlIn { pipe, req }
    }

    /// The decoded SETUP packet.
    pub fn request(&self) -> &control::Request {
        &self.req
    }

    /// Accepts the transfer with the supplied buffer. Data longer than the request's wLength is
    /// truncated.
    pub fn accept_with(self, data: &[u8]) -> Result<()> {
        self.pipe.accept_in(|buf| {
            if data.len() > buf.len() {
                return Err(UsbError::BufferOverflow);
            }

            buf[..data.len()].copy_from_slice(data);

            Ok(data.len())
        })
    }

    /// Answers with whatever `f` writes into the control buffer. `f` returns the number of bytes
    /// written. An error from `f` stalls the pipe.
    pub fn accept(self, f: impl FnOnce(&mut [u8]) -> Result<usize>) -> Result<()> {
        self.pipe.accept_in(f)
    }

    /// Stalls both directions of endpoint 0 until the next SETUP.
    pub fn reject(self) -> Result<()> {
        self.pipe.reject()
    }
}

/// A host-to-device request offered to a handler, with its data stage already received. Consume
/// the handle to acknowledge or STALL it, or drop it to leave the request to the next handler.
pub struct ControlOut<'p, 'a, B: UsbBus> {
    pipe: &'p mut ControlPipe<'a, B>,
    req: control::Request,
}

impl<'p, 'a, B: UsbBus> ControlOut<'p, 'a, B> {
    pub(crate) fn new(pipe: &'p mut ControlPipe<'a, B>, req: control::Request) -> Self {
        ControlOut { pipe, req }
    }

    /// The decoded SETUP packet.
    pub fn request(&self) -> &control::Request {
        &self.req
    }

    /// The data stage. Empty when wLength was 0.
    pub fn data(&self) -> &[u8] {
        self.pipe.data()
    }

    /// Acknowledges the request with a zero-length status packet.
    pub fn accept(self) -> Result<()> {
        self.pipe.accept_out()
    }

    /// Stalls both directions of endpoint 0 until the next SETUP.
    pub fn reject(self) -> Result<()> {
        self.pipe.reject()
    }
}
