use crate::bus::UsbBus;
use crate::control::Request;
use crate::endpoint::{EndpointAddress, EndpointType};
use crate::{Result, UsbDirection, UsbError};
use core::cmp::min;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ControlState {
    Idle,
    DataIn,
    DataInZlp,
    DataInLast,
    CompleteIn,
    StatusOut,
    CompleteOut,
    DataOut,
    StatusIn,
    Error,
}

// Longest data stage the pipe can hold. OUT requests longer than this are stalled.
#[cfg(not(feature = "control-buffer-256"))]
const CONTROL_BUF_LEN: usize = 128;
#[cfg(feature = "control-buffer-256")]
const CONTROL_BUF_LEN: usize = 256;

/// Buffers and parses USB control transfers on endpoint 0.
pub(crate) struct ControlPipe<'a, B: UsbBus> {
    bus: &'a B,
    max_packet_size: usize,
    state: ControlState,
    request: Option<Request>,
    buf: [u8; CONTROL_BUF_LEN],
    i: usize,
    len: usize,
}

impl<'a, B: UsbBus> ControlPipe<'a, B> {
    pub fn new(bus: &'a B, max_packet_size: u8) -> ControlPipe<'a, B> {
        ControlPipe {
            bus,
            max_packet_size: max_packet_size as usize,
            state: ControlState::Idle,
            request: None,
            buf: [0; CONTROL_BUF_LEN],
            i: 0,
            len: 0,
        }
    }

    pub fn waiting_for_response(&self) -> bool {
        matches!(self.state, ControlState::CompleteOut | ControlState::CompleteIn)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[0..self.len]
    }

    /// Opens both directions of endpoint 0 and forgets any transfer in progress.
    pub fn reset(&mut self) -> Result<()> {
        let mps = self.max_packet_size as u16;

        self.bus
            .open_endpoint(EndpointAddress::EP0_OUT, EndpointType::Control, mps)?;
        self.bus
            .open_endpoint(EndpointAddress::EP0_IN, EndpointType::Control, mps)?;

        self.state = ControlState::Idle;
        self.request = None;
        self.i = 0;
        self.len = 0;

        Ok(())
    }

    pub fn handle_setup(&mut self) -> Option<Request> {
        let mut packet = [0u8; 8];

        let count = match self.bus.read(EndpointAddress::EP0_OUT, &mut packet) {
            Ok(count) => count,
            Err(UsbError::WouldBlock) => return None,
            Err(_) => {
                self.set_error();
                return None;
            }
        };

        let req = match Request::parse(&packet[..count]) {
            Ok(req) => req,
            Err(_) => {
                self.set_error();
                return None;
            }
        };

        // A SETUP always ends whatever transfer was in progress, including a stalled one.
        self.bus.set_stalled(EndpointAddress::EP0_OUT, false);
        self.bus.set_stalled(EndpointAddress::EP0_IN, false);

        usb_trace!(
            "SETUP {:?} {:?} {:?} req:{} val:{} idx:{} len:{} {:?}",
            req.direction,
            req.request_type,
            req.recipient,
            req.request,
            req.value,
            req.index,
            req.length,
            self.state
        );

        self.request = Some(req);

        match (req.direction, req.length as usize) {
            (UsbDirection::In, _) => {
                self.state = ControlState::CompleteIn;
                Some(req)
            }
            (UsbDirection::Out, 0) => {
                self.len = 0;
                self.state = ControlState::CompleteOut;
                Some(req)
            }
            (UsbDirection::Out, length) if length > CONTROL_BUF_LEN => {
                self.set_error();
                None
            }
            (UsbDirection::Out, length) => {
                self.i = 0;
                self.len = length;
                self.state = ControlState::DataOut;
                None
            }
        }
    }

    pub fn handle_out(&mut self) -> Option<Request> {
        match self.state {
            ControlState::DataOut => {
                let count = match self
                    .bus
                    .read(EndpointAddress::EP0_OUT, &mut self.buf[self.i..self.len])
                {
                    Ok(count) => count,
                    Err(UsbError::WouldBlock) => return None,
                    Err(_) => {
                        // More data than wLength announced
                        self.set_error();
                        return None;
                    }
                };

                self.i += count;

                if self.i >= self.len || count < self.max_packet_size {
                    self.len = self.i;
                    self.state = ControlState::CompleteOut;
                    return self.request;
                }
            }
            ControlState::StatusOut => {
                self.bus.read(EndpointAddress::EP0_OUT, &mut []).ok();
                self.state = ControlState::Idle;
            }
            _ => {
                // OUT packet outside a data or status stage
                self.bus.read(EndpointAddress::EP0_OUT, &mut self.buf).ok();
                self.set_error();
            }
        }

        None
    }

    /// Advances the transfer after an IN packet on endpoint 0 went out. Returns true when the
    /// packet was the status stage of a control OUT transfer, i.e. the transfer is now complete.
    pub fn handle_in_complete(&mut self) -> bool {
        match self.state {
            ControlState::DataIn => {
                self.write_in_chunk();
            }
            ControlState::DataInZlp => {
                if self.bus.write(EndpointAddress::EP0_IN, &[]).is_err() {
                    // Retried on the next IN completion or the host's retry.
                    return false;
                }

                self.state = ControlState::DataInLast;
            }
            ControlState::DataInLast => {
                // The host acknowledges the data with a zero-length OUT packet.
                self.bus.set_stalled(EndpointAddress::EP0_OUT, false);
                self.state = ControlState::StatusOut;
            }
            ControlState::StatusIn => {
                self.state = ControlState::Idle;
                return true;
            }
            ControlState::Idle | ControlState::Error => {}
            _ => {
                // IN completion outside a data or status stage
                self.set_error();
            }
        };

        false
    }

    fn write_in_chunk(&mut self) {
        let count = min(self.len - self.i, self.max_packet_size);

        if self
            .bus
            .write(EndpointAddress::EP0_IN, &self.buf[self.i..(self.i + count)])
            .is_err()
        {
            return;
        };

        self.i += count;

        if self.i >= self.len {
            let requested = self.request.map(|req| req.length as usize).unwrap_or(0);

            self.state = if count == self.max_packet_size && self.len < requested {
                ControlState::DataInZlp
            } else {
                ControlState::DataInLast
            };
        }
    }

    pub fn accept_out(&mut self) -> Result<()> {
        match self.state {
            ControlState::CompleteOut => {}
            _ => return Err(UsbError::InvalidState),
        };

        self.bus.write(EndpointAddress::EP0_IN, &[]).ok();
        self.state = ControlState::StatusIn;
        Ok(())
    }

    pub fn accept_in(&mut self, f: impl FnOnce(&mut [u8]) -> Result<usize>) -> Result<()> {
        let req = match (&self.state, self.request) {
            (ControlState::CompleteIn, Some(req)) => req,
            _ => return Err(UsbError::InvalidState),
        };

        let len = match f(&mut self.buf[..]) {
            Ok(len) => len,
            Err(err) => {
                self.set_error();
                return Err(err);
            }
        };

        if len > self.buf.len() {
            self.set_error();
            return Err(UsbError::BufferOverflow);
        }

        self.start_in_transfer(req, len);

        Ok(())
    }

    fn start_in_transfer(&mut self, req: Request, data_len: usize) {
        if req.length == 0 {
            // No data stage, go straight to the status stage.
            self.len = 0;
            self.bus.write(EndpointAddress::EP0_IN, &[]).ok();
            self.state = ControlState::StatusIn;
            return;
        }

        self.len = min(data_len, req.length as usize);
        self.i = 0;
        self.state = ControlState::DataIn;
        self.write_in_chunk();
    }

    pub fn reject(&mut self) -> Result<()> {
        if !self.waiting_for_response() {
            return Err(UsbError::InvalidState);
        }

        self.set_error();
        Ok(())
    }

    fn set_error(&mut self) {
        usb_debug!("control pipe STALL, request {:?}", self.request);

        self.state = ControlState::Error;
        self.bus.set_stalled(EndpointAddress::EP0_OUT, true);
        self.bus.set_stalled(EndpointAddress::EP0_IN, true);
    }
}
