#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use usbd_capture::bus::{PollResult, UsbBus};
use usbd_capture::capture;
use usbd_capture::dma::{DmaTarget, DoubleBufferDma};
use usbd_capture::endpoint::{EndpointAddress, EndpointType};
use usbd_capture::overflow::Slot;
use usbd_capture::prelude::*;
use usbd_capture::{Result, UsbDirection};

pub const EP0_OUT: EndpointAddress = EndpointAddress::EP0_OUT;
pub const EP0_IN: EndpointAddress = EndpointAddress::EP0_IN;
pub const BULK_IN: EndpointAddress = EndpointAddress::from_parts(1, UsbDirection::In);
pub const BULK_OUT: EndpointAddress = EndpointAddress::from_parts(1, UsbDirection::Out);

const RETRIES: usize = 8;

/// What the host sees when a transaction does not go through.
#[derive(Debug, PartialEq, Eq)]
pub enum HostError {
    Stall,
    Nak,
    Closed,
}

#[derive(Default)]
struct OutEp {
    open: bool,
    ep_type: Option<EndpointType>,
    max_size: usize,
    stall: bool,
    packets: VecDeque<(Vec<u8>, bool)>,
}

#[derive(Default)]
struct InEp {
    open: bool,
    ep_type: Option<EndpointType>,
    max_size: usize,
    stall: bool,
    pending: Option<Vec<u8>>,
    complete: bool,
}

#[derive(Default)]
struct BusState {
    enabled: bool,
    address: u8,
    addresses: Vec<u8>,
    ep_out: [OutEp; 16],
    ep_in: [InEp; 16],
    reset: bool,
    suspend: bool,
    resume: bool,
    suspended: bool,
}

/// Packet level USB peripheral. The test plays the host through the `host_*` methods.
/// `QUIRK` selects whether the peripheral wants its address before the SET_ADDRESS status stage.
pub struct MockBus<const QUIRK: bool = false> {
    state: Mutex<BusState>,
}

impl<const QUIRK: bool> MockBus<QUIRK> {
    pub fn new() -> Self {
        MockBus {
            state: Mutex::new(BusState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap()
    }

    pub fn host_reset(&self) {
        self.state().reset = true;
    }

    pub fn host_suspend(&self) {
        self.state().suspend = true;
    }

    pub fn host_resume(&self) {
        self.state().resume = true;
    }

    /// A SETUP is always accepted and replaces anything left on endpoint 0.
    pub fn host_setup(&self, setup: [u8; 8]) {
        let mut s = self.state();

        s.ep_out[0].packets.clear();
        s.ep_out[0].packets.push_back((setup.to_vec(), true));
        s.ep_in[0].pending = None;
        s.ep_in[0].complete = false;
    }

    pub fn host_out(&self, ep_addr: EndpointAddress, data: &[u8]) -> std::result::Result<(), HostError> {
        let mut s = self.state();
        let ep = &mut s.ep_out[ep_addr.index()];

        if !ep.open {
            return Err(HostError::Closed);
        }

        if ep.stall {
            return Err(HostError::Stall);
        }

        assert!(data.len() <= ep.max_size, "host sent an oversized packet");

        ep.packets.push_back((data.to_vec(), false));

        Ok(())
    }

    pub fn host_in(&self, ep_addr: EndpointAddress) -> std::result::Result<Vec<u8>, HostError> {
        let mut s = self.state();
        let ep = &mut s.ep_in[ep_addr.index()];

        if !ep.open {
            return Err(HostError::Closed);
        }

        if ep.stall {
            return Err(HostError::Stall);
        }

        match ep.pending.take() {
            Some(data) => {
                ep.complete = true;
                Ok(data)
            }
            None => Err(HostError::Nak),
        }
    }

    /// Whether the device has an IN packet waiting for the host on `ep_addr`.
    pub fn has_pending_in(&self, ep_addr: EndpointAddress) -> bool {
        self.state().ep_in[ep_addr.index()].pending.is_some()
    }

    pub fn address(&self) -> u8 {
        self.state().address
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.state().addresses.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn is_suspended(&self) -> bool {
        self.state().suspended
    }

    pub fn is_open(&self, ep_addr: EndpointAddress) -> bool {
        let s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => s.ep_in[ep_addr.index()].open,
            UsbDirection::Out => s.ep_out[ep_addr.index()].open,
        }
    }

    pub fn endpoint_type(&self, ep_addr: EndpointAddress) -> Option<EndpointType> {
        let s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => s.ep_in[ep_addr.index()].ep_type,
            UsbDirection::Out => s.ep_out[ep_addr.index()].ep_type,
        }
    }
}

impl<const QUIRK: bool> Default for MockBus<QUIRK> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const QUIRK: bool> UsbBus for MockBus<QUIRK> {
    fn enable(&self) -> Result<()> {
        self.state().enabled = true;
        Ok(())
    }

    fn reset(&self) {
        let mut s = self.state();

        s.address = 0;
        s.ep_out = Default::default();
        s.ep_in = Default::default();
    }

    fn set_device_address(&self, addr: u8) {
        let mut s = self.state();

        s.address = addr;
        s.addresses.push(addr);
    }

    fn open_endpoint(
        &self,
        ep_addr: EndpointAddress,
        ep_type: EndpointType,
        max_packet_size: u16,
    ) -> Result<()> {
        if ep_addr.index() >= 16 {
            return Err(UsbError::InvalidEndpoint);
        }

        let mut s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => {
                s.ep_in[ep_addr.index()] = InEp {
                    open: true,
                    ep_type: Some(ep_type),
                    max_size: max_packet_size as usize,
                    ..Default::default()
                }
            }
            UsbDirection::Out => {
                s.ep_out[ep_addr.index()] = OutEp {
                    open: true,
                    ep_type: Some(ep_type),
                    max_size: max_packet_size as usize,
                    ..Default::default()
                }
            }
        }

        Ok(())
    }

    fn close_endpoint(&self, ep_addr: EndpointAddress) {
        let mut s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => s.ep_in[ep_addr.index()] = InEp::default(),
            UsbDirection::Out => s.ep_out[ep_addr.index()] = OutEp::default(),
        }
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
        let mut s = self.state();
        let ep = &mut s.ep_in[ep_addr.index()];

        if !ep.open || ep_addr.is_out() {
            return Err(UsbError::InvalidEndpoint);
        }

        if buf.len() > ep.max_size {
            return Err(UsbError::BufferOverflow);
        }

        if ep.pending.is_some() {
            return Err(UsbError::WouldBlock);
        }

        ep.pending = Some(buf.to_vec());

        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
        let mut s = self.state();
        let ep = &mut s.ep_out[ep_addr.index()];

        if !ep.open || ep_addr.is_in() {
            return Err(UsbError::InvalidEndpoint);
        }

        let (data, _) = ep.packets.pop_front().ok_or(UsbError::WouldBlock)?;

        if data.len() > buf.len() {
            return Err(UsbError::BufferOverflow);
        }

        buf[..data.len()].copy_from_slice(&data);

        Ok(data.len())
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        let mut s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => s.ep_in[ep_addr.index()].stall = stalled,
            UsbDirection::Out => s.ep_out[ep_addr.index()].stall = stalled,
        }
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        let s = self.state();

        match ep_addr.direction() {
            UsbDirection::In => s.ep_in[ep_addr.index()].stall,
            UsbDirection::Out => s.ep_out[ep_addr.index()].stall,
        }
    }

    fn suspend(&self) {
        self.state().suspended = true;
    }

    fn resume(&self) {
        self.state().suspended = false;
    }

    fn poll(&self) -> PollResult {
        let mut s = self.state();

        if s.reset {
            s.reset = false;
            return PollResult::Reset;
        }

        if s.suspend {
            s.suspend = false;
            return PollResult::Suspend;
        }

        if s.resume {
            s.resume = false;
            return PollResult::Resume;
        }

        let mut ep_out = 0u16;
        let mut ep_in_complete = 0u16;
        let mut ep_setup = 0u16;

        for i in 0..16 {
            match s.ep_out[i].packets.front() {
                Some((_, true)) => ep_setup |= 1 << i,
                Some((_, false)) => ep_out |= 1 << i,
                None => {}
            }

            if s.ep_in[i].complete {
                s.ep_in[i].complete = false;
                ep_in_complete |= 1 << i;
            }
        }

        if ep_out | ep_in_complete | ep_setup != 0 {
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            }
        } else {
            PollResult::None
        }
    }

    const QUIRK_SET_ADDRESS_BEFORE_STATUS: bool = QUIRK;
}

pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let mut packet = [0u8; 8];

    packet[0] = request_type;
    packet[1] = request;
    packet[2..4].copy_from_slice(&value.to_le_bytes());
    packet[4..6].copy_from_slice(&index.to_le_bytes());
    packet[6..8].copy_from_slice(&length.to_le_bytes());

    packet
}

/// The capture device on a mock bus, with its two handlers.
pub struct Fixture<'a, const QUIRK: bool = false> {
    pub bus: &'a MockBus<QUIRK>,
    pub device: UsbDevice<'a, MockBus<QUIRK>>,
    pub vendor: VendorEcho,
    pub bulk: BulkClass<'a>,
}

impl<'a, const QUIRK: bool> Fixture<'a, QUIRK> {
    pub fn new(bus: &'a MockBus<QUIRK>, signals: &'a BulkSignals) -> Self {
        Self::with_device(bus, capture::make_device(bus).expect("build device"), signals)
    }

    pub fn with_device(
        bus: &'a MockBus<QUIRK>,
        device: UsbDevice<'a, MockBus<QUIRK>>,
        signals: &'a BulkSignals,
    ) -> Self {
        let bulk = BulkClass::new(signals, device.bulk_endpoints());

        Fixture {
            bus,
            device,
            vendor: VendorEcho::new(),
            bulk,
        }
    }

    pub fn poll(&mut self) -> bool {
        self.device.poll(&mut [&mut self.vendor, &mut self.bulk])
    }

    pub fn reset(&mut self) {
        self.bus.host_reset();
        self.poll();
    }

    fn max_packet_size_0(&self) -> usize {
        self.device.device_descriptor()[7] as usize
    }

    fn host_in_retry(&mut self, ep_addr: EndpointAddress) -> std::result::Result<Vec<u8>, HostError> {
        for _ in 0..RETRIES {
            match self.bus.host_in(ep_addr) {
                Err(HostError::Nak) => {
                    self.poll();
                }
                res => return res,
            }
        }

        Err(HostError::Nak)
    }

    /// Runs a control read: SETUP, IN data packets until a short one or wLength, OUT status.
    pub fn control_in(&mut self, setup: [u8; 8]) -> std::result::Result<Vec<u8>, HostError> {
        let length = u16::from_le_bytes([setup[6], setup[7]]) as usize;
        let mps = self.max_packet_size_0();

        self.bus.host_setup(setup);
        self.poll();

        let mut data = Vec::new();

        if length == 0 {
            let status = self.host_in_retry(EP0_IN)?;
            assert!(status.is_empty(), "status stage carried data");
            self.poll();

            return Ok(data);
        }

        loop {
            let packet = self.host_in_retry(EP0_IN)?;
            self.poll();

            data.extend_from_slice(&packet);

            if packet.len() < mps || data.len() >= length {
                break;
            }
        }

        self.bus.host_out(EP0_OUT, &[])?;
        self.poll();

        Ok(data)
    }

    /// Runs a control write: SETUP, OUT data packets, IN status.
    pub fn control_out(&mut self, setup: [u8; 8], data: &[u8]) -> std::result::Result<(), HostError> {
        let mps = self.max_packet_size_0();

        self.bus.host_setup(setup);
        self.poll();

        for packet in data.chunks(mps) {
            self.bus.host_out(EP0_OUT, packet)?;
            self.poll();
        }

        let status = self.host_in_retry(EP0_IN)?;
        assert!(status.is_empty(), "status stage carried data");
        self.poll();

        Ok(())
    }

    pub fn set_address(&mut self, addr: u8) -> std::result::Result<(), HostError> {
        self.control_out(setup(0x00, 5, addr as u16, 0, 0), &[])
    }

    pub fn set_configuration(&mut self, value: u8) -> std::result::Result<(), HostError> {
        self.control_out(setup(0x00, 9, value as u16, 0, 0), &[])
    }

    /// Reset, SET_ADDRESS(5), SET_CONFIGURATION(1).
    pub fn enumerate(&mut self) {
        self.reset();
        self.set_address(5).expect("set address");
        self.set_configuration(1).expect("set configuration");
        assert_eq!(self.device.state(), UsbDeviceState::Configured);
    }
}

/// A ping-pong DMA engine that fills its targets when told to.
pub struct MockDma {
    targets: [Option<DmaTarget>; 2],
    active: Slot,
    running: bool,
    fail_start: bool,
}

impl MockDma {
    pub fn new() -> Self {
        MockDma {
            targets: [None, None],
            active: Slot::A,
            running: false,
            fail_start: false,
        }
    }

    pub fn failing() -> Self {
        MockDma {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn target(&self, slot: Slot) -> Option<DmaTarget> {
        self.targets[slot.index()]
    }

    /// Fills the active target with `value` and switches to the other slot, like the hardware at
    /// the end of a half. Returns the slot that completed.
    pub fn fill(&mut self, value: u8) -> Slot {
        assert!(self.running, "fill while stopped");

        let completed = self.active;
        let target = self.targets[completed.index()].expect("no target");

        // SAFETY: the receiver keeps the target valid and exclusively ours while running.
        unsafe { core::ptr::write_bytes(target.ptr, value, target.len) };

        self.active = completed.other();
        completed
    }

    /// Switches slots without a completion interrupt having been handled, to fake a disagreement.
    pub fn skip(&mut self) {
        self.active = self.active.other();
    }
}

impl DoubleBufferDma for MockDma {
    fn start(&mut self, a: DmaTarget, b: DmaTarget) -> Result<()> {
        if self.fail_start {
            return Err(UsbError::HardwareFailure);
        }

        self.targets = [Some(a), Some(b)];
        self.active = Slot::A;
        self.running = true;

        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.targets = [None, None];
    }

    fn active_slot(&self) -> Slot {
        self.active
    }

    fn set_target(&mut self, slot: Slot, target: DmaTarget) {
        assert_ne!(slot, self.active, "retargeted the slot being filled");
        self.targets[slot.index()] = Some(target);
    }
}
