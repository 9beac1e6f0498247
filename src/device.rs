use crate::bulk::BulkEndpoints;
use crate::bus::{PollResult, UsbBus};
use crate::class::{ControlIn, ControlOut, UsbClass};
use crate::control::{self, Recipient, Request};
use crate::control_pipe::ControlPipe;
use crate::descriptor::{
    descriptor_type, lang_id, DescriptorWriter, CONFIGURATION_DESCRIPTOR_LEN,
    DEVICE_DESCRIPTOR_LEN,
};
use crate::endpoint::{EndpointAddress, EndpointType};
use crate::{Result, UsbDirection};
pub use crate::device_builder::{UsbDeviceBuilder, UsbVidPid};

/// Where the device is in enumeration. Suspension is tracked apart from this, see
/// [`UsbDevice::is_suspended`].
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbDeviceState {
    /// Freshly built or reset, answering at address 0.
    Default,

    /// SET_ADDRESS gave the device a non-zero address.
    Addressed,

    /// SET_CONFIGURATION(1) opened the bulk endpoints.
    Configured,
}

// Endpoint numbers per direction.
const MAX_ENDPOINTS: usize = 16;

/// The bConfigurationValue for the single configuration supported by this device.
pub const CONFIGURATION_VALUE: u8 = 1;

/// The bAlternateSetting of the single interface.
pub const DEFAULT_ALTERNATE_SETTING: u8 = 0;

#[derive(Copy, Clone)]
pub(crate) struct Config<'a> {
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub max_packet_size_0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_release: u16,
    pub manufacturer: Option<&'a str>,
    pub product: Option<&'a str>,
    pub serial_number: Option<&'a str>,
    pub self_powered: bool,
    pub max_power: u8,
    pub interface_class: u8,
    pub interface_sub_class: u8,
    pub interface_protocol: u8,
    pub bulk: BulkEndpoints,
}

/// A USB device with a single configuration holding one interface with a bulk IN and a bulk OUT
/// endpoint.
pub struct UsbDevice<'a, B: UsbBus> {
    bus: &'a B,
    config: Config<'a>,
    control: ControlPipe<'a, B>,
    device_descriptor: [u8; DEVICE_DESCRIPTOR_LEN],
    configuration_descriptor: [u8; CONFIGURATION_DESCRIPTOR_LEN],
    device_state: UsbDeviceState,
    suspended: bool,
    self_powered: bool,
    pending_address: Option<u8>,
}

type ClassList<'a, B> = [&'a mut dyn UsbClass<B>];

impl<'a, B: UsbBus> UsbDevice<'a, B> {
    pub(crate) fn build(bus: &'a B, config: Config<'a>) -> Result<UsbDevice<'a, B>> {
        let mut device_descriptor = [0u8; DEVICE_DESCRIPTOR_LEN];
        DescriptorWriter::new(&mut device_descriptor).device(&config)?;

        let mut configuration_descriptor = [0u8; CONFIGURATION_DESCRIPTOR_LEN];
        DescriptorWriter::new(&mut configuration_descriptor).configuration(&config)?;

        bus.enable()?;

        let mut control = ControlPipe::new(bus, config.max_packet_size_0);
        control.reset()?;

        Ok(UsbDevice {
            bus,
            config,
            control,
            device_descriptor,
            configuration_descriptor,
            device_state: UsbDeviceState::Default,
            suspended: false,
            self_powered: config.self_powered,
            pending_address: None,
        })
    }

    /// The enumeration state. Bulk traffic needs `Configured`.
    pub fn state(&self) -> UsbDeviceState {
        self.device_state
    }

    /// Gets whether the bus is currently suspended. Suspension does not change the device state.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Gets whether the device reports itself as self powered in GET_STATUS.
    pub fn self_powered(&self) -> bool {
        self.self_powered
    }

    /// Sets whether the device reports itself as self powered in GET_STATUS.
    pub fn set_self_powered(&mut self, is_self_powered: bool) {
        self.self_powered = is_self_powered;
    }

    /// The device descriptor as built at construction.
    pub fn device_descriptor(&self) -> &[u8] {
        &self.device_descriptor
    }

    /// The complete configuration descriptor as built at construction.
    pub fn configuration_descriptor(&self) -> &[u8] {
        &self.configuration_descriptor
    }

    /// The bulk endpoints opened by SET_CONFIGURATION.
    pub fn bulk_endpoints(&self) -> BulkEndpoints {
        self.config.bulk
    }

    /// Asks the bus to disconnect and reconnect, see [`UsbBus::force_reset`].
    pub fn force_reset(&mut self) -> Result<()> {
        self.bus.force_reset()
    }

    /// Polls the [`UsbBus`] for new events and dispatches them to the provided handlers. Returns
    /// true if one of the handlers may have data available for reading or be ready for writing,
    /// false otherwise. This should be called from the USB interrupt handler, or periodically as
    /// often as possible.
    ///
    /// The list of handlers passed in must be the same for every call while the device is
    /// configured:
    ///
    /// ``` ignore
    /// usb_dev.poll(&mut [&mut vendor, &mut bulk]);
    /// ```
    pub fn poll(&mut self, classes: &mut ClassList<'_, B>) -> bool {
        let pr = self.bus.poll();

        if self.suspended {
            match pr {
                PollResult::Suspend | PollResult::None => {
                    return false;
                }
                _ => {
                    self.bus.resume();
                    self.suspended = false;
                }
            }
        }

        match pr {
            PollResult::None => {}
            PollResult::Reset => self.reset(classes),
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            } => {
                // Endpoint 0 belongs to the control pipe
                if (ep_out | ep_in_complete | ep_setup) & 1 != 0 {
                    let req = if (ep_setup & 1) != 0 {
                        self.control.handle_setup()
                    } else if (ep_out & 1) != 0 {
                        self.control.handle_out()
                    } else {
                        None
                    };

                    match req {
                        Some(req) if req.direction == UsbDirection::In => {
                            self.control_in(classes, req)
                        }
                        Some(req) => self.control_out(classes, req),
                        None => (),
                    };

                    if (ep_in_complete & 1) != 0 {
                        let completed = self.control.handle_in_complete();

                        if completed {
                            if let Some(addr) = self.pending_address.take() {
                                self.set_address(addr);
                            }
                        }
                    }
                }

                let rest = (ep_out | ep_in_complete) & !1;

                for i in 1..MAX_ENDPOINTS {
                    let bit = 1u16 << i;

                    if rest >> i == 0 {
                        break;
                    }

                    if ep_out & bit != 0 {
                        let addr = EndpointAddress::from_parts(i, UsbDirection::Out);

                        for cls in classes.iter_mut() {
                            cls.endpoint_out(addr);
                        }
                    }

                    if ep_in_complete & bit != 0 {
                        let addr = EndpointAddress::from_parts(i, UsbDirection::In);

                        for cls in classes.iter_mut() {
                            cls.endpoint_in_complete(addr);
                        }
                    }
                }

                return true;
            }
            PollResult::Resume => {}
            PollResult::Suspend => {
                usb_debug!("bus suspended");
                self.bus.suspend();
                self.suspended = true;
            }
        }

        false
    }

    fn control_in(&mut self, classes: &mut ClassList<'_, B>, req: Request) {
        self.pending_address = None;

        for cls in classes.iter_mut() {
            cls.control_in(ControlIn::new(&mut self.control, req));

            if !self.control.waiting_for_response() {
                return;
            }
        }

        if req.request_type == control::RequestType::Standard {
            let configured = self.device_state == UsbDeviceState::Configured;
            let xfer = ControlIn::new(&mut self.control, req);

            match (req.recipient, req.request) {
                (Recipient::Device, Request::GET_STATUS) if req.length == 2 => {
                    let status: u16 = if self.self_powered { 0x0001 } else { 0x0000 };

                    xfer.accept_with(&status.to_le_bytes()).ok();
                }

                (Recipient::Interface, Request::GET_STATUS)
                    if configured && req.length == 2 && req.index == 0 =>
                {
                    let status: u16 = 0x0000;

                    xfer.accept_with(&status.to_le_bytes()).ok();
                }

                (Recipient::Endpoint, Request::GET_STATUS) if req.length == 2 => {
                    let ep_addr = EndpointAddress::from_request_index(req.index);

                    if ep_addr.index() == 0 || (configured && self.config.bulk.contains(ep_addr))
                    {
                        let status: u16 = if self.bus.is_stalled(ep_addr) {
                            0x0001
                        } else {
                            0x0000
                        };

                        xfer.accept_with(&status.to_le_bytes()).ok();
                    }
                }

                (Recipient::Device, Request::GET_DESCRIPTOR) => Self::get_descriptor(
                    &self.config,
                    &self.device_descriptor,
                    &self.configuration_descriptor,
                    xfer,
                ),

                (Recipient::Device, Request::GET_CONFIGURATION) => {
                    let value = if configured { CONFIGURATION_VALUE } else { 0 };

                    xfer.accept_with(&[value]).ok();
                }

                (Recipient::Interface, Request::GET_INTERFACE) if configured && req.index == 0 => {
                    xfer.accept_with(&[DEFAULT_ALTERNATE_SETTING]).ok();
                }

                _ => (),
            };
        }

        if self.control.waiting_for_response() {
            self.control.reject().ok();
        }
    }

    fn control_out(&mut self, classes: &mut ClassList<'_, B>, req: Request) {
        self.pending_address = None;

        for cls in classes.iter_mut() {
            cls.control_out(ControlOut::new(&mut self.control, req));

            if !self.control.waiting_for_response() {
                return;
            }
        }

        if req.request_type == control::RequestType::Standard && self.standard_out(classes, &req) {
            ControlOut::new(&mut self.control, req).accept().ok();
        }

        if self.control.waiting_for_response() {
            self.control.reject().ok();
        }
    }

    // Applies a standard OUT request. Returns false if the request must be stalled.
    fn standard_out(&mut self, classes: &mut ClassList<'_, B>, req: &Request) -> bool {
        let configured = self.device_state == UsbDeviceState::Configured;

        match (req.recipient, req.request, req.value) {
            (Recipient::Endpoint, Request::CLEAR_FEATURE, Request::FEATURE_ENDPOINT_HALT)
                if configured =>
            {
                let ep_addr = EndpointAddress::from_request_index(req.index);

                if ep_addr.index() == 0 {
                    true
                } else if self.config.bulk.contains(ep_addr) {
                    self.bus.set_stalled(ep_addr, false);
                    true
                } else {
                    false
                }
            }

            (Recipient::Endpoint, Request::SET_FEATURE, Request::FEATURE_ENDPOINT_HALT)
                if configured =>
            {
                let ep_addr = EndpointAddress::from_request_index(req.index);

                if self.config.bulk.contains(ep_addr) {
                    self.bus.set_stalled(ep_addr, true);
                    true
                } else {
                    false
                }
            }

            (Recipient::Device, Request::SET_ADDRESS, 0..=127)
                if req.index == 0 && req.length == 0 && !configured =>
            {
                let addr = req.value as u8;

                if B::QUIRK_SET_ADDRESS_BEFORE_STATUS {
                    self.set_address(addr);
                } else {
                    self.pending_address = Some(addr);
                }

                true
            }

            (Recipient::Device, Request::SET_CONFIGURATION, value) => {
                self.set_configuration(classes, value)
            }

            (Recipient::Interface, Request::SET_INTERFACE, value)
                if configured && req.index == 0 =>
            {
                value == DEFAULT_ALTERNATE_SETTING as u16
            }

            _ => false,
        }
    }

    fn set_configuration(&mut self, classes: &mut ClassList<'_, B>, value: u16) -> bool {
        if self.device_state == UsbDeviceState::Default {
            return false;
        }

        match value {
            0 => {
                self.close_bulk_endpoints();
                self.set_state(UsbDeviceState::Addressed);

                for cls in classes.iter_mut() {
                    cls.configured(false);
                }

                true
            }
            v if v == CONFIGURATION_VALUE as u16 => {
                if let Err(_err) = self.open_bulk_endpoints() {
                    usb_warn!("failed to open bulk endpoints: {:?}", _err);
                    self.close_bulk_endpoints();
                    return false;
                }

                self.set_state(UsbDeviceState::Configured);

                for cls in classes.iter_mut() {
                    cls.configured(true);
                }

                true
            }
            _ => false,
        }
    }

    fn reset(&mut self, classes: &mut ClassList<'_, B>) {
        usb_debug!("bus reset");

        self.bus.reset();

        self.set_state(UsbDeviceState::Default);
        self.suspended = false;
        self.pending_address = None;

        if let Err(_err) = self.control.reset() {
            usb_warn!("failed to open endpoint 0: {:?}", _err);
        }

        for cls in classes.iter_mut() {
            cls.reset();
        }
    }

    fn open_bulk_endpoints(&self) -> Result<()> {
        let bulk = self.config.bulk;

        self.bus
            .open_endpoint(bulk.in_address, EndpointType::Bulk, bulk.max_packet_size)?;
        self.bus
            .open_endpoint(bulk.out_address, EndpointType::Bulk, bulk.max_packet_size)?;

        Ok(())
    }

    fn close_bulk_endpoints(&self) {
        self.bus.close_endpoint(self.config.bulk.in_address);
        self.bus.close_endpoint(self.config.bulk.out_address);
    }

    fn set_address(&mut self, addr: u8) {
        self.bus.set_device_address(addr);

        self.set_state(if addr == 0 {
            UsbDeviceState::Default
        } else {
            UsbDeviceState::Addressed
        });
    }

    fn set_state(&mut self, state: UsbDeviceState) {
        if self.device_state != state {
            usb_debug!("device state {:?} -> {:?}", self.device_state, state);
        }

        self.device_state = state;
    }

    fn get_descriptor(
        config: &Config,
        device_descriptor: &[u8],
        configuration_descriptor: &[u8],
        xfer: ControlIn<B>,
    ) {
        let req = *xfer.request();

        let (dtype, index) = req.descriptor_type_index();

        fn accept_writer<B: UsbBus>(
            xfer: ControlIn<B>,
            f: impl FnOnce(&mut DescriptorWriter) -> Result<()>,
        ) {
            xfer.accept(|buf| {
                let mut writer = DescriptorWriter::new(buf);
                f(&mut writer)?;
                Ok(writer.position())
            })
            .ok();
        }

        match dtype {
            descriptor_type::DEVICE => {
                xfer.accept_with(device_descriptor).ok();
            }

            descriptor_type::CONFIGURATION => {
                xfer.accept_with(configuration_descriptor).ok();
            }

            descriptor_type::STRING => {
                if index == 0 {
                    accept_writer(xfer, |w| w.lang_ids(&[lang_id::ENGLISH_US]))
                } else {
                    let s = match index {
                        1 => config.manufacturer,
                        2 => config.product,
                        3 => config.serial_number,
                        _ => None,
                    };

                    if let Some(s) = s {
                        accept_writer(xfer, |w| w.string(s));
                    } else {
                        xfer.reject().ok();
                    }
                }
            }

            _ => {
                xfer.reject().ok();
            }
        }
    }
}
