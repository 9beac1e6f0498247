use crate::bulk::BulkEndpoints;
use crate::bus::UsbBus;
use crate::device::{Config, UsbDevice};
use crate::endpoint::EndpointAddress;
use crate::{Result, UsbDirection};

/// Vendor ID and product ID, in that order.
pub struct UsbVidPid(pub u16, pub u16);

/// Collects the descriptor fields of a [`UsbDevice`] before it goes on the bus.
pub struct UsbDeviceBuilder<'a, B: UsbBus> {
    bus: &'a B,
    config: Config<'a>,
}

macro_rules! builder_fields {
    ( $( $(#[$meta:meta])* $name:ident: $type:ty, )* ) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self, $name: $type) -> &mut Self {
                self.config.$name = $name;
                self
            }
        )*
    }
}

impl<'a, B: UsbBus> UsbDeviceBuilder<'a, B> {
    /// Creates a builder for constructing a new [`UsbDevice`].
    pub fn new(bus: &'a B, vid_pid: UsbVidPid) -> UsbDeviceBuilder<'a, B> {
        UsbDeviceBuilder {
            bus,
            config: Config {
                device_class: 0x00,
                device_sub_class: 0x00,
                device_protocol: 0x00,
                max_packet_size_0: 64,
                vendor_id: vid_pid.0,
                product_id: vid_pid.1,
                device_release: 0x0010,
                manufacturer: None,
                product: None,
                serial_number: None,
                self_powered: false,
                max_power: 50,
                interface_class: 0xff,
                interface_sub_class: 0xff,
                interface_protocol: 0xff,
                bulk: BulkEndpoints::HIGH_SPEED,
            },
        }
    }

    builder_fields! {
        /// bDeviceClass. Default `0x00`, the interface carries the class.
        device_class: u8,

        /// bDeviceSubClass. Default `0x00`.
        device_sub_class: u8,

        /// bDeviceProtocol. Default `0x00`.
        device_protocol: u8,

        /// bcdDevice. Default `0x0010`.
        device_release: u16,

        /// Sets the self powered bit of bmAttributes in the configuration descriptor. What
        /// GET_STATUS reports is set separately with
        /// [`UsbDevice::set_self_powered`](crate::device::UsbDevice::set_self_powered).
        /// Default `false`.
        self_powered: bool,

        /// Sets the interface class code of the bulk interface.
        ///
        /// Default: `0xff` (vendor-specific)
        interface_class: u8,

        /// Sets the interface sub-class code of the bulk interface.
        ///
        /// Default: `0xff`
        interface_sub_class: u8,

        /// Sets the interface protocol code of the bulk interface.
        ///
        /// Default: `0xff`
        interface_protocol: u8,
    }

    /// Sets the manufacturer name string descriptor (string index 1).
    ///
    /// Default: (none)
    pub fn manufacturer(&mut self, manufacturer: &'a str) -> &mut Self {
        self.config.manufacturer = Some(manufacturer);
        self
    }

    /// Sets the product name string descriptor (string index 2).
    ///
    /// Default: (none)
    pub fn product(&mut self, product: &'a str) -> &mut Self {
        self.config.product = Some(product);
        self
    }

    /// Sets the serial number string descriptor (string index 3).
    ///
    /// Default: (none)
    pub fn serial_number(&mut self, serial_number: &'a str) -> &mut Self {
        self.config.serial_number = Some(serial_number);
        self
    }

    /// bMaxPacketSize0, one of 8, 16, 32 or 64. Default 64.
    ///
    /// # Panics
    ///
    /// On any other size.
    pub fn max_packet_size_0(&mut self, max_packet_size_0: u8) -> &mut Self {
        match max_packet_size_0 {
            8 | 16 | 32 | 64 => {}
            _ => panic!("invalid max_packet_size_0"),
        }

        self.config.max_packet_size_0 = max_packet_size_0;
        self
    }

    /// Bus current in milliamps, at most 500. Stored as bMaxPower in 2 mA units. Default 100 mA.
    ///
    /// # Panics
    ///
    /// Above 500 mA.
    pub fn max_power(&mut self, max_power_ma: usize) -> &mut Self {
        if max_power_ma > 500 {
            panic!("max_power above 500 mA")
        }

        self.config.max_power = (max_power_ma / 2) as u8;
        self
    }

    /// Sets the endpoint numbers of the bulk IN and bulk OUT endpoints.
    ///
    /// Default: 1 and 1 (addresses `0x81` and `0x01`)
    pub fn bulk_endpoints(&mut self, in_number: u8, out_number: u8) -> &mut Self {
        match (in_number, out_number) {
            (1..=15, 1..=15) => {}
            _ => panic!("invalid bulk endpoint number"),
        }

        self.config.bulk.in_address =
            EndpointAddress::from_parts(in_number as usize, UsbDirection::In);
        self.config.bulk.out_address =
            EndpointAddress::from_parts(out_number as usize, UsbDirection::Out);
        self
    }

    /// Sets the maximum packet size of both bulk endpoints.
    ///
    /// Valid values are 8, 16, 32 and 64 for full speed devices and 512 for high speed devices.
    ///
    /// Default: 512 bytes
    pub fn bulk_max_packet_size(&mut self, max_packet_size: u16) -> &mut Self {
        match max_packet_size {
            8 | 16 | 32 | 64 | 512 => {}
            _ => panic!("invalid bulk max_packet_size"),
        }

        self.config.bulk.max_packet_size = max_packet_size;
        self
    }

    /// Creates a [`UsbDevice`] with the settings in this builder and enables the bus.
    ///
    /// # Errors
    ///
    /// Whatever [`UsbBus::enable`] or opening endpoint 0 reports.
    pub fn build(&self) -> Result<UsbDevice<'a, B>> {
        UsbDevice::build(self.bus, self.config)
    }
}
