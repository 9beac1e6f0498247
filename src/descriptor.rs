use crate::device::{Config, CONFIGURATION_VALUE, DEFAULT_ALTERNATE_SETTING};
use crate::endpoint::EndpointAddress;
use crate::{Result, UsbError};

/// Standard descriptor types
#[allow(missing_docs)]
pub mod descriptor_type {
    pub const DEVICE: u8 = 1;
    pub const CONFIGURATION: u8 = 2;
    pub const STRING: u8 = 3;
    pub const INTERFACE: u8 = 4;
    pub const ENDPOINT: u8 = 5;
    pub const DEVICE_QUALIFIER: u8 = 6;
}

/// String descriptor language IDs.
pub mod lang_id {
    /// English (US)
    ///
    /// Recommended for use as the first language ID for compatibility.
    pub const ENGLISH_US: u16 = 0x0409;
}

/// Length of the device descriptor.
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;

/// Length of the complete configuration descriptor: the configuration header, one interface and
/// its two bulk endpoints.
pub const CONFIGURATION_DESCRIPTOR_LEN: usize = 9 + 9 + 7 + 7;

const USB_SPEC_RELEASE: u16 = 0x0200;

/// A writer for USB descriptors.
pub struct DescriptorWriter<'a> {
    buf: &'a mut [u8],
    position: usize,
}

impl<'a> DescriptorWriter<'a> {
    /// Creates a writer that starts at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> DescriptorWriter<'a> {
        DescriptorWriter { buf, position: 0 }
    }

    /// Gets the current position in the buffer, i.e. the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Writes an arbitrary (usually class-specific) descriptor.
    pub fn write(&mut self, descriptor_type: u8, descriptor: &[u8]) -> Result<()> {
        let length = descriptor.len();

        if (self.position + 2 + length) > self.buf.len() || (length + 2) > 255 {
            return Err(UsbError::BufferOverflow);
        }

        self.buf[self.position] = (length + 2) as u8;
        self.buf[self.position + 1] = descriptor_type;

        let start = self.position + 2;

        self.buf[start..start + length].copy_from_slice(descriptor);

        self.position = start + length;

        Ok(())
    }

    /// Writes a string descriptor, UTF-16LE encoded.
    pub fn string(&mut self, string: &str) -> Result<()> {
        let mut pos = self.position;

        if pos + 2 > self.buf.len() {
            return Err(UsbError::BufferOverflow);
        }

        self.buf[pos + 1] = descriptor_type::STRING;
        pos += 2;

        for c in string.encode_utf16() {
            if pos + 2 > self.buf.len() {
                return Err(UsbError::BufferOverflow);
            }

            self.buf[pos..pos + 2].copy_from_slice(&c.to_le_bytes());
            pos += 2;
        }

        let length = pos - self.position;

        if length > 255 {
            return Err(UsbError::BufferOverflow);
        }

        self.buf[self.position] = length as u8;
        self.position = pos;

        Ok(())
    }

    /// Writes the string descriptor zero, which lists the supported language IDs.
    pub fn lang_ids(&mut self, lang_ids: &[u16]) -> Result<()> {
        let mut ids = [0u8; 8];

        if lang_ids.len() * 2 > ids.len() {
            return Err(UsbError::BufferOverflow);
        }

        for (chunk, id) in ids.chunks_exact_mut(2).zip(lang_ids) {
            chunk.copy_from_slice(&id.to_le_bytes());
        }

        self.write(descriptor_type::STRING, &ids[..lang_ids.len() * 2])
    }

    pub(crate) fn device(&mut self, config: &Config) -> Result<()> {
        let [spec_lo, spec_hi] = USB_SPEC_RELEASE.to_le_bytes();
        let [vid_lo, vid_hi] = config.vendor_id.to_le_bytes();
        let [pid_lo, pid_hi] = config.product_id.to_le_bytes();
        let [rel_lo, rel_hi] = config.device_release.to_le_bytes();

        self.write(
            descriptor_type::DEVICE,
            &[
                spec_lo,
                spec_hi,                                // bcdUSB
                config.device_class,                    // bDeviceClass
                config.device_sub_class,                // bDeviceSubClass
                config.device_protocol,                 // bDeviceProtocol
                config.max_packet_size_0,               // bMaxPacketSize0
                vid_lo,
                vid_hi,                                 // idVendor
                pid_lo,
                pid_hi,                                 // idProduct
                rel_lo,
                rel_hi,                                 // bcdDevice
                config.manufacturer.map_or(0, |_| 1),   // iManufacturer
                config.product.map_or(0, |_| 2),        // iProduct
                config.serial_number.map_or(0, |_| 3),  // iSerialNumber
                1,                                      // bNumConfigurations
            ],
        )
    }

    pub(crate) fn configuration(&mut self, config: &Config) -> Result<()> {
        let start = self.position;

        self.write(
            descriptor_type::CONFIGURATION,
            &[
                0,
                0,                   // wTotalLength, patched below
                1,                   // bNumInterfaces
                CONFIGURATION_VALUE, // bConfigurationValue
                0,                   // iConfiguration
                0x80 | if config.self_powered { 0x40 } else { 0x00 }, // bmAttributes
                config.max_power,    // bMaxPower
            ],
        )?;

        self.write(
            descriptor_type::INTERFACE,
            &[
                0,                          // bInterfaceNumber
                DEFAULT_ALTERNATE_SETTING,  // bAlternateSetting
                2,                          // bNumEndpoints
                config.interface_class,     // bInterfaceClass
                config.interface_sub_class, // bInterfaceSubClass
                config.interface_protocol,  // bInterfaceProtocol
                0,                          // iInterface
            ],
        )?;

        self.bulk_endpoint(config.bulk.in_address, config.bulk.max_packet_size)?;
        self.bulk_endpoint(config.bulk.out_address, config.bulk.max_packet_size)?;

        let total = (self.position - start) as u16;
        self.buf[start + 2..start + 4].copy_from_slice(&total.to_le_bytes());

        Ok(())
    }

    fn bulk_endpoint(&mut self, address: EndpointAddress, max_packet_size: u16) -> Result<()> {
        let [mps_lo, mps_hi] = max_packet_size.to_le_bytes();

        self.write(
            descriptor_type::ENDPOINT,
            &[
                u8::from(address), // bEndpointAddress
                0x02,              // bmAttributes: bulk
                mps_lo,
                mps_hi, // wMaxPacketSize
                1,      // bInterval
            ],
        )
    }
}
