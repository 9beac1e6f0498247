use crate::UsbDirection;

/// Transfer type of an endpoint. The discriminant is the transfer type field of bmAttributes.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointType {
    /// Endpoint 0, carrying SETUP requests.
    Control = 0b00,

    /// The capture data endpoints.
    Bulk = 0b10,
}

/// bEndpointAddress: endpoint number in the low bits, bit 7 set for IN.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointAddress(u8);

impl From<u8> for EndpointAddress {
    #[inline]
    fn from(addr: u8) -> EndpointAddress {
        EndpointAddress(addr)
    }
}

impl From<EndpointAddress> for u8 {
    #[inline]
    fn from(addr: EndpointAddress) -> u8 {
        addr.0
    }
}

impl EndpointAddress {
    const INBITS: u8 = 0x80;

    /// Endpoint 0 OUT, the receiving half of the default control pipe.
    pub const EP0_OUT: EndpointAddress = EndpointAddress(0x00);

    /// Endpoint 0 IN, the transmitting half of the default control pipe.
    pub const EP0_IN: EndpointAddress = EndpointAddress(0x80);

    /// Constructs a new EndpointAddress with the given index and direction.
    #[inline]
    pub const fn from_parts(index: usize, dir: UsbDirection) -> Self {
        EndpointAddress(index as u8 | dir as u8)
    }

    /// Parses the endpoint address carried in the `wIndex` field of an endpoint-recipient
    /// request. Reserved bits are masked off.
    #[inline]
    pub fn from_request_index(index: u16) -> Self {
        EndpointAddress((index as u8) & 0x8f)
    }

    /// IN or OUT, from bit 7.
    #[inline]
    pub fn direction(&self) -> UsbDirection {
        if (self.0 & Self::INBITS) != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Returns true if the direction is IN, otherwise false.
    #[inline]
    pub fn is_in(&self) -> bool {
        (self.0 & Self::INBITS) != 0
    }

    /// Returns true if the direction is OUT, otherwise false.
    #[inline]
    pub fn is_out(&self) -> bool {
        (self.0 & Self::INBITS) == 0
    }

    /// Gets the index part of the endpoint address.
    #[inline]
    pub fn index(&self) -> usize {
        (self.0 & !Self::INBITS) as usize
    }
}
