//! Frame records and wire-level encoding helpers
//!
//! A request or response on the wire is a small header, a payload and a
//! trailing CRC-32. The records here are header descriptors only; payload
//! bytes live in the comm engine's receive and transmit storage and are
//! handed out as slices (see [`crate::comm::CommHandler`]).
//!
//! All multi-byte integers are big-endian. Addresses are encoded at the
//! target's native pointer width; a host-side tool must agree on that width.

use memtap_core::ResponseCode;

/// Number of bytes an address occupies on the wire.
pub const ADDRESS_SIZE: usize = core::mem::size_of::<usize>();

/// Request wire overhead: command, subfunction, length, CRC.
pub const REQUEST_OVERHEAD: usize = 1 + 1 + 2 + 4;

/// Response wire overhead: command, subfunction, response code, length, CRC.
pub const RESPONSE_OVERHEAD: usize = 1 + 1 + 1 + 2 + 4;

/// Header of the request being received or processed.
///
/// `valid` is set by the comm engine only after the frame CRC has passed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    pub command_id: u8,
    pub subfunction_id: u8,
    pub data_length: u16,
    pub crc: u32,
    pub valid: bool,
}

impl Request {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Header of the response under construction or transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Response {
    pub command_id: u8,
    pub subfunction_id: u8,
    pub response_code: ResponseCode,
    pub data_length: u16,
    pub crc: u32,
}

impl Response {
    /// A fresh reply header for `request`: same command and subfunction,
    /// code defaulted to Ok, no payload yet.
    pub fn reply_to(request: &Request) -> Self {
        Self {
            command_id: request.command_id,
            subfunction_id: request.subfunction_id,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Default for Response {
    fn default() -> Self {
        Self {
            command_id: 0,
            subfunction_id: 0,
            response_code: ResponseCode::Ok,
            data_length: 0,
            crc: 0,
        }
    }
}

pub fn encode_u16_be(value: u16, buf: &mut [u8]) {
    buf[..2].copy_from_slice(&value.to_be_bytes());
}

pub fn decode_u16_be(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

pub fn encode_u32_be(value: u32, buf: &mut [u8]) {
    buf[..4].copy_from_slice(&value.to_be_bytes());
}

pub fn decode_u32_be(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Encode a target address at native pointer width.
pub fn encode_address_be(address: usize, buf: &mut [u8]) {
    buf[..ADDRESS_SIZE].copy_from_slice(&address.to_be_bytes());
}

/// Decode a target address at native pointer width.
pub fn decode_address_be(buf: &[u8]) -> usize {
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&buf[..ADDRESS_SIZE]);
    usize::from_be_bytes(bytes)
}
