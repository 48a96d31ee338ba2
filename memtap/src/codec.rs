//! Wire codec, protocol v1.0
//!
//! Pure translation between payload bytes and typed records. Fixed-layout
//! payloads (GetInfo, CommControl) decode into one struct per subfunction
//! and reject any length mismatch. Memory-control payloads are repetition
//! lists of unbounded count, handled by streaming parsers and encoders that
//! borrow the frame storage instead of copying it.

use memtap_core::{ProtocolVersion, RegionType, DISCOVER_MAGIC, SOFTWARE_ID_LENGTH};

use crate::memory;
use crate::protocol::{
    decode_address_be, decode_u16_be, decode_u32_be, encode_address_be, encode_u16_be,
    encode_u32_be, ADDRESS_SIZE,
};

/// Fixed-layout payload whose length does not match its subfunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LayoutMismatch;

const MAGIC_SIZE: usize = DISCOVER_MAGIC.len();
const CHALLENGE_SIZE: usize = 4;

// ===== GetInfo =====

pub fn encode_response_protocol_version(version: ProtocolVersion, data: &mut [u8]) -> u16 {
    data[0] = version.major;
    data[1] = version.minor;
    2
}

pub fn encode_response_software_id(software_id: &[u8; SOFTWARE_ID_LENGTH], data: &mut [u8]) -> u16 {
    data[..SOFTWARE_ID_LENGTH].copy_from_slice(software_id);
    SOFTWARE_ID_LENGTH as u16
}

pub fn encode_response_special_memory_region_count(
    nbr_readonly: u8,
    nbr_forbidden: u8,
    data: &mut [u8],
) -> u16 {
    data[0] = nbr_readonly;
    data[1] = nbr_forbidden;
    2
}

/// Resolved location of one configured special region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionLocation {
    pub region_type: RegionType,
    pub region_index: u8,
    pub start: usize,
    pub end: usize,
}

pub fn encode_response_special_memory_region_location(
    location: &RegionLocation,
    data: &mut [u8],
) -> u16 {
    data[0] = location.region_type.into_u8();
    data[1] = location.region_index;
    encode_address_be(location.start, &mut data[2..]);
    encode_address_be(location.end, &mut data[2 + ADDRESS_SIZE..]);
    (2 + 2 * ADDRESS_SIZE) as u16
}

/// Which special region a GetInfo request asks about. The type byte is kept
/// raw; an unknown value is the dispatcher's to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionLocationRequest {
    pub region_type: u8,
    pub region_index: u8,
}

pub fn decode_request_special_memory_region_location(
    data: &[u8],
) -> Result<RegionLocationRequest, LayoutMismatch> {
    if data.len() != 2 {
        return Err(LayoutMismatch);
    }
    Ok(RegionLocationRequest {
        region_type: data[0],
        region_index: data[1],
    })
}

// ===== CommControl =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoverRequest {
    pub magic: [u8; MAGIC_SIZE],
    pub challenge: [u8; CHALLENGE_SIZE],
}

pub fn decode_request_comm_discover(data: &[u8]) -> Result<DiscoverRequest, LayoutMismatch> {
    if data.len() != MAGIC_SIZE + CHALLENGE_SIZE {
        return Err(LayoutMismatch);
    }
    let mut request = DiscoverRequest {
        magic: [0; MAGIC_SIZE],
        challenge: [0; CHALLENGE_SIZE],
    };
    request.magic.copy_from_slice(&data[..MAGIC_SIZE]);
    request.challenge.copy_from_slice(&data[MAGIC_SIZE..]);
    Ok(request)
}

pub fn encode_response_comm_discover(
    challenge_response: &[u8; CHALLENGE_SIZE],
    data: &mut [u8],
) -> u16 {
    data[..MAGIC_SIZE].copy_from_slice(&DISCOVER_MAGIC);
    data[MAGIC_SIZE..MAGIC_SIZE + CHALLENGE_SIZE].copy_from_slice(challenge_response);
    (MAGIC_SIZE + CHALLENGE_SIZE) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartbeatRequest {
    pub session_id: u32,
    pub challenge: u16,
}

pub fn decode_request_comm_heartbeat(data: &[u8]) -> Result<HeartbeatRequest, LayoutMismatch> {
    if data.len() != 6 {
        return Err(LayoutMismatch);
    }
    Ok(HeartbeatRequest {
        session_id: decode_u32_be(data),
        challenge: decode_u16_be(&data[4..]),
    })
}

pub fn encode_response_comm_heartbeat(
    session_id: u32,
    challenge_response: u16,
    data: &mut [u8],
) -> u16 {
    encode_u32_be(session_id, data);
    encode_u16_be(challenge_response, &mut data[4..]);
    6
}

/// Link parameters reported by GetParams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetParamsResponse {
    pub rx_buffer_size: u16,
    pub tx_buffer_size: u16,
    pub max_bitrate: u32,
    pub heartbeat_timeout_us: u32,
    pub rx_timeout_us: u32,
}

pub fn encode_response_comm_get_params(params: &GetParamsResponse, data: &mut [u8]) -> u16 {
    encode_u16_be(params.rx_buffer_size, data);
    encode_u16_be(params.tx_buffer_size, &mut data[2..]);
    encode_u32_be(params.max_bitrate, &mut data[4..]);
    encode_u32_be(params.heartbeat_timeout_us, &mut data[8..]);
    encode_u32_be(params.rx_timeout_us, &mut data[12..]);
    16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectRequest {
    pub magic: [u8; MAGIC_SIZE],
}

pub fn decode_request_comm_connect(data: &[u8]) -> Result<ConnectRequest, LayoutMismatch> {
    if data.len() != MAGIC_SIZE {
        return Err(LayoutMismatch);
    }
    let mut request = ConnectRequest {
        magic: [0; MAGIC_SIZE],
    };
    request.magic.copy_from_slice(data);
    Ok(request)
}

pub fn encode_response_comm_connect(session_id: u32, data: &mut [u8]) -> u16 {
    data[..MAGIC_SIZE].copy_from_slice(&memtap_core::CONNECT_MAGIC);
    encode_u32_be(session_id, &mut data[MAGIC_SIZE..]);
    (MAGIC_SIZE + 4) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisconnectRequest {
    pub session_id: u32,
}

pub fn decode_request_comm_disconnect(data: &[u8]) -> Result<DisconnectRequest, LayoutMismatch> {
    if data.len() != 4 {
        return Err(LayoutMismatch);
    }
    Ok(DisconnectRequest {
        session_id: decode_u32_be(data),
    })
}

// ===== MemoryControl =====

/// One target-memory block named by a read request or acknowledged by a
/// write response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryBlock {
    pub start_address: usize,
    pub length: u16,
}

/// One block carried by a write request, with the bytes to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBlock<'a> {
    pub start_address: usize,
    pub length: u16,
    pub source_data: &'a [u8],
}

const READ_RECORD_SIZE: usize = ADDRESS_SIZE + 2;

/// Streaming parser over a read-request payload: repetitions of
/// `ADDR(p) LEN(2)`.
///
/// Construction scans the whole payload once, rejecting any trailing
/// remainder and accumulating the transmit capacity the full response will
/// need. Afterwards [`next`](Self::next) yields the blocks in order.
pub struct ReadRequestParser<'a> {
    buffer: &'a [u8],
    cursor: usize,
    required_tx_size: u32,
    invalid: bool,
}

impl<'a> ReadRequestParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut parser = Self {
            buffer: data,
            cursor: 0,
            required_tx_size: 0,
            invalid: false,
        };
        parser.validate();
        parser
    }

    fn validate(&mut self) {
        let mut cursor = 0;
        loop {
            if cursor + READ_RECORD_SIZE > self.buffer.len() {
                self.invalid = true;
                return;
            }
            let length = decode_u16_be(&self.buffer[cursor + ADDRESS_SIZE..]);
            cursor += READ_RECORD_SIZE;
            self.required_tx_size += (READ_RECORD_SIZE + usize::from(length)) as u32;
            if cursor == self.buffer.len() {
                return;
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    /// Transmit capacity the full response needs, in bytes.
    pub fn required_tx_buffer_size(&self) -> u32 {
        self.required_tx_size
    }

    pub fn next(&mut self) -> Option<MemoryBlock> {
        if self.invalid || self.cursor >= self.buffer.len() {
            return None;
        }
        let start_address = decode_address_be(&self.buffer[self.cursor..]);
        let length = decode_u16_be(&self.buffer[self.cursor + ADDRESS_SIZE..]);
        self.cursor += READ_RECORD_SIZE;
        Some(MemoryBlock {
            start_address,
            length,
        })
    }
}

/// Streaming parser over a write-request payload: repetitions of
/// `ADDR(p) LEN(2) BYTES(LEN)`. A record whose declared length runs past the
/// payload end invalidates the whole request.
pub struct WriteRequestParser<'a> {
    buffer: &'a [u8],
    cursor: usize,
    required_tx_size: u32,
    invalid: bool,
}

impl<'a> WriteRequestParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut parser = Self {
            buffer: data,
            cursor: 0,
            required_tx_size: 0,
            invalid: false,
        };
        parser.validate();
        parser
    }

    fn validate(&mut self) {
        let mut cursor = 0;
        loop {
            if cursor + READ_RECORD_SIZE > self.buffer.len() {
                self.invalid = true;
                return;
            }
            let length = decode_u16_be(&self.buffer[cursor + ADDRESS_SIZE..]);
            cursor += READ_RECORD_SIZE + usize::from(length);
            if cursor > self.buffer.len() {
                self.invalid = true;
                return;
            }
            self.required_tx_size += READ_RECORD_SIZE as u32;
            if cursor == self.buffer.len() {
                return;
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    /// Transmit capacity the full acknowledgement needs, in bytes.
    pub fn required_tx_buffer_size(&self) -> u32 {
        self.required_tx_size
    }

    pub fn next(&mut self) -> Option<WriteBlock<'a>> {
        if self.invalid || self.cursor >= self.buffer.len() {
            return None;
        }
        let start_address = decode_address_be(&self.buffer[self.cursor..]);
        let length = decode_u16_be(&self.buffer[self.cursor + ADDRESS_SIZE..]);
        let data_start = self.cursor + READ_RECORD_SIZE;
        let data_end = data_start + usize::from(length);
        self.cursor = data_end;
        Some(WriteBlock {
            start_address,
            length,
            source_data: &self.buffer[data_start..data_end],
        })
    }
}

/// Streaming encoder for a read response: repetitions of
/// `ADDR(p) LEN(2) BYTES(LEN)`, the bytes copied straight out of target
/// memory. A record that would exceed the ceiling sets `overflow` and is not
/// written.
pub struct ReadResponseEncoder<'a> {
    buffer: &'a mut [u8],
    cursor: usize,
    size_limit: usize,
    overflow: bool,
}

impl<'a> ReadResponseEncoder<'a> {
    pub fn new(buffer: &'a mut [u8], max_size: usize) -> Self {
        let size_limit = max_size.min(buffer.len());
        Self {
            buffer,
            cursor: 0,
            size_limit,
            overflow: false,
        }
    }

    /// Append one record, reading `block.length` bytes of target memory
    /// directly into the response payload.
    ///
    /// # Safety
    /// `block` must name memory readable on this target over its whole
    /// length. The dispatcher establishes this through the configured
    /// address policy before calling.
    pub unsafe fn write(&mut self, block: &MemoryBlock) {
        let record_size = READ_RECORD_SIZE + usize::from(block.length);
        if self.cursor + record_size > self.size_limit {
            self.overflow = true;
            return;
        }
        encode_address_be(block.start_address, &mut self.buffer[self.cursor..]);
        self.cursor += ADDRESS_SIZE;
        encode_u16_be(block.length, &mut self.buffer[self.cursor..]);
        self.cursor += 2;
        memory::read_into(
            block.start_address,
            &mut self.buffer[self.cursor..self.cursor + usize::from(block.length)],
        );
        self.cursor += usize::from(block.length);
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Payload length written so far.
    pub fn data_length(&self) -> u16 {
        self.cursor as u16
    }
}

/// Streaming encoder for a write acknowledgement: repetitions of
/// `ADDR(p) LEN(2)`, no payload echo.
pub struct WriteResponseEncoder<'a> {
    buffer: &'a mut [u8],
    cursor: usize,
    size_limit: usize,
    overflow: bool,
}

impl<'a> WriteResponseEncoder<'a> {
    pub fn new(buffer: &'a mut [u8], max_size: usize) -> Self {
        let size_limit = max_size.min(buffer.len());
        Self {
            buffer,
            cursor: 0,
            size_limit,
            overflow: false,
        }
    }

    pub fn write(&mut self, block: &MemoryBlock) {
        if self.cursor + READ_RECORD_SIZE > self.size_limit {
            self.overflow = true;
            return;
        }
        encode_address_be(block.start_address, &mut self.buffer[self.cursor..]);
        self.cursor += ADDRESS_SIZE;
        encode_u16_be(block.length, &mut self.buffer[self.cursor..]);
        self.cursor += 2;
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Payload length written so far.
    pub fn data_length(&self) -> u16 {
        self.cursor as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtap_core::{CONNECT_MAGIC, PROTOCOL_VERSION};

    #[test]
    fn test_fixed_layout_round_trips() {
        let mut buf = [0u8; 32];

        let n = encode_response_comm_heartbeat(0xAABBCCDD, 0x1234, &mut buf);
        assert_eq!(n, 6);
        let decoded = decode_request_comm_heartbeat(&buf[..6]).unwrap();
        assert_eq!(decoded.session_id, 0xAABBCCDD);
        assert_eq!(decoded.challenge, 0x1234);

        let n = encode_response_comm_discover(&[0x11, 0x22, 0x33, 0x44], &mut buf);
        assert_eq!(n, 8);
        let decoded = decode_request_comm_discover(&buf[..8]).unwrap();
        assert_eq!(decoded.magic, DISCOVER_MAGIC);
        assert_eq!(decoded.challenge, [0x11, 0x22, 0x33, 0x44]);

        let n = encode_response_comm_connect(0x01020304, &mut buf);
        assert_eq!(n, 8);
        assert_eq!(&buf[..4], &CONNECT_MAGIC);
        let decoded = decode_request_comm_connect(&buf[..4]).unwrap();
        assert_eq!(decoded.magic, CONNECT_MAGIC);
        assert_eq!(
            decode_request_comm_disconnect(&buf[4..8]).unwrap().session_id,
            0x01020304
        );
    }

    #[test]
    fn test_fixed_layout_length_mismatch() {
        assert!(decode_request_comm_discover(&[0u8; 7]).is_err());
        assert!(decode_request_comm_discover(&[0u8; 9]).is_err());
        assert!(decode_request_comm_heartbeat(&[0u8; 5]).is_err());
        assert!(decode_request_comm_connect(&[0u8; 0]).is_err());
        assert!(decode_request_comm_disconnect(&[0u8; 5]).is_err());
        assert!(decode_request_special_memory_region_location(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_protocol_version_payload() {
        let mut buf = [0u8; 2];
        let n = encode_response_protocol_version(PROTOCOL_VERSION, &mut buf);
        assert_eq!(n, 2);
        assert_eq!(buf, [1, 0]);
    }

    #[test]
    fn test_get_params_payload() {
        let params = GetParamsResponse {
            rx_buffer_size: 256,
            tx_buffer_size: 256,
            max_bitrate: 0x12345678,
            heartbeat_timeout_us: 5_000_000,
            rx_timeout_us: 50_000,
        };
        let mut buf = [0u8; 16];
        let n = encode_response_comm_get_params(&params, &mut buf);
        assert_eq!(n, 16);
        assert_eq!(
            buf,
            [
                0x01, 0x00, 0x01, 0x00, 0x12, 0x34, 0x56, 0x78, 0x00, 0x4C, 0x4B, 0x40, 0x00,
                0x00, 0xC3, 0x50
            ]
        );
    }

    #[test]
    fn test_region_location_payload() {
        let location = RegionLocation {
            region_type: RegionType::Forbidden,
            region_index: 2,
            start: 0x1000,
            end: 0x1FFF,
        };
        let mut buf = [0u8; 2 + 2 * ADDRESS_SIZE];
        let n = encode_response_special_memory_region_location(&location, &mut buf);
        assert_eq!(usize::from(n), buf.len());
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 2);
        assert_eq!(decode_address_be(&buf[2..]), 0x1000);
        assert_eq!(decode_address_be(&buf[2 + ADDRESS_SIZE..]), 0x1FFF);
    }

    fn read_request(blocks: &[(usize, u16)]) -> std::vec::Vec<u8> {
        let mut payload = std::vec::Vec::new();
        for &(address, length) in blocks {
            let mut record = [0u8; READ_RECORD_SIZE];
            encode_address_be(address, &mut record);
            encode_u16_be(length, &mut record[ADDRESS_SIZE..]);
            payload.extend_from_slice(&record);
        }
        payload
    }

    #[test]
    fn test_read_parser_yields_blocks() {
        let payload = read_request(&[(0x1000, 4), (0x2000, 16)]);
        let mut parser = ReadRequestParser::new(&payload);
        assert!(parser.is_valid());
        assert_eq!(
            parser.required_tx_buffer_size(),
            (2 * READ_RECORD_SIZE + 4 + 16) as u32
        );
        assert_eq!(
            parser.next(),
            Some(MemoryBlock {
                start_address: 0x1000,
                length: 4
            })
        );
        assert_eq!(
            parser.next(),
            Some(MemoryBlock {
                start_address: 0x2000,
                length: 16
            })
        );
        assert_eq!(parser.next(), None);
    }

    #[test]
    fn test_read_parser_rejects_remainder() {
        let mut payload = read_request(&[(0x1000, 4)]);
        payload.push(0xFF);
        let mut parser = ReadRequestParser::new(&payload);
        assert!(!parser.is_valid());
        assert!(parser.next().is_none());

        assert!(!ReadRequestParser::new(&[]).is_valid());
    }

    #[test]
    fn test_write_parser_yields_payload_slices() {
        let mut payload = read_request(&[(0x4000, 3)]);
        payload.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        let mut parser = WriteRequestParser::new(&payload);
        assert!(parser.is_valid());
        assert_eq!(parser.required_tx_buffer_size(), READ_RECORD_SIZE as u32);

        let block = parser.next().unwrap();
        assert_eq!(block.start_address, 0x4000);
        assert_eq!(block.length, 3);
        assert_eq!(block.source_data, &[0xAA, 0xBB, 0xCC]);
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_write_parser_rejects_truncated_block() {
        let mut payload = read_request(&[(0x4000, 8)]);
        payload.extend_from_slice(&[0xAA, 0xBB]);
        assert!(!WriteRequestParser::new(&payload).is_valid());
    }

    #[test]
    fn test_read_encoder_copies_target_memory() {
        let target = [0x11u8, 0x22, 0x33];
        let block = MemoryBlock {
            start_address: target.as_ptr() as usize,
            length: 3,
        };

        let mut buf = [0u8; 64];
        let mut encoder = ReadResponseEncoder::new(&mut buf, 64);
        unsafe { encoder.write(&block) };
        assert!(!encoder.overflow());
        assert_eq!(usize::from(encoder.data_length()), READ_RECORD_SIZE + 3);

        let written = encoder.data_length() as usize;
        assert_eq!(decode_address_be(&buf), block.start_address);
        assert_eq!(decode_u16_be(&buf[ADDRESS_SIZE..]), 3);
        assert_eq!(&buf[READ_RECORD_SIZE..written], &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_read_encoder_overflow_keeps_prior_records() {
        let target = [0u8; 8];
        let block = MemoryBlock {
            start_address: target.as_ptr() as usize,
            length: 8,
        };

        let mut buf = [0u8; 64];
        let mut encoder = ReadResponseEncoder::new(&mut buf, READ_RECORD_SIZE + 8);
        unsafe { encoder.write(&block) };
        assert!(!encoder.overflow());
        unsafe { encoder.write(&block) };
        assert!(encoder.overflow());
        assert_eq!(usize::from(encoder.data_length()), READ_RECORD_SIZE + 8);
    }

    #[test]
    fn test_write_encoder_acknowledges_without_echo() {
        let mut buf = [0u8; 64];
        let mut encoder = WriteResponseEncoder::new(&mut buf, 64);
        encoder.write(&MemoryBlock {
            start_address: 0x5000,
            length: 7,
        });
        assert!(!encoder.overflow());
        assert_eq!(usize::from(encoder.data_length()), READ_RECORD_SIZE);
        assert_eq!(decode_u16_be(&buf[ADDRESS_SIZE..]), 7);
    }
}
