//! Frame-building and transaction helpers shared by the behavioral suites.
#![allow(dead_code)]

use memtap::core::{CONNECT_MAGIC, DISCOVER_MAGIC};
use memtap::crc::crc32;
use memtap::{Agent, Config};

/// Payload capacity used across the suites.
pub const BUF_SIZE: usize = 256;

pub type TestConfig = Config<4, 4>;
pub type TestAgent = Agent<BUF_SIZE, 4, 4>;

/// A complete request frame: header, payload, trailing CRC-32.
pub fn frame(command: u8, subfunction: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![
        command,
        subfunction,
        (data.len() >> 8) as u8,
        data.len() as u8,
    ];
    frame.extend_from_slice(data);
    let crc = crc32(&frame, 0);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

pub fn discover_payload(challenge: [u8; 4]) -> Vec<u8> {
    let mut payload = DISCOVER_MAGIC.to_vec();
    payload.extend_from_slice(&challenge);
    payload
}

/// Parsed and CRC-checked response frame.
pub struct ParsedResponse {
    pub command: u8,
    pub subfunction: u8,
    pub code: u8,
    pub data: Vec<u8>,
}

pub fn parse_response(bytes: &[u8]) -> ParsedResponse {
    assert!(bytes.len() >= 9, "short response: {} bytes", bytes.len());
    let length = usize::from(u16::from_be_bytes([bytes[3], bytes[4]]));
    assert_eq!(bytes.len(), 9 + length, "length field disagrees with frame");

    let crc = u32::from_be_bytes(bytes[5 + length..9 + length].try_into().unwrap());
    assert_eq!(crc, crc32(&bytes[..5 + length], 0), "response CRC mismatch");

    ParsedResponse {
        command: bytes[0],
        subfunction: bytes[1],
        code: bytes[2],
        data: bytes[5..5 + length].to_vec(),
    }
}

/// Deliver one request and drain the full response, releasing the request
/// slot afterwards. Returns the raw response bytes (empty if the agent
/// stayed silent).
pub fn transact(agent: &mut TestAgent, request: &[u8]) -> Vec<u8> {
    agent.receive_data(request);
    agent.process(0);

    let mut out = Vec::new();
    let mut chunk = [0u8; 7];
    while agent.data_to_send() > 0 {
        let n = agent.pop_data(&mut chunk);
        assert!(n > 0, "transmitter stalled with data pending");
        out.extend_from_slice(&chunk[..n]);
    }

    agent.process(0);
    out
}

/// One round trip, asserted OK, payload returned.
pub fn transact_ok(agent: &mut TestAgent, command: u8, subfunction: u8, data: &[u8]) -> Vec<u8> {
    let reply = transact(agent, &frame(command, subfunction, data));
    let parsed = parse_response(&reply);
    assert_eq!(parsed.command, command | 0x80);
    assert_eq!(parsed.subfunction, subfunction);
    assert_eq!(parsed.code, 0, "unexpected response code");
    parsed.data
}

/// One round trip expected to fail with `code` and an empty payload.
pub fn transact_err(agent: &mut TestAgent, command: u8, subfunction: u8, data: &[u8], code: u8) {
    let reply = transact(agent, &frame(command, subfunction, data));
    let parsed = parse_response(&reply);
    assert_eq!(parsed.code, code, "unexpected response code");
    assert!(parsed.data.is_empty(), "error responses carry no payload");
}

/// Wake the agent up with a Discover exchange.
pub fn enable(agent: &mut TestAgent) {
    let data = transact_ok(agent, 0x02, 0x01, &discover_payload([0, 0, 0, 0]));
    assert_eq!(&data[..4], &DISCOVER_MAGIC);
}

pub fn enabled_agent() -> TestAgent {
    let mut agent = TestAgent::new(TestConfig::new());
    enable(&mut agent);
    agent
}

/// Open the session and return its id.
pub fn connect(agent: &mut TestAgent) -> u32 {
    let data = transact_ok(agent, 0x02, 0x04, &CONNECT_MAGIC);
    assert_eq!(&data[..4], &CONNECT_MAGIC);
    u32::from_be_bytes(data[4..8].try_into().unwrap())
}
