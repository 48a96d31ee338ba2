//! Session lifecycle: discover, connect, heartbeat, timeout, disconnect.

mod common;

use common::{
    connect, discover_payload, enable, enabled_agent, frame, parse_response, transact,
    transact_err, transact_ok, TestAgent, TestConfig,
};
use memtap::core::{CONNECT_MAGIC, ResponseCode};

const HEARTBEAT_TIMEOUT_US: u32 = 5_000_000;

fn heartbeat_payload(session_id: u32, challenge: u16) -> Vec<u8> {
    let mut payload = session_id.to_be_bytes().to_vec();
    payload.extend_from_slice(&challenge.to_be_bytes());
    payload
}

#[test]
fn test_discover_echoes_inverted_challenge() {
    let mut agent = TestAgent::new(TestConfig::new());
    let data = transact_ok(&mut agent, 0x02, 0x01, &discover_payload([0x11, 0x22, 0x33, 0x44]));
    assert_eq!(&data[..4], &memtap::core::DISCOVER_MAGIC);
    assert_eq!(&data[4..], &[0xEE, 0xDD, 0xCC, 0xBB]);
}

#[test]
fn test_connect_opens_a_single_session() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);
    assert_ne!(session_id, 0);
    assert!(agent.comm().connected());

    // Second connect while the session is up: Busy.
    transact_err(&mut agent, 0x02, 0x04, &CONNECT_MAGIC, ResponseCode::Busy.into_u8());
    assert_eq!(agent.comm().session_id(), session_id);
}

#[test]
fn test_connect_requires_magic() {
    let mut agent = enabled_agent();
    transact_err(
        &mut agent,
        0x02,
        0x04,
        &[0x00, 0x00, 0x00, 0x00],
        ResponseCode::InvalidRequest.into_u8(),
    );
    assert!(!agent.comm().connected());
}

#[test]
fn test_heartbeat_round_trip() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);

    let data = transact_ok(&mut agent, 0x02, 0x02, &heartbeat_payload(session_id, 0x1234));
    assert_eq!(&data[..4], &session_id.to_be_bytes());
    assert_eq!(&data[4..], &(!0x1234u16).to_be_bytes());
}

#[test]
fn test_heartbeat_with_wrong_session_id_does_not_refresh() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);

    // Sit just short of the timeout, then heartbeat with a wrong id.
    agent.process(HEARTBEAT_TIMEOUT_US - 1000);
    transact_err(
        &mut agent,
        0x02,
        0x02,
        &heartbeat_payload(session_id ^ 1, 0x0000),
        ResponseCode::InvalidRequest.into_u8(),
    );
    assert!(agent.comm().connected());

    // If the wrong heartbeat had refreshed the stamp, the session would
    // survive this step.
    agent.process(1000);
    assert!(!agent.comm().connected());
}

#[test]
fn test_session_expires_without_heartbeats() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);
    assert!(agent.comm().connected());

    agent.process(HEARTBEAT_TIMEOUT_US);
    assert!(!agent.comm().connected());

    // The stale id is now useless.
    transact_err(
        &mut agent,
        0x02,
        0x02,
        &heartbeat_payload(session_id, 0x0000),
        ResponseCode::InvalidRequest.into_u8(),
    );

    // And the slot is free: a new connect succeeds rather than Busy.
    let new_session = connect(&mut agent);
    assert_ne!(new_session, session_id);
}

#[test]
fn test_heartbeats_keep_the_session_alive() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);

    for _ in 0..5 {
        agent.process(HEARTBEAT_TIMEOUT_US - 1000);
        let data = transact_ok(&mut agent, 0x02, 0x02, &heartbeat_payload(session_id, 0x00FF));
        assert_eq!(&data[4..], &(!0x00FFu16).to_be_bytes());
    }
    assert!(agent.comm().connected());
}

#[test]
fn test_disconnect_applies_after_response_is_sent() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);

    let request = frame(0x02, 0x05, &session_id.to_be_bytes());
    agent.receive_data(&request);
    agent.process(0);

    // Acknowledgement is in flight and the session still exists.
    assert!(agent.data_to_send() > 0);
    assert!(agent.comm().connected());

    let mut buf = [0u8; 64];
    let mut out = Vec::new();
    while agent.data_to_send() > 0 {
        let n = agent.pop_data(&mut buf);
        out.extend_from_slice(&buf[..n]);
    }
    let parsed = parse_response(&out);
    assert_eq!(parsed.code, 0);
    assert!(parsed.data.is_empty());

    // Only once the response has fully left does the session go away.
    agent.process(0);
    assert!(!agent.comm().connected());
}

#[test]
fn test_disconnect_with_wrong_session_id_is_rejected() {
    let mut agent = enabled_agent();
    let session_id = connect(&mut agent);

    transact_err(
        &mut agent,
        0x02,
        0x05,
        &(session_id ^ 1).to_be_bytes(),
        ResponseCode::InvalidRequest.into_u8(),
    );
    assert!(agent.comm().connected());
}

#[test]
fn test_get_params_reports_link_tuning() {
    let mut config = TestConfig::new();
    config.max_bitrate = 0x12345678;
    let mut agent = TestAgent::new(config);
    enable(&mut agent);

    let data = transact_ok(&mut agent, 0x02, 0x03, &[]);
    assert_eq!(
        data,
        vec![
            0x01, 0x00, // rx buffer size: 256
            0x01, 0x00, // tx buffer size: 256
            0x12, 0x34, 0x56, 0x78, // max bitrate
            0x00, 0x4C, 0x4B, 0x40, // heartbeat timeout: 5_000_000 us
            0x00, 0x00, 0xC3, 0x50, // rx timeout: 50_000 us
        ]
    );
}

#[test]
fn test_malformed_comm_payloads_are_invalid() {
    let mut agent = enabled_agent();
    let invalid = ResponseCode::InvalidRequest.into_u8();

    // Truncated discover, heartbeat, connect and disconnect payloads.
    transact_err(&mut agent, 0x02, 0x02, &[0x00; 5], invalid);
    transact_err(&mut agent, 0x02, 0x04, &[0x00; 3], invalid);
    transact_err(&mut agent, 0x02, 0x05, &[0x00; 3], invalid);

    // A discover whose payload is only the magic is a length mismatch too.
    let reply = transact(&mut agent, &frame(0x02, 0x01, &memtap::core::DISCOVER_MAGIC));
    assert_eq!(parse_response(&reply).code, invalid);
}

#[test]
fn test_unknown_comm_subfunction() {
    let mut agent = enabled_agent();
    transact_err(
        &mut agent,
        0x02,
        0x09,
        &[],
        ResponseCode::UnsupportedFeature.into_u8(),
    );
}
