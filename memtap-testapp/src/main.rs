//! UDP demo harness for the memtap agent.
//!
//! Links the agent the way a firmware would and bridges it to a UDP socket:
//! datagram payloads feed `receive_data`, the agent is stepped at a fixed
//! cycle period with measured wall-clock time, and whatever it wants to
//! transmit is popped and sent back to the last peer. A few demo memory
//! blocks with known content are kept on the stack so a host-side tool has
//! something real to read and write, including a forbidden and a readonly
//! region to exercise the address policy.

mod parse_args;

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use memtap::comm::RxError;
use memtap::{Agent, Config};
use parse_args::{parse_args, Verbosity};

const BUF_SIZE: usize = 1024;
const SOFTWARE_ID: [u8; 16] = *b"MEMTAP-TESTAPP-1";

type DemoAgent = Agent<BUF_SIZE, 4, 4>;

/// User-command hook: echoes the request payload with every byte inverted.
fn user_command(_subfunction: u8, request: &[u8], response: &mut [u8]) -> usize {
    for (slot, &byte) in response.iter_mut().zip(request) {
        *slot = !byte;
    }
    request.len()
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        out.push_str(&format!("{:02X} ", byte));
    }
    out.trim_end().to_string()
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(error) => {
            eprintln!("Error: {}.", error);
            std::process::exit(2);
        }
    };

    // Demo target memory. The client is free to rewrite the counters, may
    // only look at the calibration block, and must never see the secret.
    let mut counters = [0u8; 32];
    let message: [u8; 32] = *b"memtap demo target memory block!";
    let calibration: [u8; 8] = [7, 13, 42, 99, 0, 0, 0, 1];
    let secret = [0xEEu8; 16];

    let mut config: Config<4, 4> = Config::new();
    config.max_bitrate = args.bitrate;
    config.software_id = SOFTWARE_ID;
    config.user_command_callback = Some(user_command);

    let secret_start = secret.as_ptr() as u64;
    config.add_forbidden_range(secret_start, secret_start + secret.len() as u64 - 1);
    let calibration_start = calibration.as_ptr() as u64;
    config.add_readonly_range(
        calibration_start,
        calibration_start + calibration.len() as u64 - 1,
    );

    let socket = match UdpSocket::bind((args.bind.as_str(), args.port)) {
        Ok(socket) => socket,
        Err(error) => {
            eprintln!("Error: cannot bind {}:{}: {}.", args.bind, args.port, error);
            std::process::exit(1);
        }
    };
    socket
        .set_read_timeout(Some(Duration::from_micros(args.cycle_us)))
        .expect("read timeout");

    println!("memtap-testapp listening on {}:{}", args.bind, args.port);
    println!("  counters    @ 0x{:016X} ({} bytes, writable)", counters.as_ptr() as usize, counters.len());
    println!("  message     @ 0x{:016X} ({} bytes)", message.as_ptr() as usize, message.len());
    println!("  calibration @ 0x{:016X} ({} bytes, readonly)", calibration.as_ptr() as usize, calibration.len());
    println!("  secret      @ 0x{:016X} ({} bytes, forbidden)", secret.as_ptr() as usize, secret.len());

    let mut agent = DemoAgent::new(config);
    let mut last_cycle = Instant::now();
    let mut peer: Option<SocketAddr> = None;
    let mut rx = [0u8; 2048];
    let mut tx = [0u8; 1500];

    loop {
        match socket.recv_from(&mut rx) {
            Ok((n, from)) => {
                if peer != Some(from) {
                    if args.verbosity >= Verbosity::Verbose {
                        eprintln!("client {}", from);
                    }
                    peer = Some(from);
                }
                if args.verbosity >= Verbosity::Trace {
                    eprintln!("rx {}", hex(&rx[..n]));
                }
                agent.receive_data(&rx[..n]);
            }
            Err(error)
                if error.kind() == ErrorKind::WouldBlock
                    || error.kind() == ErrorKind::TimedOut => {}
            Err(error) => {
                eprintln!("Error: socket receive failed: {}.", error);
                std::process::exit(1);
            }
        }

        let now = Instant::now();
        let dt_us = now
            .duration_since(last_cycle)
            .as_micros()
            .min(u128::from(u32::MAX)) as u32;
        last_cycle = now;
        agent.process(dt_us);

        // The overflow latch is the supervisor's to clear.
        if agent.comm().rx_error() != RxError::None {
            if args.verbosity >= Verbosity::Verbose {
                eprintln!("rx overflow, resetting reception");
            }
            agent.comm_mut().reset_rx();
        }

        if let Some(peer) = peer {
            while agent.data_to_send() > 0 {
                let n = agent.pop_data(&mut tx);
                if args.verbosity >= Verbosity::Trace {
                    eprintln!("tx {}", hex(&tx[..n]));
                }
                if let Err(error) = socket.send_to(&tx[..n], peer) {
                    eprintln!("Error: socket send failed: {}.", error);
                    break;
                }
            }
        }

        // Keep the demo memory alive and moving.
        counters[0] = counters[0].wrapping_add(1);
        std::hint::black_box(&counters);
        std::hint::black_box(&message);
        std::hint::black_box(&calibration);
        std::hint::black_box(&secret);
    }
}
