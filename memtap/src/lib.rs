//! # Memtap
//!
//! A debug/instrumentation agent to link into firmware: an external tool can
//! discover the build, read and write target memory under a configured
//! policy, call host-defined commands and keep a session alive with tuned
//! heartbeats, all over a single byte-oriented half-duplex transport (UART,
//! TCP, UDP, ...). Everything is statically allocated and the agent never
//! blocks; the firmware drives it from its main loop.
//!
//! ## Architecture
//!
//! ```text
//!  transport bytes                                transport bytes
//!        │                                               ▲
//!        ▼                                               │
//! ┌─────────────┐   request    ┌────────┐   response  ┌──────────┐
//! │ CommHandler ├─────────────►│ Agent  ├────────────►│ pop_data │
//! │  (rx FSM,   │              │ (dis-  │             │ (paced   │
//! │  CRC gate)  │              │ patch) │             │  output) │
//! └─────────────┘              └───┬────┘             └──────────┘
//!                                  │
//!                 ┌────────────┬───┴─────┬────────────┐
//!                 ▼            ▼         ▼            ▼
//!              ┌───────┐  ┌────────┐ ┌────────┐ ┌──────────┐
//!              │ Codec │  │ Policy │ │ Memory │ │ Sessions │
//!              └───────┘  │(Config)│ │  R/W   │ │heartbeat │
//!                         └────────┘ └────────┘ └──────────┘
//! ```
//!
//! Components:
//! * _CommHandler_ owns the frame storage and walks inbound bytes through
//!   the reception state machine, validates the CRC-32, and serializes the
//!   response back out in whatever chunk sizes the transport asks for.
//! * _Agent_ runs one bounded dispatch per cycle: decode, policy check,
//!   action, encode.
//! * _Codec_ is the pure wire translation layer, including the streaming
//!   memory-block parsers and encoders.
//! * _Config_ is a declarative snapshot the host hands over once: address
//!   policy, timeouts, software id, the user-command hook.
//!
//! ## Lifecycle
//!
//! The agent stays silent until it receives a CRC-valid Discover request
//! carrying the protocol magic; only then will it emit bytes. A client then
//! connects (one session at a time), keeps the session alive with
//! heartbeats, and disconnects; a session whose heartbeats stop is dropped
//! silently after the configured timeout.
//!
//! ## Concurrency model
//!
//! Single-threaded and cooperative: the firmware calls
//! [`Agent::receive_data`], [`Agent::process`] and [`Agent::pop_data`] from
//! one context and nothing blocks. The only synchronization primitive in the
//! crate is the mutex type parameter of [`collections`], for queues a host
//! may share with an interrupt context.
#![no_std]

#[cfg(test)]
extern crate std;

pub use memtap_core as core;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod agent;
pub mod codec;
pub mod collections;
pub mod comm;
pub mod config;
pub mod crc;
mod memory;
pub mod protocol;
pub mod timebase;

pub use agent::Agent;
pub use comm::CommHandler;
pub use config::Config;
pub use timebase::Timebase;
