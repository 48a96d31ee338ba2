//! Byte-stream framing engine
//!
//! Owns the frame storage and walks inbound bytes through the reception
//! state machine: header, payload, CRC. A frame that passes CRC while the
//! agent is enabled becomes the active request; the dispatcher answers it
//! and the response is serialized back out through [`pop_data`] in whatever
//! chunk sizes the transport glue asks for.
//!
//! The link is half duplex. While a response is being transmitted, or while
//! a received request is still being processed, inbound bytes are dropped;
//! the remote side is expected to wait for its answer before talking again.
//!
//! [`pop_data`]: CommHandler::pop_data

use memtap_core::{CommControlSubfunction, CommandId, DISCOVER_MAGIC, RESPONSE_FLAG};

use crate::crc::crc32;
use crate::protocol::{Request, Response, RESPONSE_OVERHEAD};
use crate::timebase::Timebase;

/// Latched reception failure, cleared by [`CommHandler::reset_rx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    None,
    /// A frame declared more payload than the receive buffer holds.
    Overflow,
}

/// Latched transmission failure, cleared when the next response is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    None,
    /// The response declared more payload than the transmit buffer holds.
    Overflow,
    /// A response was submitted while the engine was not idle.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Idle,
    Receiving,
    Transmitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RxState {
    WaitCommand,
    WaitSubfunction,
    WaitLength,
    WaitData,
    WaitCrc,
    WaitProcess,
    Error,
}

/// Framing engine with `N`-byte receive and transmit payload storage.
pub struct CommHandler<const N: usize> {
    state: State,
    enabled: bool,

    // Reception
    rx_buffer: [u8; N],
    request: Request,
    rx_state: RxState,
    rx_error: RxError,
    request_received: bool,
    length_bytes_received: u8,
    crc_bytes_received: u8,
    data_bytes_received: u16,
    last_rx_timestamp: u32,
    rx_timeout_us: u32,

    // Transmission
    tx_buffer: [u8; N],
    response: Response,
    tx_error: TxError,
    nbytes_to_send: u32,
    nbytes_sent: u32,

    // Session
    session_connected: bool,
    session_id: u32,
    session_seed: u32,
    last_heartbeat_timestamp: u32,
    heartbeat_timeout_us: u32,
}

impl<const N: usize> CommHandler<N> {
    const CAPACITY_OK: () = assert!(N >= 32 && N <= 0xFFFF);

    pub fn new(rx_timeout_us: u32, heartbeat_timeout_us: u32) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CAPACITY_OK;

        Self {
            state: State::Idle,
            enabled: false,
            rx_buffer: [0; N],
            request: Request::default(),
            rx_state: RxState::WaitCommand,
            rx_error: RxError::None,
            request_received: false,
            length_bytes_received: 0,
            crc_bytes_received: 0,
            data_bytes_received: 0,
            last_rx_timestamp: 0,
            rx_timeout_us,
            tx_buffer: [0; N],
            response: Response::default(),
            tx_error: TxError::None,
            nbytes_to_send: 0,
            nbytes_sent: 0,
            session_connected: false,
            session_id: 0,
            session_seed: 0,
            last_heartbeat_timestamp: 0,
            heartbeat_timeout_us,
        }
    }

    /// Feed transport bytes into the reception state machine.
    pub fn receive_data(&mut self, data: &[u8], timebase: &Timebase) {
        if self.state == State::Transmitting {
            return; // Half duplex, discard
        }
        if self.rx_state == RxState::Error || self.request_received {
            return; // Latched until reset, or a request is pending processing
        }

        // Abandon a frame the remote stopped sending
        if self.rx_state != RxState::WaitCommand
            && !data.is_empty()
            && timebase.elapsed_since(self.last_rx_timestamp, self.rx_timeout_us)
        {
            self.reset_rx();
            self.state = State::Idle;
        }

        if !data.is_empty() {
            self.last_rx_timestamp = timebase.now();
            if self.state == State::Idle {
                self.state = State::Receiving;
            }
        }

        let mut i = 0;
        while i < data.len() && !self.request_received && self.rx_state != RxState::Error {
            match self.rx_state {
                RxState::WaitCommand => {
                    self.request.command_id = data[i] & !RESPONSE_FLAG;
                    self.rx_state = RxState::WaitSubfunction;
                    i += 1;
                }
                RxState::WaitSubfunction => {
                    self.request.subfunction_id = data[i];
                    self.rx_state = RxState::WaitLength;
                    i += 1;
                }
                RxState::WaitLength => {
                    self.request.data_length = (self.request.data_length << 8) | u16::from(data[i]);
                    self.length_bytes_received += 1;
                    i += 1;
                    if self.length_bytes_received == 2 {
                        self.rx_state = if self.request.data_length == 0 {
                            RxState::WaitCrc
                        } else {
                            RxState::WaitData
                        };
                    }
                }
                RxState::WaitData => {
                    if usize::from(self.request.data_length) > N {
                        self.rx_error = RxError::Overflow;
                        self.rx_state = RxState::Error;
                        continue;
                    }

                    let missing =
                        usize::from(self.request.data_length) - usize::from(self.data_bytes_received);
                    let n = missing.min(data.len() - i);
                    let start = usize::from(self.data_bytes_received);
                    self.rx_buffer[start..start + n].copy_from_slice(&data[i..i + n]);
                    self.data_bytes_received += n as u16;
                    i += n;

                    if self.data_bytes_received >= self.request.data_length {
                        self.rx_state = RxState::WaitCrc;
                    }
                }
                RxState::WaitCrc => {
                    self.request.crc = (self.request.crc << 8) | u32::from(data[i]);
                    self.crc_bytes_received += 1;
                    i += 1;
                    if self.crc_bytes_received == 4 {
                        self.state = State::Idle;
                        self.finish_reception();
                    }
                }
                RxState::WaitProcess | RxState::Error => break,
            }
        }
    }

    /// CRC gate at the end of a frame. A mismatch resets silently; a valid
    /// frame is dropped just as silently unless the agent is enabled or the
    /// frame is the enabling Discover.
    fn finish_reception(&mut self) {
        if !self.check_crc() {
            self.reset_rx();
            return;
        }

        if !self.enabled && self.is_discover_frame() {
            self.enabled = true;
        }

        if self.enabled {
            self.request.valid = true;
            self.rx_state = RxState::WaitProcess;
            self.request_received = true;
        } else {
            self.reset_rx();
        }
    }

    fn check_crc(&self) -> bool {
        let header = [
            self.request.command_id,
            self.request.subfunction_id,
            (self.request.data_length >> 8) as u8,
            (self.request.data_length & 0xFF) as u8,
        ];
        let crc = crc32(&header, 0);
        let crc = crc32(&self.rx_buffer[..usize::from(self.request.data_length)], crc);
        crc == self.request.crc
    }

    fn is_discover_frame(&self) -> bool {
        self.request.command_id == CommandId::CommControl.into_u8()
            && self.request.subfunction_id == CommControlSubfunction::Discover.into_u8()
            && usize::from(self.request.data_length) >= DISCOVER_MAGIC.len()
            && self.rx_buffer[..DISCOVER_MAGIC.len()] == DISCOVER_MAGIC
    }

    pub fn request_received(&self) -> bool {
        self.request_received
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Payload of the active request.
    pub fn request_data(&self) -> &[u8] {
        &self.rx_buffer[..usize::from(self.request.data_length)]
    }

    /// Split views for answering the active request: its payload, and the
    /// response staging buffer. The two are disjoint storage, so a dispatcher
    /// can parse one while encoding into the other.
    pub fn frame_views(&mut self) -> (&[u8], &mut [u8]) {
        (
            &self.rx_buffer[..usize::from(self.request.data_length)],
            &mut self.tx_buffer,
        )
    }

    /// Release the active request and arm reception of the next frame.
    pub fn request_processed(&mut self) {
        self.reset_rx();
    }

    /// Accept a response for transmission. On success the engine turns
    /// around to Transmitting and the serialized frame becomes available
    /// through [`data_to_send`]/[`pop_data`].
    ///
    /// Refused (returning false) while disabled, while a frame is mid-air in
    /// either direction (latching [`TxError::Busy`]), or when the declared
    /// payload exceeds the buffer (latching [`TxError::Overflow`]).
    ///
    /// [`data_to_send`]: Self::data_to_send
    /// [`pop_data`]: Self::pop_data
    pub fn send_response(&mut self, response: &Response) -> bool {
        if !self.enabled {
            return false;
        }

        if self.state != State::Idle {
            self.tx_error = TxError::Busy;
            return false;
        }

        if usize::from(response.data_length) > N {
            self.reset_tx();
            self.tx_error = TxError::Overflow;
            return false;
        }

        self.response = *response;
        self.response.command_id |= RESPONSE_FLAG;
        self.add_crc();

        self.nbytes_to_send = RESPONSE_OVERHEAD as u32 + u32::from(self.response.data_length);
        self.nbytes_sent = 0;
        self.state = State::Transmitting;
        true
    }

    fn add_crc(&mut self) {
        let header = [
            self.response.command_id,
            self.response.subfunction_id,
            self.response.response_code.into_u8(),
            (self.response.data_length >> 8) as u8,
            (self.response.data_length & 0xFF) as u8,
        ];
        let crc = crc32(&header, 0);
        self.response.crc = crc32(
            &self.tx_buffer[..usize::from(self.response.data_length)],
            crc,
        );
    }

    /// Bytes of the serialized response not yet popped.
    pub fn data_to_send(&self) -> usize {
        if self.state != State::Transmitting {
            return 0;
        }
        (self.nbytes_to_send - self.nbytes_sent) as usize
    }

    /// Pop the next chunk of the serialized response into `buffer`, in
    /// whatever chunk size the transport can take. Returns the number of
    /// bytes produced; when the frame is fully popped the engine goes back
    /// to Idle.
    pub fn pop_data(&mut self, buffer: &mut [u8]) -> usize {
        if self.state != State::Transmitting {
            return 0;
        }

        let remaining = (self.nbytes_to_send - self.nbytes_sent) as usize;
        let len = buffer.len().min(remaining);
        let mut i = 0;

        // Header: command, subfunction, code, length
        while self.nbytes_sent < 5 && i < len {
            buffer[i] = match self.nbytes_sent {
                0 => self.response.command_id,
                1 => self.response.subfunction_id,
                2 => self.response.response_code.into_u8(),
                3 => (self.response.data_length >> 8) as u8,
                _ => (self.response.data_length & 0xFF) as u8,
            };
            i += 1;
            self.nbytes_sent += 1;
        }

        // Payload
        let data_length = usize::from(self.response.data_length);
        let data_sent = (self.nbytes_sent as usize).saturating_sub(5).min(data_length);
        let n = (data_length - data_sent).min(len - i);
        buffer[i..i + n].copy_from_slice(&self.tx_buffer[data_sent..data_sent + n]);
        i += n;
        self.nbytes_sent += n as u32;

        // CRC, big-endian
        let crc_position = data_length as u32 + 5;
        while i < len {
            let crc_index = self.nbytes_sent - crc_position;
            buffer[i] = (self.response.crc >> (24 - 8 * crc_index)) as u8;
            i += 1;
            self.nbytes_sent += 1;
        }

        if self.nbytes_sent >= self.nbytes_to_send {
            self.reset_tx();
        }
        i
    }

    /// Drop a session whose heartbeats stopped. Called once per cycle.
    pub fn check_timeouts(&mut self, timebase: &Timebase) {
        if self.session_connected
            && timebase.elapsed_since(self.last_heartbeat_timestamp, self.heartbeat_timeout_us)
        {
            self.disconnect();
        }
    }

    /// Open the session. Fails if one is already active.
    pub fn connect(&mut self, timebase: &Timebase) -> bool {
        if self.session_connected {
            return false;
        }
        self.session_id = self.generate_session_id(timebase);
        self.session_connected = true;
        self.last_heartbeat_timestamp = timebase.now();
        true
    }

    pub fn disconnect(&mut self) {
        self.session_connected = false;
        self.session_id = 0;
    }

    /// Refresh the session on a heartbeat carrying the right id. A wrong id
    /// neither refreshes nor disconnects.
    pub fn heartbeat(&mut self, session_id: u32, timebase: &Timebase) -> bool {
        if !self.session_connected || session_id != self.session_id {
            return false;
        }
        self.last_heartbeat_timestamp = timebase.now();
        true
    }

    pub fn connected(&self) -> bool {
        self.session_connected
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    // xorshift32 seeded from the timebase on first use. A non-zero state
    // never reaches zero and cycles through every other value before
    // repeating.
    fn generate_session_id(&mut self, timebase: &Timebase) -> u32 {
        let mut x = self.session_seed;
        if x == 0 {
            x = timebase.now() | 1;
        }
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.session_seed = x;
        x
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Skip the Discover gate. Test and bring-up support.
    pub fn set_enabled(&mut self) {
        self.enabled = true;
    }

    pub fn transmitting(&self) -> bool {
        self.state == State::Transmitting
    }

    pub fn receiving(&self) -> bool {
        self.state == State::Receiving
    }

    pub fn rx_error(&self) -> RxError {
        self.rx_error
    }

    pub fn tx_error(&self) -> TxError {
        self.tx_error
    }

    /// Abandon the reception in progress and clear the Rx error latch. This
    /// is the supervisor's recovery path out of [`RxError::Overflow`]; the
    /// engine never resets itself.
    pub fn reset_rx(&mut self) {
        self.request.reset();
        self.rx_state = RxState::WaitCommand;
        self.rx_error = RxError::None;
        self.request_received = false;
        self.length_bytes_received = 0;
        self.crc_bytes_received = 0;
        self.data_bytes_received = 0;

        if self.state == State::Receiving {
            self.state = State::Idle;
        }
    }

    fn reset_tx(&mut self) {
        self.response.reset();
        self.tx_error = TxError::None;
        self.nbytes_to_send = 0;
        self.nbytes_sent = 0;

        if self.state == State::Transmitting {
            self.state = State::Idle;
        }
    }

    /// Full re-initialization: both directions reset, the enable gate
    /// closed, the session dropped.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.enabled = false;
        self.rx_buffer = [0; N];
        self.tx_buffer = [0; N];
        self.disconnect();
        self.reset_rx();
        self.reset_tx();
    }
}
