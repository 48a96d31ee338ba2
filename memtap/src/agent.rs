//! Per-cycle dispatcher
//!
//! [`Agent`] is what a firmware embeds: it owns the timebase, the framing
//! engine and a copy of the configuration. Each cycle the host feeds it
//! transport input, calls [`process`](Agent::process) with the elapsed time
//! and drains whatever the engine wants to transmit. At most one request is
//! dispatched per cycle, and every code path is bounded by the frame
//! storage, so a cycle's cost has a hard ceiling.

use memtap_core::{
    CommControlSubfunction, CommandId, GetInfoSubfunction, MemoryControlSubfunction, RegionType,
    ResponseCode, CONNECT_MAGIC, DISCOVER_MAGIC, PROTOCOL_VERSION,
};

use crate::codec::{
    self, GetParamsResponse, MemoryBlock, ReadRequestParser, ReadResponseEncoder,
    WriteRequestParser, WriteResponseEncoder,
};
use crate::comm::CommHandler;
use crate::config::{AddressRange, Config};
use crate::memory;
use crate::protocol::{Request, Response};
use crate::timebase::Timebase;

/// The debug agent: framing engine, dispatcher and policy in one
/// statically-sized value.
///
/// `BUF_SIZE` is the payload capacity of each transfer direction (32..65535);
/// `NF` and `NR` are the forbidden and readonly range slot counts of the
/// configuration.
pub struct Agent<const BUF_SIZE: usize, const NF: usize, const NR: usize> {
    timebase: Timebase,
    comm: CommHandler<BUF_SIZE>,
    config: Config<NF, NR>,
    processing_request: bool,
    disconnect_pending: bool,
}

impl<const BUF_SIZE: usize, const NF: usize, const NR: usize> Agent<BUF_SIZE, NF, NR> {
    /// Build an agent around a configuration snapshot. The configuration is
    /// copied and stays immutable for the agent's lifetime.
    pub fn new(config: Config<NF, NR>) -> Self {
        let comm = CommHandler::new(config.rx_timeout_us, config.heartbeat_timeout_us);
        Self {
            timebase: Timebase::new(),
            comm,
            config,
            processing_request: false,
            disconnect_pending: false,
        }
    }

    /// Feed transport bytes to the framing engine.
    pub fn receive_data(&mut self, data: &[u8]) {
        self.comm.receive_data(data, &self.timebase);
    }

    /// One cooperative cycle: advance the clock, expire a silent session,
    /// dispatch at most one pending request, and release the request slot
    /// once its response has fully left.
    pub fn process(&mut self, dt_us: u32) {
        self.timebase.step(dt_us);
        self.comm.check_timeouts(&self.timebase);

        if self.comm.request_received() && !self.processing_request {
            self.processing_request = true;
            let response = self.dispatch();
            self.comm.send_response(&response);
        }

        if self.processing_request && !self.comm.transmitting() {
            self.comm.request_processed();
            self.processing_request = false;
            if self.disconnect_pending {
                self.disconnect_pending = false;
                self.comm.disconnect();
            }
        }
    }

    /// Bytes of serialized response waiting for the transport.
    pub fn data_to_send(&self) -> usize {
        self.comm.data_to_send()
    }

    /// Drain serialized response bytes into `buffer`.
    pub fn pop_data(&mut self, buffer: &mut [u8]) -> usize {
        self.comm.pop_data(buffer)
    }

    pub fn comm(&self) -> &CommHandler<BUF_SIZE> {
        &self.comm
    }

    pub fn comm_mut(&mut self) -> &mut CommHandler<BUF_SIZE> {
        &mut self.comm
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    pub fn config(&self) -> &Config<NF, NR> {
        &self.config
    }

    fn dispatch(&mut self) -> Response {
        let request = *self.comm.request();
        let mut response = Response::reply_to(&request);

        let code = if !request.valid {
            ResponseCode::FailureToProceed
        } else {
            match CommandId::try_from_u8(request.command_id) {
                Some(CommandId::GetInfo) => self.process_get_info(&request, &mut response),
                Some(CommandId::CommControl) => self.process_comm_control(&request, &mut response),
                Some(CommandId::MemoryControl) => {
                    self.process_memory_control(&request, &mut response)
                }
                Some(CommandId::DataLogControl) => ResponseCode::UnsupportedFeature,
                Some(CommandId::UserCommand) => self.process_user_command(&request, &mut response),
                None => ResponseCode::UnsupportedFeature,
            }
        };

        response.response_code = code;
        if code != ResponseCode::Ok {
            response.data_length = 0;
        }
        response
    }

    fn process_get_info(&mut self, request: &Request, response: &mut Response) -> ResponseCode {
        let Some(subfunction) = GetInfoSubfunction::try_from_u8(request.subfunction_id) else {
            return ResponseCode::UnsupportedFeature;
        };

        match subfunction {
            GetInfoSubfunction::ProtocolVersion => {
                let (_, tx) = self.comm.frame_views();
                response.data_length = codec::encode_response_protocol_version(PROTOCOL_VERSION, tx);
                ResponseCode::Ok
            }
            GetInfoSubfunction::SoftwareId => {
                let software_id = self.config.software_id;
                let (_, tx) = self.comm.frame_views();
                response.data_length = codec::encode_response_software_id(&software_id, tx);
                ResponseCode::Ok
            }
            // No payload defined for this one in protocol v1.0
            GetInfoSubfunction::SupportedFeatures => ResponseCode::UnsupportedFeature,
            GetInfoSubfunction::SpecialMemoryRegionCount => {
                let nbr_readonly = self.config.readonly_range_count();
                let nbr_forbidden = self.config.forbidden_range_count();
                let (_, tx) = self.comm.frame_views();
                response.data_length =
                    codec::encode_response_special_memory_region_count(nbr_readonly, nbr_forbidden, tx);
                ResponseCode::Ok
            }
            GetInfoSubfunction::SpecialMemoryRegionLocation => {
                let decoded =
                    codec::decode_request_special_memory_region_location(self.comm.request_data());
                let Ok(query) = decoded else {
                    return ResponseCode::InvalidRequest;
                };
                let Some(region_type) = RegionType::try_from_u8(query.region_type) else {
                    return ResponseCode::InvalidRequest;
                };
                let ranges = match region_type {
                    RegionType::ReadOnly => self.config.readonly_ranges(),
                    RegionType::Forbidden => self.config.forbidden_ranges(),
                };
                let slot = ranges.get(usize::from(query.region_index));
                let Some(range) = slot.filter(|range| range.set) else {
                    return ResponseCode::InvalidRequest;
                };
                let location = codec::RegionLocation {
                    region_type,
                    region_index: query.region_index,
                    start: range.start as usize,
                    end: range.end as usize,
                };
                let (_, tx) = self.comm.frame_views();
                response.data_length =
                    codec::encode_response_special_memory_region_location(&location, tx);
                ResponseCode::Ok
            }
        }
    }

    fn process_comm_control(&mut self, request: &Request, response: &mut Response) -> ResponseCode {
        let Some(subfunction) = CommControlSubfunction::try_from_u8(request.subfunction_id) else {
            return ResponseCode::UnsupportedFeature;
        };

        match subfunction {
            CommControlSubfunction::Discover => {
                let decoded = codec::decode_request_comm_discover(self.comm.request_data());
                let Ok(discover) = decoded else {
                    return ResponseCode::InvalidRequest;
                };
                if discover.magic != DISCOVER_MAGIC {
                    return ResponseCode::InvalidRequest;
                }
                let mut challenge_response = discover.challenge;
                for byte in &mut challenge_response {
                    *byte = !*byte;
                }
                let (_, tx) = self.comm.frame_views();
                response.data_length = codec::encode_response_comm_discover(&challenge_response, tx);
                ResponseCode::Ok
            }
            CommControlSubfunction::Heartbeat => {
                let decoded = codec::decode_request_comm_heartbeat(self.comm.request_data());
                let Ok(heartbeat) = decoded else {
                    return ResponseCode::InvalidRequest;
                };
                if !self.comm.heartbeat(heartbeat.session_id, &self.timebase) {
                    return ResponseCode::InvalidRequest;
                }
                let session_id = self.comm.session_id();
                let challenge_response = !heartbeat.challenge;
                let (_, tx) = self.comm.frame_views();
                response.data_length =
                    codec::encode_response_comm_heartbeat(session_id, challenge_response, tx);
                ResponseCode::Ok
            }
            CommControlSubfunction::GetParams => {
                let params = GetParamsResponse {
                    rx_buffer_size: BUF_SIZE as u16,
                    tx_buffer_size: BUF_SIZE as u16,
                    max_bitrate: self.config.max_bitrate,
                    heartbeat_timeout_us: self.config.heartbeat_timeout_us,
                    rx_timeout_us: self.config.rx_timeout_us,
                };
                let (_, tx) = self.comm.frame_views();
                response.data_length = codec::encode_response_comm_get_params(&params, tx);
                ResponseCode::Ok
            }
            CommControlSubfunction::Connect => {
                let decoded = codec::decode_request_comm_connect(self.comm.request_data());
                let Ok(connect) = decoded else {
                    return ResponseCode::InvalidRequest;
                };
                if connect.magic != CONNECT_MAGIC {
                    return ResponseCode::InvalidRequest;
                }
                if !self.comm.connect(&self.timebase) {
                    return ResponseCode::Busy;
                }
                let session_id = self.comm.session_id();
                let (_, tx) = self.comm.frame_views();
                response.data_length = codec::encode_response_comm_connect(session_id, tx);
                ResponseCode::Ok
            }
            CommControlSubfunction::Disconnect => {
                let decoded = codec::decode_request_comm_disconnect(self.comm.request_data());
                let Ok(disconnect) = decoded else {
                    return ResponseCode::InvalidRequest;
                };
                if !self.comm.connected() || disconnect.session_id != self.comm.session_id() {
                    return ResponseCode::InvalidRequest;
                }
                // The session stays up until the acknowledgement has fully
                // left the wire; process() applies it.
                self.disconnect_pending = true;
                ResponseCode::Ok
            }
        }
    }

    fn process_memory_control(
        &mut self,
        request: &Request,
        response: &mut Response,
    ) -> ResponseCode {
        let Some(subfunction) = MemoryControlSubfunction::try_from_u8(request.subfunction_id)
        else {
            return ResponseCode::UnsupportedFeature;
        };

        match subfunction {
            MemoryControlSubfunction::Read => self.process_memory_read(response),
            MemoryControlSubfunction::Write => self.process_memory_write(response),
        }
    }

    fn process_memory_read(&mut self, response: &mut Response) -> ResponseCode {
        let config = &self.config;
        let (request_data, tx) = self.comm.frame_views();

        let mut parser = ReadRequestParser::new(request_data);
        if !parser.is_valid() {
            return ResponseCode::InvalidRequest;
        }
        let tx_capacity = tx.len();
        if parser.required_tx_buffer_size() > tx_capacity as u32 {
            return ResponseCode::Overflow;
        }

        let mut encoder = ReadResponseEncoder::new(tx, tx_capacity);
        while let Some(block) = parser.next() {
            if touches_any(config.forbidden_ranges(), block.start_address, block.length) {
                return ResponseCode::Forbidden;
            }
            // SAFETY: the block cleared the forbidden-range policy; the host
            // vouches for every address its policy leaves readable.
            unsafe { encoder.write(&block) };
        }
        if encoder.overflow() {
            return ResponseCode::Overflow;
        }

        response.data_length = encoder.data_length();
        ResponseCode::Ok
    }

    fn process_memory_write(&mut self, response: &mut Response) -> ResponseCode {
        let config = &self.config;
        let (request_data, tx) = self.comm.frame_views();

        let mut parser = WriteRequestParser::new(request_data);
        if !parser.is_valid() {
            return ResponseCode::InvalidRequest;
        }
        let tx_capacity = tx.len();
        if parser.required_tx_buffer_size() > tx_capacity as u32 {
            return ResponseCode::Overflow;
        }

        let mut encoder = WriteResponseEncoder::new(tx, tx_capacity);
        while let Some(block) = parser.next() {
            if touches_any(config.forbidden_ranges(), block.start_address, block.length)
                || touches_any(config.readonly_ranges(), block.start_address, block.length)
            {
                return ResponseCode::Forbidden;
            }
            // SAFETY: the block cleared both policies; the host vouches for
            // every address its policy leaves writable.
            unsafe { memory::write_from(block.start_address, block.source_data) };
            encoder.write(&MemoryBlock {
                start_address: block.start_address,
                length: block.length,
            });
        }
        if encoder.overflow() {
            return ResponseCode::Overflow;
        }

        response.data_length = encoder.data_length();
        ResponseCode::Ok
    }

    fn process_user_command(&mut self, request: &Request, response: &mut Response) -> ResponseCode {
        let Some(callback) = self.config.user_command_callback else {
            return ResponseCode::UnsupportedFeature;
        };

        let (request_data, tx) = self.comm.frame_views();
        let capacity = tx.len();
        let produced = callback(request.subfunction_id, request_data, tx);
        if produced > capacity {
            return ResponseCode::Overflow;
        }

        response.data_length = produced as u16;
        ResponseCode::Ok
    }
}

/// Whether a block endpoint falls inside any configured range. The scan
/// stops at the first unset slot.
fn touches_any(ranges: &[AddressRange], start_address: usize, length: u16) -> bool {
    let block_start = start_address as u64;
    let block_end = block_start.saturating_add(u64::from(length.max(1)) - 1);

    for range in ranges {
        if !range.set {
            break;
        }
        if (block_start >= range.start && block_start <= range.end)
            || (block_end >= range.start && block_end <= range.end)
        {
            return true;
        }
    }
    false
}
