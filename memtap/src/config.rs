//! Firmware-side configuration
//!
//! Declarative record the host fills once and hands to the agent at
//! construction; the agent copies it and never mutates it afterwards. The
//! address-range capacities are compile-time constants of the host build.

use memtap_core::SOFTWARE_ID_LENGTH;

pub const DEFAULT_RX_TIMEOUT_US: u32 = 50_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_US: u32 = 5_000_000;

/// One guarded address interval, inclusive on both ends.
///
/// Entries are filled front to back; policy scans stop at the first entry
/// with `set == false`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
    pub set: bool,
}

/// Host hook behind the UserCommand command.
///
/// Receives the subfunction, the request payload and the response staging
/// buffer, and returns the number of response bytes produced. Reporting a
/// length larger than the buffer turns into an Overflow reply.
pub type UserCommandCallback = fn(subfunction: u8, request: &[u8], response: &mut [u8]) -> usize;

/// Agent configuration with `NF` forbidden and `NR` readonly range slots.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config<const NF: usize, const NR: usize> {
    /// Declared link ceiling reported by GetParams; not enforced by the core.
    pub max_bitrate: u32,
    /// Mid-frame reception gap after which a partial frame is abandoned.
    pub rx_timeout_us: u32,
    /// Silence after which the session is dropped.
    pub heartbeat_timeout_us: u32,
    /// Identity constant reported by GetInfo, supplied by the host build.
    pub software_id: [u8; SOFTWARE_ID_LENGTH],
    pub user_command_callback: Option<UserCommandCallback>,
    forbidden_ranges: [AddressRange; NF],
    readonly_ranges: [AddressRange; NR],
    forbidden_count: u8,
    readonly_count: u8,
}

impl<const NF: usize, const NR: usize> Config<NF, NR> {
    pub fn new() -> Self {
        Self {
            max_bitrate: 0,
            rx_timeout_us: DEFAULT_RX_TIMEOUT_US,
            heartbeat_timeout_us: DEFAULT_HEARTBEAT_TIMEOUT_US,
            software_id: [0; SOFTWARE_ID_LENGTH],
            user_command_callback: None,
            forbidden_ranges: [AddressRange::default(); NF],
            readonly_ranges: [AddressRange::default(); NR],
            forbidden_count: 0,
            readonly_count: 0,
        }
    }

    /// Deny all access to `[start, end]`. Returns false once every slot is
    /// taken.
    pub fn add_forbidden_range(&mut self, start: u64, end: u64) -> bool {
        let index = usize::from(self.forbidden_count);
        if index >= NF {
            return false;
        }
        self.forbidden_ranges[index] = AddressRange {
            start,
            end,
            set: true,
        };
        self.forbidden_count += 1;
        true
    }

    /// Deny writes to `[start, end]`. Returns false once every slot is taken.
    pub fn add_readonly_range(&mut self, start: u64, end: u64) -> bool {
        let index = usize::from(self.readonly_count);
        if index >= NR {
            return false;
        }
        self.readonly_ranges[index] = AddressRange {
            start,
            end,
            set: true,
        };
        self.readonly_count += 1;
        true
    }

    pub fn forbidden_ranges(&self) -> &[AddressRange] {
        &self.forbidden_ranges
    }

    pub fn readonly_ranges(&self) -> &[AddressRange] {
        &self.readonly_ranges
    }

    pub fn forbidden_range_count(&self) -> u8 {
        self.forbidden_count
    }

    pub fn readonly_range_count(&self) -> u8 {
        self.readonly_count
    }
}

impl<const NF: usize, const NR: usize> Default for Config<NF, NR> {
    fn default() -> Self {
        Self::new()
    }
}
